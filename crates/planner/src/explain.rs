//! Human-readable plan rendering.
//!
//! The rendering is stable: tests compare fragments of it, so changes here
//! are breaking changes to the test suite.

use crate::expr::Expression;
use crate::plan::LogicalPlan;

/// Renders a logical plan as indented multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Dual => out.push_str(&format!("{pad}Dual\n")),
        LogicalPlan::UnresolvedTable {
            database, name, ..
        } => {
            if database.is_empty() {
                out.push_str(&format!("{pad}UnresolvedTable({name})\n"));
            } else {
                out.push_str(&format!("{pad}UnresolvedTable({database}.{name})\n"));
            }
        }
        LogicalPlan::ResolvedTable { table, as_of, .. } => match as_of {
            Some(marker) => out.push_str(&format!(
                "{pad}Table({}) as of {marker}\n",
                table.name()
            )),
            None => out.push_str(&format!("{pad}Table({})\n", table.name())),
        },
        LogicalPlan::DeferredAsOfTable { table, as_of, .. } => out.push_str(&format!(
            "{pad}DeferredAsOfTable({}, asof={})\n",
            table.name(),
            as_of.debug_string()
        )),
        LogicalPlan::IndexedTableAccess(ita) => {
            out.push_str(&format!("{pad}{}\n", ita.describe()))
        }
        LogicalPlan::TableAlias { name, input } => {
            out.push_str(&format!("{pad}TableAlias({name})\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::SubqueryAlias {
            name,
            lateral,
            input,
            ..
        } => {
            if *lateral {
                out.push_str(&format!("{pad}SubqueryAlias({name}) lateral\n"));
            } else {
                out.push_str(&format!("{pad}SubqueryAlias({name})\n"));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Values { rows } => {
            out.push_str(&format!("{pad}Values({} rows)\n", rows.len()))
        }
        LogicalPlan::ValueDerivedTable { name, rows, .. } => out.push_str(&format!(
            "{pad}ValueDerivedTable({name}, {} rows)\n",
            rows.len()
        )),
        LogicalPlan::JsonTable { alias, path, .. } => {
            out.push_str(&format!("{pad}JsonTable({alias}, path={path})\n"))
        }
        LogicalPlan::TableFunction { name, args, table } => {
            let rendered: Vec<String> = args.iter().map(Expression::debug_string).collect();
            let state = if table.is_some() { "" } else { " deferred" };
            out.push_str(&format!(
                "{pad}TableFunction({name}({})){state}\n",
                rendered.join(", ")
            ));
        }
        LogicalPlan::Project { exprs, input } => {
            out.push_str(&format!("{pad}Project\n"));
            for e in exprs {
                out.push_str(&format!("{pad}  {}\n", e.debug_string()));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", predicate.debug_string()));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Sort { fields, input } => {
            let rendered: Vec<String> = fields
                .iter()
                .map(|f| {
                    format!(
                        "{} {}",
                        f.expr.debug_string(),
                        if f.descending { "desc" } else { "asc" }
                    )
                })
                .collect();
            out.push_str(&format!("{pad}Sort [{}]\n", rendered.join(", ")));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit { limit, input } => {
            out.push_str(&format!("{pad}Limit {}\n", limit.debug_string()));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Offset { offset, input } => {
            out.push_str(&format!("{pad}Offset {}\n", offset.debug_string()));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::GroupBy {
            selected,
            grouping,
            input,
        } => {
            out.push_str(&format!("{pad}GroupBy\n"));
            out.push_str(&format!("{pad}  select:\n"));
            for e in selected {
                out.push_str(&format!("{pad}    {}\n", e.debug_string()));
            }
            out.push_str(&format!("{pad}  group:\n"));
            for e in grouping {
                out.push_str(&format!("{pad}    {}\n", e.debug_string()));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Window { exprs, input } => {
            out.push_str(&format!("{pad}Window\n"));
            for e in exprs {
                out.push_str(&format!("{pad}  {}\n", e.debug_string()));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Union {
            left,
            right,
            distinct,
            sort_fields,
            limit,
            offset,
        } => {
            out.push_str(&format!("{pad}Union distinct={distinct}\n"));
            if !sort_fields.is_empty() {
                let rendered: Vec<String> = sort_fields
                    .iter()
                    .map(|f| {
                        format!(
                            "{} {}",
                            f.expr.debug_string(),
                            if f.descending { "desc" } else { "asc" }
                        )
                    })
                    .collect();
                out.push_str(&format!("{pad}  sort: [{}]\n", rendered.join(", ")));
            }
            if let Some(limit) = limit {
                out.push_str(&format!("{pad}  limit: {}\n", limit.debug_string()));
            }
            if let Some(offset) = offset {
                out.push_str(&format!("{pad}  offset: {}\n", offset.debug_string()));
            }
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::Join {
            op,
            condition,
            left,
            right,
        } => {
            match condition {
                Some(c) => out.push_str(&format!(
                    "{pad}Join type={op} on={}\n",
                    c.debug_string()
                )),
                None => out.push_str(&format!("{pad}Join type={op}\n")),
            }
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::CreateTable {
            database,
            name,
            schema,
            defaults,
        } => {
            if database.is_empty() {
                out.push_str(&format!("{pad}CreateTable({name})\n"));
            } else {
                out.push_str(&format!("{pad}CreateTable({database}.{name})\n"));
            }
            for (col, default) in schema.iter().zip(defaults) {
                let default_str = default.debug_string();
                if default_str.is_empty() {
                    out.push_str(&format!("{pad}  {} {}\n", col.name, col.data_type));
                } else {
                    out.push_str(&format!(
                        "{pad}  {} {} default {default_str}\n",
                        col.name, col.data_type
                    ));
                }
            }
        }
    }
}
