//! SELECT, set operations, and the outer ORDER BY / LIMIT / OFFSET shell.

use quarry_common::{Error, Result};
use sqlparser::ast::{
    self, Distinct, Expr as SqlExpr, GroupByExpr, Query, Select, SelectItem, SetExpr, SetOperator,
    SetQuantifier,
};

use crate::builder::scalar::{contains_aggregate, contains_window};
use crate::expr::{Expression, SortField};
use crate::plan::{expr_column, transform_expr_up, LogicalPlan, TreeIdentity};
use crate::scope::{Scope, ScopeColumn};

use super::PlanBuilder;

impl PlanBuilder<'_> {
    /// Builds a query: CTEs, the body, then the outer sort/limit/offset.
    pub(crate) fn build_query(&self, in_scope: &Scope, q: &Query) -> Result<Scope> {
        let mut scope = in_scope.clone();
        if let Some(with) = &q.with {
            if with.recursive {
                return Err(Error::UnsupportedFeature("WITH RECURSIVE".to_string()));
            }
            for cte in &with.cte_tables {
                let name = cte.alias.name.value.to_lowercase();
                let mut cte_scope = self.build_query(&scope, &cte.query)?;
                cte_scope.set_table_alias(&name);
                if !cte.alias.columns.is_empty() {
                    // positional column renames
                    let renames: Vec<String> = cte
                        .alias
                        .columns
                        .iter()
                        .map(|c| c.value.to_lowercase())
                        .collect();
                    let cols: Vec<_> = cte_scope.columns().to_vec();
                    let node = cte_scope.node.take();
                    let mut renamed = scope.push();
                    for (i, col) in cols.iter().enumerate() {
                        renamed.new_column(
                            col.database.clone(),
                            name.clone(),
                            renames.get(i).cloned().unwrap_or_else(|| col.column.clone()),
                            col.data_type.clone(),
                            col.nullable,
                        );
                    }
                    renamed.node = node;
                    cte_scope = renamed;
                }
                scope.set_cte(&name, cte_scope);
            }
        }

        let mut out = self.build_set_expr(&scope, &q.body)?;

        let sort_fields = match &q.order_by {
            Some(order_by) => self.build_order_by(&out, &order_by.exprs)?,
            None => Vec::new(),
        };
        let limit = q
            .limit
            .as_ref()
            .map(|e| self.build_scalar(&out, e))
            .transpose()?;
        let offset = q
            .offset
            .as_ref()
            .map(|o| self.build_scalar(&out, &o.value))
            .transpose()?;

        let node = out.take_node()?;
        out.node = Some(match node {
            LogicalPlan::Union {
                left,
                right,
                distinct,
                sort_fields: inner_sort,
                limit: inner_limit,
                offset: inner_offset,
            } => {
                // the union embeds the outer shell; both levels setting the
                // same clause is a conflict
                if !inner_sort.is_empty() && !sort_fields.is_empty() {
                    return Err(Error::ConflictingExternalQuery("ORDER BY"));
                }
                if inner_limit.is_some() && limit.is_some() {
                    return Err(Error::ConflictingExternalQuery("LIMIT"));
                }
                if inner_offset.is_some() && offset.is_some() {
                    return Err(Error::ConflictingExternalQuery("OFFSET"));
                }
                LogicalPlan::Union {
                    left,
                    right,
                    distinct,
                    sort_fields: if sort_fields.is_empty() {
                        inner_sort
                    } else {
                        sort_fields
                    },
                    limit: limit.or(inner_limit),
                    offset: offset.or(inner_offset),
                }
            }
            mut plain => {
                if !sort_fields.is_empty() {
                    plain = LogicalPlan::Sort {
                        fields: sort_fields,
                        input: Box::new(plain),
                    };
                }
                if let Some(offset) = offset {
                    plain = LogicalPlan::Offset {
                        offset,
                        input: Box::new(plain),
                    };
                }
                if let Some(limit) = limit {
                    plain = LogicalPlan::Limit {
                        limit,
                        input: Box::new(plain),
                    };
                }
                plain
            }
        });
        Ok(out)
    }

    fn build_set_expr(&self, scope: &Scope, body: &SetExpr) -> Result<Scope> {
        match body {
            SetExpr::Select(s) => self.build_select(scope, s),
            SetExpr::Query(q) => self.build_query(scope, q),
            SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => {
                let left_scope = self.build_set_expr(scope, left)?;
                let right_scope = self.build_set_expr(scope, right)?;
                self.build_union(left_scope, right_scope, set_quantifier)
            }
            SetExpr::SetOperation { op, .. } => {
                Err(Error::UnsupportedFeature(format!("{op} set operations")))
            }
            other => Err(Error::UnsupportedSyntax(other.to_string())),
        }
    }

    /// Combines two branches into a union. A left branch that is itself a
    /// union may carry an embedded sort/limit/offset from a parenthesized
    /// inner query; those hoist into the new node so the union tree stays
    /// flat, and a conflicting outer clause is reported when the query shell
    /// later attaches its own.
    fn build_union(
        &self,
        mut left: Scope,
        mut right: Scope,
        quantifier: &SetQuantifier,
    ) -> Result<Scope> {
        let distinct = !matches!(quantifier, SetQuantifier::All);
        let left_node = left.take_node()?;
        let right_node = right.take_node()?;

        let (left_node, sort_fields, limit, offset) = match left_node {
            LogicalPlan::Union {
                left: inner_left,
                right: inner_right,
                distinct: inner_distinct,
                sort_fields,
                limit,
                offset,
            } => (
                LogicalPlan::Union {
                    left: inner_left,
                    right: inner_right,
                    distinct: inner_distinct,
                    sort_fields: Vec::new(),
                    limit: None,
                    offset: None,
                },
                sort_fields,
                limit,
                offset,
            ),
            other => (other, Vec::new(), None, None),
        };

        left.node = Some(LogicalPlan::Union {
            left: Box::new(left_node),
            right: Box::new(right_node),
            distinct,
            sort_fields,
            limit,
            offset,
        });
        Ok(left)
    }

    fn build_select(&self, in_scope: &Scope, select: &Select) -> Result<Scope> {
        if let Some(Distinct::Distinct | Distinct::On(_)) = &select.distinct {
            return Err(Error::UnsupportedFeature("SELECT DISTINCT".to_string()));
        }

        let mut from_scope = self.build_from(in_scope, &select.from)?;

        let mut node = from_scope.take_node()?;
        if let Some(selection) = &select.selection {
            let predicate = self.build_scalar(&from_scope, selection)?;
            node = LogicalPlan::Filter {
                predicate,
                input: Box::new(node),
            };
        }

        let input_schema = node.schema();

        // projection list
        let mut proj: Vec<Expression> = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    for col in from_scope.columns() {
                        proj.push(col.scalar_gf());
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let table = name.to_string().to_lowercase();
                    let before = proj.len();
                    for col in from_scope.columns() {
                        if col.table == table {
                            proj.push(col.scalar_gf());
                        }
                    }
                    if proj.len() == before {
                        return Err(Error::TableNotFound(table));
                    }
                }
                SelectItem::UnnamedExpr(e) => proj.push(self.build_scalar(&from_scope, e)?),
                SelectItem::ExprWithAlias { expr, alias } => {
                    let built = self.build_scalar(&from_scope, expr)?;
                    proj.push(Expression::Alias {
                        name: alias.value.to_lowercase(),
                        child: Box::new(built),
                    });
                }
            }
        }

        let grouping = match &select.group_by {
            GroupByExpr::Expressions(exprs, ..) => {
                let mut out = Vec::with_capacity(exprs.len());
                for e in exprs {
                    out.push(self.build_scalar(&from_scope, e)?);
                }
                out
            }
            _ => return Err(Error::UnsupportedFeature("GROUP BY ALL".to_string())),
        };

        let has_aggregate = !grouping.is_empty() || proj.iter().any(contains_aggregate);
        let has_window = proj.iter().any(contains_window);
        if has_aggregate && has_window {
            return Err(Error::UnsupportedFeature(
                "mixing GROUP BY aggregates and window functions".to_string(),
            ));
        }

        node = if has_aggregate {
            LogicalPlan::GroupBy {
                selected: proj.clone(),
                grouping,
                input: Box::new(node),
            }
        } else if has_window {
            LogicalPlan::Window {
                exprs: proj.clone(),
                input: Box::new(node),
            }
        } else {
            LogicalPlan::Project {
                exprs: proj.clone(),
                input: Box::new(node),
            }
        };

        // the output scope exposes the projection's row layout
        let mut out = in_scope.push();
        for e in &proj {
            let col = expr_column(e, &input_schema);
            out.new_column(
                "",
                col.source.clone(),
                col.name.clone(),
                col.data_type.clone(),
                col.nullable,
            );
        }

        if let Some(having) = &select.having {
            node = self.build_having(&from_scope, &out, node, having)?;
        }

        out.node = Some(node);
        Ok(out)
    }

    /// HAVING filters the aggregated/projected output, so its references
    /// bind against the output row layout, where aliases are visible. A
    /// source column the projection hides is appended behind the visible
    /// outputs and a compensating Project restores the original shape above
    /// the filter.
    fn build_having(
        &self,
        from_scope: &Scope,
        out: &Scope,
        node: LogicalPlan,
        having: &SqlExpr,
    ) -> Result<LogicalPlan> {
        let predicate = self.build_scalar(out, having)?;
        if contains_aggregate(&predicate) {
            return Err(Error::UnsupportedFeature(
                "aggregates in HAVING; project the aggregate under an alias and filter on that"
                    .to_string(),
            ));
        }

        let mut hidden: Vec<ScopeColumn> = Vec::new();
        collect_hidden_columns(&predicate, from_scope, &mut hidden)?;
        if hidden.is_empty() {
            return Ok(LogicalPlan::Filter {
                predicate,
                input: Box::new(node),
            });
        }

        let width = out.columns().len();
        let extras: Vec<Expression> = hidden.iter().map(ScopeColumn::scalar_gf).collect();
        let extended = extend_node_outputs(node, extras);
        let (predicate, _) = transform_expr_up(predicate, &|e| match e {
            Expression::UnresolvedColumn { table, name } => {
                let position = hidden.iter().position(|c| {
                    c.column == name && table.as_deref().map_or(true, |t| c.table == t)
                });
                match position {
                    Some(i) => {
                        let c = &hidden[i];
                        Ok((
                            Expression::GetField {
                                table: c.table.clone(),
                                name: c.column.clone(),
                                index: width + i,
                                data_type: c.data_type.clone(),
                                nullable: c.nullable,
                            },
                            TreeIdentity::New,
                        ))
                    }
                    None => Ok((
                        Expression::UnresolvedColumn { table, name },
                        TreeIdentity::Same,
                    )),
                }
            }
            other => Ok((other, TreeIdentity::Same)),
        })?;

        let compensation: Vec<Expression> =
            out.columns().iter().map(ScopeColumn::scalar_gf).collect();
        Ok(LogicalPlan::Project {
            exprs: compensation,
            input: Box::new(LogicalPlan::Filter {
                predicate,
                input: Box::new(extended),
            }),
        })
    }

    /// ORDER BY terms: bare identifiers stay unresolved (they may name
    /// projection aliases or source columns hidden by the projection) and
    /// integer literals stay literal for the position-resolution rule.
    fn build_order_by(
        &self,
        scope: &Scope,
        exprs: &[ast::OrderByExpr],
    ) -> Result<Vec<SortField>> {
        let mut fields = Vec::with_capacity(exprs.len());
        for item in exprs {
            let expr = match &item.expr {
                SqlExpr::Identifier(ident) => Expression::UnresolvedColumn {
                    table: None,
                    name: ident.value.to_lowercase(),
                },
                SqlExpr::CompoundIdentifier(parts) if parts.len() == 2 => {
                    Expression::UnresolvedColumn {
                        table: Some(parts[0].value.to_lowercase()),
                        name: parts[1].value.to_lowercase(),
                    }
                }
                other => self.build_scalar(scope, other)?,
            };
            let descending = item.asc == Some(false);
            fields.push(SortField {
                expr,
                descending,
                nulls_first: item.nulls_first.unwrap_or(!descending),
            });
        }
        Ok(fields)
    }
}

/// Collects unresolved references in a HAVING predicate that name source
/// columns the projection does not expose.
fn collect_hidden_columns(
    e: &Expression,
    from_scope: &Scope,
    out: &mut Vec<ScopeColumn>,
) -> Result<()> {
    if let Expression::UnresolvedColumn { table, name } = e {
        if let Some(col) = from_scope.resolve_column(table.as_deref(), name)? {
            if !out
                .iter()
                .any(|c| c.table == col.table && c.column == col.column)
            {
                out.push(col);
            }
        }
        return Ok(());
    }
    for child in e.children() {
        collect_hidden_columns(child, from_scope, out)?;
    }
    Ok(())
}

/// The projection-shaped node with extra output expressions appended.
fn extend_node_outputs(node: LogicalPlan, extras: Vec<Expression>) -> LogicalPlan {
    match node {
        LogicalPlan::Project { mut exprs, input } => {
            exprs.extend(extras);
            LogicalPlan::Project { exprs, input }
        }
        LogicalPlan::GroupBy {
            mut selected,
            grouping,
            input,
        } => {
            selected.extend(extras);
            LogicalPlan::GroupBy {
                selected,
                grouping,
                input,
            }
        }
        LogicalPlan::Window { mut exprs, input } => {
            exprs.extend(extras);
            LogicalPlan::Window { exprs, input }
        }
        other => other,
    }
}
