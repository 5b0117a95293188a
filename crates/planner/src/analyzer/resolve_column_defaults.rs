//! Column default binding on schema-carrying nodes.

use quarry_common::{Error, Result, SessionContext};
use quarry_storage::Catalog;
use sqlparser::ast::{SelectItem, SetExpr, Statement};

use crate::analyzer::{AnalyzerRule, RuleId};
use crate::builder::PlanBuilder;
use crate::expr::{ColumnDefault, ColumnDefaultValue, Expression};
use crate::plan::{transform_up, LogicalPlan, TreeIdentity};

/// Binds unresolved column defaults carried by schema-carrying nodes:
/// the default's expression text is parsed and built, the column's type
/// becomes the coercion target, and literal defaults are probed for type
/// compatibility.
///
/// The builder's own CREATE TABLE path binds defaults inline; this rule
/// covers trees assembled programmatically with textual defaults.
pub struct ResolveColumnDefaults;

impl AnalyzerRule for ResolveColumnDefaults {
    fn id(&self) -> RuleId {
        RuleId::ResolveColumnDefaults
    }

    fn apply(
        &self,
        ctx: &SessionContext,
        catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)> {
        transform_up(plan, &|node| match &node {
            LogicalPlan::CreateTable {
                database,
                name,
                schema,
                defaults,
            } if defaults.iter().any(needs_binding) => {
                let mut bound = Vec::with_capacity(defaults.len());
                for (i, default) in defaults.iter().enumerate() {
                    if !needs_binding(default) {
                        bound.push(default.clone());
                        continue;
                    }
                    let column = schema.column(i).ok_or_else(|| {
                        Error::InAnalysis(format!(
                            "default {i} has no matching column in {name}"
                        ))
                    })?;
                    let rebound = bind_default(ctx, catalog, default, column)?;
                    rebound.check_type(ctx)?;
                    bound.push(rebound);
                }
                Ok((
                    LogicalPlan::CreateTable {
                        database: database.clone(),
                        name: name.clone(),
                        schema: schema.clone(),
                        defaults: bound,
                    },
                    TreeIdentity::New,
                ))
            }
            _ => Ok((node, TreeIdentity::Same)),
        })
    }
}

fn needs_binding(default: &ColumnDefault) -> bool {
    match default {
        ColumnDefault::Implicit => false,
        ColumnDefault::Explicit(v) => !v.resolved(),
    }
}

fn bind_default(
    ctx: &SessionContext,
    catalog: &dyn Catalog,
    default: &ColumnDefault,
    column: &quarry_common::Column,
) -> Result<ColumnDefault> {
    let ColumnDefault::Explicit(value) = default else {
        return Ok(default.clone());
    };

    match &value.expr {
        Expression::UnresolvedColumnDefault { expr_string } => {
            let expr = parse_default_expr(ctx, catalog, expr_string)?;
            let literal = matches!(expr, Expression::Literal { .. });
            let parenthesized = expr_string.trim().starts_with('(');
            Ok(ColumnDefault::Explicit(ColumnDefaultValue::new(
                expr,
                Some(column.data_type.clone()),
                literal,
                parenthesized,
                column.nullable,
            )))
        }
        _ => {
            // expression already built; only the coercion target is missing
            let mut value = value.clone();
            value.out_type = Some(column.data_type.clone());
            Ok(ColumnDefault::Explicit(value))
        }
    }
}

/// Parses a default expression by planting it in a one-item SELECT.
fn parse_default_expr(
    ctx: &SessionContext,
    catalog: &dyn Catalog,
    expr_string: &str,
) -> Result<Expression> {
    let stmt = quarry_sql::parse_one(&format!("SELECT {expr_string}"))?;
    let Statement::Query(q) = &stmt else {
        return Err(Error::InAnalysis(format!(
            "default expression {expr_string} did not parse as an expression"
        )));
    };
    let SetExpr::Select(select) = q.body.as_ref() else {
        return Err(Error::InAnalysis(format!(
            "default expression {expr_string} did not parse as an expression"
        )));
    };
    let Some(SelectItem::UnnamedExpr(e)) = select.projection.first() else {
        return Err(Error::InAnalysis(format!(
            "default expression {expr_string} did not parse as an expression"
        )));
    };
    let builder = PlanBuilder::new(ctx, catalog);
    builder.build_scalar(&crate::scope::Scope::new(), e)
}
