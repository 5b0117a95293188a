//! Generic plan and expression tree walks.
//!
//! Rewrites report a [`TreeIdentity`] so drivers can skip recomposition of
//! untouched subtrees and short-circuit fixed-point loops.

use quarry_common::Result;

use crate::expr::Expression;
use crate::plan::LogicalPlan;

/// Whether a rewrite changed the subtree it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeIdentity {
    /// The subtree is unchanged; the driver may skip recomposition.
    Same,
    /// The subtree was rewritten and must be reconsidered.
    New,
}

impl TreeIdentity {
    /// Combines two identities: new wins.
    pub fn merge(self, other: TreeIdentity) -> TreeIdentity {
        if self == TreeIdentity::New || other == TreeIdentity::New {
            TreeIdentity::New
        } else {
            TreeIdentity::Same
        }
    }
}

/// Preorder walk. `f` returns `false` to prune a subtree. Do not mutate.
pub fn inspect(node: &LogicalPlan, f: &mut dyn FnMut(&LogicalPlan) -> bool) {
    if !f(node) {
        return;
    }
    for child in node.children() {
        inspect(child, f);
    }
}

/// Bottom-up plan rewrite. Children are rewritten first; `f` then sees the
/// recomposed node. Returning [`TreeIdentity::Same`] skips recomposition at
/// that level.
pub fn transform_up<F>(node: LogicalPlan, f: &F) -> Result<(LogicalPlan, TreeIdentity)>
where
    F: Fn(LogicalPlan) -> Result<(LogicalPlan, TreeIdentity)>,
{
    let children = node.children();
    if children.is_empty() {
        return f(node);
    }

    let mut new_children = Vec::with_capacity(children.len());
    let mut identity = TreeIdentity::Same;
    for child in children {
        let (rewritten, id) = transform_up(child.clone(), f)?;
        identity = identity.merge(id);
        new_children.push(rewritten);
    }

    let node = if identity == TreeIdentity::New {
        node.with_children(new_children)?
    } else {
        node
    };

    let (node, id) = f(node)?;
    Ok((node, identity.merge(id)))
}

/// Bottom-up expression rewrite.
pub fn transform_expr_up<F>(expr: Expression, f: &F) -> Result<(Expression, TreeIdentity)>
where
    F: Fn(Expression) -> Result<(Expression, TreeIdentity)>,
{
    let children = expr.children();
    if children.is_empty() {
        return f(expr);
    }

    let mut new_children = Vec::with_capacity(children.len());
    let mut identity = TreeIdentity::Same;
    for child in children {
        let (rewritten, id) = transform_expr_up(child.clone(), f)?;
        identity = identity.merge(id);
        new_children.push(rewritten);
    }

    let expr = if identity == TreeIdentity::New {
        expr.with_children(new_children)?
    } else {
        expr
    };

    let (expr, id) = f(expr)?;
    Ok((expr, identity.merge(id)))
}

/// Rewrites every expression of every node, bottom-up over the plan.
pub fn transform_expressions_up<F>(
    node: LogicalPlan,
    f: &F,
) -> Result<(LogicalPlan, TreeIdentity)>
where
    F: Fn(Expression) -> Result<(Expression, TreeIdentity)>,
{
    transform_up(node, &|n| {
        let exprs = n.expressions();
        if exprs.is_empty() {
            return Ok((n, TreeIdentity::Same));
        }
        let mut identity = TreeIdentity::Same;
        let mut new_exprs = Vec::with_capacity(exprs.len());
        for e in exprs {
            let (rewritten, id) = transform_expr_up(e.clone(), f)?;
            identity = identity.merge(id);
            new_exprs.push(rewritten);
        }
        if identity == TreeIdentity::Same {
            return Ok((n, TreeIdentity::Same));
        }
        Ok((n.with_expressions(new_exprs)?, TreeIdentity::New))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use quarry_common::Value;

    fn lit(i: i64) -> Expression {
        Expression::literal(Value::Int64(i), DataType::Int64)
    }

    fn filter_over_dual() -> LogicalPlan {
        LogicalPlan::Filter {
            predicate: lit(1),
            input: Box::new(LogicalPlan::Limit {
                limit: lit(10),
                input: Box::new(LogicalPlan::Dual),
            }),
        }
    }

    #[test]
    fn inspect_prunes_on_false() {
        let mut seen = Vec::new();
        inspect(&filter_over_dual(), &mut |n| {
            seen.push(n.kind());
            n.kind() != "Limit"
        });
        assert_eq!(seen, vec!["Filter", "Limit"]);
    }

    #[test]
    fn transform_up_reports_same_for_identity() {
        let (_, id) =
            transform_up(filter_over_dual(), &|n| Ok((n, TreeIdentity::Same))).expect("walk");
        assert_eq!(id, TreeIdentity::Same);
    }

    #[test]
    fn transform_expressions_up_rewrites_all_nodes() {
        let (plan, id) = transform_expressions_up(filter_over_dual(), &|e| match e {
            Expression::Literal {
                value: Value::Int64(i),
                ..
            } => Ok((lit(i + 1), TreeIdentity::New)),
            other => Ok((other, TreeIdentity::Same)),
        })
        .expect("walk");
        assert_eq!(id, TreeIdentity::New);
        match plan {
            LogicalPlan::Filter { predicate, input } => {
                assert_eq!(predicate.to_string(), "2");
                match *input {
                    LogicalPlan::Limit { limit, .. } => assert_eq!(limit.to_string(), "11"),
                    other => panic!("expected Limit, got {}", other.kind()),
                }
            }
            other => panic!("expected Filter, got {}", other.kind()),
        }
    }
}
