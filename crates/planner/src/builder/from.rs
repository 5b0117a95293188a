//! FROM clause translation: data sources and joins.

use quarry_common::{Error, Result, Value};
use quarry_storage::catalog::unwrap_database;
use sqlparser::ast::{
    self, Expr as SqlExpr, FunctionArg, FunctionArgExpr, Join as AstJoin, JoinConstraint,
    JoinOperator, ObjectName, SetExpr, TableFactor, TableWithJoins,
};

use crate::builder::scalar::contains_bind_var;
use crate::expr::{BinaryOp, Expression};
use crate::plan::{JoinType, JsonTableCol, JsonTableColOpts, LogicalPlan};
use crate::scope::{Scope, ScopeColumn};

use super::ddl::map_ast_type;
use super::PlanBuilder;

impl PlanBuilder<'_> {
    /// Builds the FROM clause. An empty list is the dual table; multiple
    /// comma entries fold into a left-deep cross join.
    pub(crate) fn build_from(&self, in_scope: &Scope, from: &[TableWithJoins]) -> Result<Scope> {
        if from.is_empty() {
            let mut out = in_scope.push();
            out.node = Some(LogicalPlan::Dual);
            return Ok(out);
        }

        let mut out = self.build_table_with_joins(in_scope, &from[0])?;
        for entry in &from[1..] {
            let right = self.build_table_with_joins(in_scope, entry)?;
            out = self.join_scopes(in_scope, out, right, JoinType::Cross, None)?;
        }
        Ok(out)
    }

    fn build_table_with_joins(&self, in_scope: &Scope, twj: &TableWithJoins) -> Result<Scope> {
        let mut left = self.build_data_source(in_scope, &twj.relation)?;
        for join in &twj.joins {
            left = self.build_join(in_scope, left, join)?;
        }
        Ok(left)
    }

    fn build_join(&self, in_scope: &Scope, left: Scope, join: &AstJoin) -> Result<Scope> {
        let lateral = is_lateral(&join.relation);
        let right_join = matches!(join.join_operator, JoinOperator::RightOuter(_));

        // a lateral right side sees the left side's columns, except under
        // RIGHT JOIN
        let right = if lateral && !right_join {
            self.build_data_source(&left, &join.relation)?
        } else {
            self.build_data_source(in_scope, &join.relation)?
        };

        self.validate_join_table_names(&left, &right)?;

        let (base_op, constraint) = match &join.join_operator {
            JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
            JoinOperator::LeftOuter(c) => (JoinType::LeftOuter, Some(c)),
            JoinOperator::RightOuter(c) => (JoinType::RightOuter, Some(c)),
            JoinOperator::FullOuter(c) => (JoinType::FullOuter, Some(c)),
            JoinOperator::CrossJoin => (JoinType::Cross, None),
            other => {
                return Err(Error::UnsupportedSyntax(format!("join operator {other:?}")))
            }
        };
        let op = if lateral { base_op.as_lateral() } else { base_op };

        match constraint {
            None | Some(JoinConstraint::None) => {
                let cross = if lateral { JoinType::LateralCross } else { JoinType::Cross };
                self.join_scopes(in_scope, left, right, cross, None)
            }
            Some(JoinConstraint::Natural) => {
                self.build_natural_join(in_scope, left, right, None)
            }
            Some(JoinConstraint::Using(cols)) => {
                let names: Vec<String> = cols.iter().map(|c| c.value.to_lowercase()).collect();
                self.build_natural_join(in_scope, left, right, Some(&names))
            }
            Some(JoinConstraint::On(cond)) => {
                // a trivially true condition on an inner join is a cross join
                if is_true_literal(cond) && matches!(base_op, JoinType::Inner | JoinType::Cross) {
                    let cross = if lateral { JoinType::LateralCross } else { JoinType::Cross };
                    return self.join_scopes(in_scope, left, right, cross, None);
                }
                self.join_scopes_with_condition(in_scope, left, right, op, cond)
            }
        }
    }

    fn validate_join_table_names(&self, left: &Scope, right: &Scope) -> Result<()> {
        for t in left.table_names() {
            if right.has_table(&t) {
                return Err(Error::DuplicateAliasOrTable(t));
            }
        }
        Ok(())
    }

    fn join_scopes_with_condition(
        &self,
        in_scope: &Scope,
        left: Scope,
        right: Scope,
        op: JoinType,
        cond: &SqlExpr,
    ) -> Result<Scope> {
        let mut combined = in_scope.push();
        combined.append_columns_from_scope(&left);
        combined.append_columns_from_scope(&right);
        let condition = self.build_scalar(&combined, cond)?;
        self.finish_join(left, right, combined, op, Some(condition))
    }

    fn join_scopes(
        &self,
        in_scope: &Scope,
        left: Scope,
        right: Scope,
        op: JoinType,
        condition: Option<Expression>,
    ) -> Result<Scope> {
        let mut combined = in_scope.push();
        combined.append_columns_from_scope(&left);
        combined.append_columns_from_scope(&right);
        self.finish_join(left, right, combined, op, condition)
    }

    fn finish_join(
        &self,
        mut left: Scope,
        mut right: Scope,
        mut combined: Scope,
        op: JoinType,
        condition: Option<Expression>,
    ) -> Result<Scope> {
        let left_node = left.take_node()?;
        let right_node = right.take_node()?;
        combined.node = Some(LogicalPlan::Join {
            op,
            condition,
            left: Box::new(left_node),
            right: Box::new(right_node),
        });
        Ok(combined)
    }

    /// NATURAL JOIN (and USING, which restricts the shared-name set):
    /// shared columns induce equality conjuncts and redirect right-side
    /// references to the left definition; the output projects left columns
    /// then unshared right columns. With no shared names the join degrades
    /// to a cross join.
    fn build_natural_join(
        &self,
        in_scope: &Scope,
        mut left: Scope,
        mut right: Scope,
        using: Option<&[String]>,
    ) -> Result<Scope> {
        let mut combined = in_scope.push();
        combined.append_columns_from_scope(&left);
        combined.append_columns_from_scope(&right);
        let left_len = left.columns().len();
        let left_cols: Vec<ScopeColumn> = combined.columns()[..left_len].to_vec();
        let right_cols: Vec<ScopeColumn> = combined.columns()[left_len..].to_vec();

        let mut out = in_scope.push();
        let mut proj: Vec<Expression> = Vec::new();
        let mut redirects: Vec<(ScopeColumn, ScopeColumn)> = Vec::new();
        for l in &left_cols {
            proj.push(l.scalar_gf());
        }

        let mut filter: Option<Expression> = None;
        for r in &right_cols {
            let shared = using.map_or(true, |names| names.contains(&r.column));
            let matched = if shared {
                left_cols.iter().find(|l| l.column == r.column)
            } else {
                None
            };
            match matched {
                Some(l) => {
                    redirects.push((r.clone(), l.clone()));
                    let eq = Expression::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(l.scalar_gf()),
                        right: Box::new(r.scalar_gf()),
                    };
                    filter = Some(match filter {
                        None => eq,
                        Some(prev) => Expression::And {
                            left: Box::new(prev),
                            right: Box::new(eq),
                        },
                    });
                }
                None => proj.push(r.scalar_gf()),
            }
        }

        let left_node = left.take_node()?;
        let right_node = right.take_node()?;

        let filter = match filter {
            None => {
                // no shared column names: plain cross join, no projection
                let mut cross = in_scope.push();
                cross.append_columns_from_scope(&combined);
                cross.node = Some(LogicalPlan::Join {
                    op: JoinType::Cross,
                    condition: None,
                    left: Box::new(left_node),
                    right: Box::new(right_node),
                });
                return Ok(cross);
            }
            Some(f) => f,
        };

        // the output scope holds the projected columns, renumbered to the
        // projection's row layout
        for e in &proj {
            if let Expression::GetField {
                table,
                name,
                data_type,
                nullable,
                ..
            } = e
            {
                out.new_column("", table.clone(), name.clone(), data_type.clone(), *nullable);
            }
        }
        for (from, to) in redirects {
            // the redirect target is the projected left column, which keeps
            // its position in the projection output
            out.redirect(&from, to);
        }

        out.node = Some(LogicalPlan::Project {
            exprs: proj,
            input: Box::new(LogicalPlan::Join {
                op: JoinType::Inner,
                condition: Some(filter),
                left: Box::new(left_node),
                right: Box::new(right_node),
            }),
        });
        Ok(out)
    }

    /// Builds one FROM entry.
    pub(crate) fn build_data_source(&self, in_scope: &Scope, te: &TableFactor) -> Result<Scope> {
        match te {
            TableFactor::Table {
                name,
                alias,
                args: None,
                version,
                ..
            } => {
                let (db, table) = split_object_name(name)?;
                let mut out = match in_scope.get_cte(&table) {
                    Some(cte) => cte,
                    None => {
                        let as_of = match version {
                            Some(ast::TableVersion::ForSystemTimeAsOf(e)) => Some(e),
                            None => None,
                        };
                        self.build_tablescan(in_scope, &db, &table, as_of)?
                    }
                };
                if let Some(alias) = alias {
                    let name = alias.name.value.to_lowercase();
                    out.set_table_alias(&name);
                    let node = out.take_node()?;
                    out.node = Some(LogicalPlan::TableAlias {
                        name,
                        input: Box::new(node),
                    });
                }
                Ok(out)
            }
            TableFactor::Table {
                name,
                alias,
                args: Some(args),
                ..
            } => self.build_table_func(in_scope, name, &args.args, alias.as_ref()),
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                if let SetExpr::Values(values) = subquery.body.as_ref() {
                    return self.build_values_table(in_scope, values, alias.as_ref());
                }
                let alias = alias.as_ref().ok_or_else(|| {
                    Error::UnsupportedFeature("subquery without alias".to_string())
                })?;
                let sq_scope = in_scope.push();
                let mut inner = self.build_query(&sq_scope, subquery)?;
                let inner_node = inner.take_node()?;

                let name = alias.name.value.to_lowercase();
                let renames: Vec<String> =
                    alias.columns.iter().map(|c| c.value.to_lowercase()).collect();

                let mut out = in_scope.push();
                let sq = LogicalPlan::SubqueryAlias {
                    name: name.clone(),
                    columns: renames.clone(),
                    lateral: *lateral,
                    input: Box::new(inner_node),
                };
                for (i, col) in sq.schema().iter().enumerate() {
                    let col_name = renames.get(i).cloned().unwrap_or_else(|| col.name.clone());
                    out.new_column("", name.clone(), col_name, col.data_type.clone(), col.nullable);
                }
                out.node = Some(sq);
                Ok(out)
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.build_table_with_joins(in_scope, table_with_joins),
            TableFactor::JsonTable {
                json_expr,
                json_path,
                columns,
                alias,
            } => self.build_json_table(in_scope, json_expr, json_path, columns, alias.as_ref()),
            other => Err(Error::UnsupportedSyntax(other.to_string())),
        }
    }

    fn build_values_table(
        &self,
        in_scope: &Scope,
        values: &ast::Values,
        alias: Option<&ast::TableAlias>,
    ) -> Result<Scope> {
        let alias = alias.ok_or_else(|| {
            Error::UnsupportedSyntax("every derived table must have an alias".to_string())
        })?;
        let mut rows = Vec::with_capacity(values.rows.len());
        for tuple in &values.rows {
            let mut row = Vec::with_capacity(tuple.len());
            for e in tuple {
                row.push(self.build_scalar(in_scope, e)?);
            }
            rows.push(row);
        }
        let name = alias.name.value.to_lowercase();
        let renames: Vec<String> = alias.columns.iter().map(|c| c.value.to_lowercase()).collect();

        let mut out = in_scope.push();
        let vdt = LogicalPlan::ValueDerivedTable {
            name: name.clone(),
            columns: renames,
            rows,
        };
        for col in vdt.schema().iter() {
            out.new_column(
                "",
                name.clone(),
                col.name.clone(),
                col.data_type.clone(),
                col.nullable,
            );
        }
        out.node = Some(vdt);
        Ok(out)
    }

    fn build_table_func(
        &self,
        in_scope: &Scope,
        name: &ObjectName,
        args: &[FunctionArg],
        alias: Option<&ast::TableAlias>,
    ) -> Result<Scope> {
        let (_, func_name) = split_object_name(name)?;
        let mut built_args = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                    built_args.push(self.build_scalar(in_scope, e)?)
                }
                other => return Err(Error::UnsupportedSyntax(other.to_string())),
            }
        }

        let function = self.catalog.table_function(self.ctx, &func_name)?;

        let deferred = built_args.iter().any(contains_bind_var);
        let table = if deferred {
            // instantiation waits for bind values at execution time
            None
        } else {
            let mut values = Vec::with_capacity(built_args.len());
            for e in &built_args {
                values.push(e.eval(self.ctx, &Vec::new())?);
            }
            Some(function.instance(&values)?)
        };

        // a table function is always wrapped in an alias, defaulting to the
        // function's name
        let alias_name = alias
            .map(|a| a.name.value.to_lowercase())
            .unwrap_or_else(|| func_name.clone());

        let mut out = in_scope.push();
        let tf = LogicalPlan::TableFunction {
            name: func_name,
            args: built_args,
            table,
        };
        for col in tf.schema().iter() {
            out.new_column(
                self.ctx.current_database(),
                alias_name.clone(),
                col.name.clone(),
                col.data_type.clone(),
                col.nullable,
            );
        }
        out.node = Some(LogicalPlan::TableAlias {
            name: alias_name,
            input: Box::new(tf),
        });
        Ok(out)
    }

    fn build_json_table(
        &self,
        in_scope: &Scope,
        json_expr: &SqlExpr,
        json_path: &ast::Value,
        columns: &[ast::JsonTableColumn],
        alias: Option<&ast::TableAlias>,
    ) -> Result<Scope> {
        let data = self.build_scalar(in_scope, json_expr)?;
        if matches!(data, Expression::Subquery { .. }) {
            return Err(Error::InvalidArgument("JSON_TABLE".to_string()));
        }
        let path = match json_path {
            ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => s.clone(),
            other => return Err(Error::UnsupportedSyntax(other.to_string())),
        };
        let alias_name = alias
            .map(|a| a.name.value.to_lowercase())
            .unwrap_or_else(|| "json_table".to_string());

        let cols = self.build_json_table_cols(in_scope, columns)?;

        let mut out = in_scope.push();
        let jt = LogicalPlan::JsonTable {
            data,
            path,
            alias: alias_name.clone(),
            columns: cols,
        };
        for col in jt.schema().iter() {
            out.new_column(
                "",
                alias_name.clone(),
                col.name.clone(),
                col.data_type.clone(),
                col.nullable,
            );
        }
        out.node = Some(jt);
        Ok(out)
    }

    fn build_json_table_cols(
        &self,
        in_scope: &Scope,
        columns: &[ast::JsonTableColumn],
    ) -> Result<Vec<JsonTableCol>> {
        let mut out = Vec::with_capacity(columns.len());
        for def in columns {
            let (default_empty, error_on_empty) =
                self.build_json_column_handling(in_scope, &def.on_empty)?;
            let (default_error, error_on_error) =
                self.build_json_column_handling(in_scope, &def.on_error)?;
            let path = match &def.path {
                ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => s.clone(),
                other => return Err(Error::UnsupportedSyntax(other.to_string())),
            };
            out.push(JsonTableCol {
                path,
                opts: Some(JsonTableColOpts {
                    name: def.name.value.to_lowercase(),
                    data_type: map_ast_type(&def.r#type)?,
                    for_ordinality: false,
                    exists: def.exists,
                    default_empty,
                    default_error,
                    error_on_empty,
                    error_on_error,
                }),
                nested: Vec::new(),
            });
        }
        Ok(out)
    }

    /// Returns the default expression and the error-instead flag for an ON
    /// EMPTY / ON ERROR clause.
    fn build_json_column_handling(
        &self,
        _in_scope: &Scope,
        handling: &Option<ast::JsonTableColumnErrorHandling>,
    ) -> Result<(Expression, bool)> {
        use ast::JsonTableColumnErrorHandling as H;
        let null_literal =
            Expression::literal(Value::Null, arrow_schema::DataType::Null);
        Ok(match handling {
            None | Some(H::Null) => (null_literal, false),
            Some(H::Error) => (null_literal, true),
            Some(H::Default(v)) => (super::scalar::build_literal(v)?, false),
        })
    }

    /// Resolves a table against the catalog, handling the AS OF marker.
    pub(crate) fn build_tablescan(
        &self,
        in_scope: &Scope,
        db: &str,
        name: &str,
        as_of: Option<&SqlExpr>,
    ) -> Result<Scope> {
        let mut out = in_scope.push();
        let db = if db.is_empty() {
            self.ctx.current_database().to_string()
        } else {
            db.to_string()
        };

        let mut as_of_expr: Option<Expression> = None;
        let mut as_of_value: Option<Value> = None;
        let mut deferred = false;
        if let Some(raw) = as_of {
            let mut built = self.build_scalar(in_scope, raw)?;
            deferred = contains_bind_var(&built);
            if !deferred {
                // a naked identifier is read as its own string form
                if let Expression::UnresolvedColumn { table: None, name } = &built {
                    built = Expression::literal(
                        Value::Utf8(name.clone()),
                        arrow_schema::DataType::Utf8,
                    );
                }
                as_of_value = Some(built.eval(self.ctx, &Vec::new())?);
            }
            as_of_expr = Some(built);
        }

        let lookup = match &as_of_value {
            Some(marker) => self.catalog.table_as_of(self.ctx, &db, name, marker),
            None => self.catalog.table(self.ctx, &db, name),
        };
        let (table, database) = lookup.map_err(|e| match e {
            Error::DatabaseNotFound(_) if db.is_empty() => Error::NoDatabaseSelected,
            other => other,
        })?;
        let database = unwrap_database(database);

        for c in table.schema().iter() {
            out.new_column(
                db.to_lowercase(),
                table.name().to_lowercase(),
                c.name.to_lowercase(),
                c.data_type.clone(),
                c.nullable,
            );
        }

        let rt = LogicalPlan::ResolvedTable {
            table,
            database: Some(database),
            as_of: as_of_value,
        };
        out.node = Some(if deferred {
            let (table, database) = match rt {
                LogicalPlan::ResolvedTable {
                    table, database, ..
                } => (table, database),
                _ => unreachable!("constructed above"),
            };
            LogicalPlan::DeferredAsOfTable {
                table,
                database,
                as_of: as_of_expr.expect("deferred implies expression"),
            }
        } else {
            rt
        });
        Ok(out)
    }
}

fn is_lateral(te: &TableFactor) -> bool {
    match te {
        TableFactor::Derived { lateral, .. } => *lateral,
        TableFactor::JsonTable { .. } => true,
        _ => false,
    }
}

fn is_true_literal(e: &SqlExpr) -> bool {
    matches!(e, SqlExpr::Value(ast::Value::Boolean(true)))
}

pub(crate) fn split_object_name(name: &ObjectName) -> Result<(String, String)> {
    match name.0.as_slice() {
        [t] => Ok((String::new(), t.value.to_lowercase())),
        [db, t] => Ok((db.value.to_lowercase(), t.value.to_lowercase())),
        _ => Err(Error::UnsupportedSyntax(name.to_string())),
    }
}
