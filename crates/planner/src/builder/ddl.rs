//! CREATE TABLE translation: schema and column defaults.

use arrow_schema::{DataType, TimeUnit};
use quarry_common::{Column, Error, Result, Schema};
use sqlparser::ast::{
    self, ColumnOption, CreateTable, Expr as SqlExpr,
};

use crate::expr::{ColumnDefault, ColumnDefaultValue, Expression};
use crate::plan::LogicalPlan;
use crate::scope::Scope;

use super::from::split_object_name;
use super::scalar::NOW_FUNCTIONS;
use super::PlanBuilder;

impl PlanBuilder<'_> {
    /// Builds a CREATE TABLE statement into a schema-carrying node with
    /// per-column defaults. Literal defaults are type-checked here; DDL text
    /// serialization stays outside the core.
    pub(crate) fn build_create_table(&self, ct: &CreateTable) -> Result<LogicalPlan> {
        let (db, name) = split_object_name(&ct.name)?;
        let database = if db.is_empty() {
            self.ctx.current_database().to_string()
        } else {
            db
        };

        let mut columns = Vec::with_capacity(ct.columns.len());
        let mut defaults = Vec::with_capacity(ct.columns.len());
        for def in &ct.columns {
            let data_type = map_ast_type(&def.data_type)?;
            let mut nullable = true;
            let mut default_expr: Option<&SqlExpr> = None;
            for opt in &def.options {
                match &opt.option {
                    ColumnOption::NotNull => nullable = false,
                    ColumnOption::Null => nullable = true,
                    ColumnOption::Unique { is_primary, .. } if *is_primary => nullable = false,
                    ColumnOption::Default(e) => default_expr = Some(e),
                    _ => {}
                }
            }

            let default = match default_expr {
                None => ColumnDefault::Implicit,
                Some(e) => self.build_column_default(
                    &def.name.value,
                    e,
                    data_type.clone(),
                    nullable,
                )?,
            };
            default.check_type(self.ctx)?;

            columns.push(Column::new(
                name.clone(),
                def.name.value.to_lowercase(),
                data_type,
                nullable,
            ));
            defaults.push(default);
        }

        Ok(LogicalPlan::CreateTable {
            database,
            name,
            schema: Schema::new(columns),
            defaults,
        })
    }

    /// Builds one column's DEFAULT clause.
    ///
    /// `DEFAULT 3` is a literal; `DEFAULT (expr)` is a parenthesized
    /// expression; a bare evaluation-time call (`DEFAULT CURRENT_TIMESTAMP`)
    /// is only valid for datetime-like columns.
    fn build_column_default(
        &self,
        column: &str,
        e: &SqlExpr,
        out_type: DataType,
        nullable: bool,
    ) -> Result<ColumnDefault> {
        let scope = Scope::new();
        let (expr, literal, parenthesized) = match e {
            SqlExpr::Nested(inner) => (self.build_scalar(&scope, inner)?, false, true),
            other => {
                let built = self.build_scalar(&scope, other)?;
                let literal = matches!(built, Expression::Literal { .. });
                (built, literal, false)
            }
        };

        if !literal && !parenthesized && !is_bare_now_allowed(&expr, &out_type) {
            return Err(Error::InvalidArgument(format!(
                "default value for column {column}"
            )));
        }

        Ok(ColumnDefault::Explicit(ColumnDefaultValue::new(
            expr,
            Some(out_type),
            literal,
            parenthesized,
            nullable,
        )))
    }
}

fn is_bare_now_allowed(expr: &Expression, out_type: &DataType) -> bool {
    let is_now = matches!(
        expr,
        Expression::FunctionCall { name, .. } if NOW_FUNCTIONS.contains(&name.as_str())
    );
    is_now
        && matches!(
            out_type,
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
        )
}

/// Maps a declared SQL column type to the engine's type vocabulary.
pub(crate) fn map_ast_type(t: &ast::DataType) -> Result<DataType> {
    Ok(match t {
        ast::DataType::TinyInt(_) => DataType::Int8,
        ast::DataType::SmallInt(_) => DataType::Int16,
        ast::DataType::Int(_) | ast::DataType::Integer(_) | ast::DataType::MediumInt(_) => {
            DataType::Int32
        }
        ast::DataType::BigInt(_) => DataType::Int64,
        ast::DataType::UnsignedTinyInt(_) => DataType::UInt8,
        ast::DataType::UnsignedSmallInt(_) => DataType::UInt16,
        ast::DataType::UnsignedInt(_)
        | ast::DataType::UnsignedInteger(_)
        | ast::DataType::UnsignedMediumInt(_) => DataType::UInt32,
        ast::DataType::UnsignedBigInt(_) => DataType::UInt64,
        ast::DataType::Float(_) | ast::DataType::Real => DataType::Float32,
        ast::DataType::Double | ast::DataType::DoublePrecision => DataType::Float64,
        ast::DataType::Boolean | ast::DataType::Bool => DataType::Boolean,
        ast::DataType::Char(_)
        | ast::DataType::Varchar(_)
        | ast::DataType::Text
        | ast::DataType::String(_) => DataType::Utf8,
        ast::DataType::Date => DataType::Date32,
        ast::DataType::Datetime(_) | ast::DataType::Timestamp(_, _) => {
            DataType::Timestamp(TimeUnit::Microsecond, None)
        }
        ast::DataType::Decimal(_) | ast::DataType::Numeric(_) => DataType::Decimal128(10, 0),
        other => return Err(Error::UnsupportedFeature(format!("column type {other}"))),
    })
}
