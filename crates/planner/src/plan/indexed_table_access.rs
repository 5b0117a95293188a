//! Indexed lookups of resolved tables.
//!
//! An [`IndexedTableAccess`] wraps a resolved table and either a static
//! lookup computed at analysis time or a [`LookupBuilder`] that turns each
//! row from the primary side of a join into a fresh lookup against a
//! secondary index.

use std::sync::Arc;

use quarry_common::{Error, Result, Row, Schema, SessionContext, Value};
use quarry_storage::index::{
    all_range, closed_range, not_null_range, null_range, ColumnExpressionType, Index, IndexLookup,
    Range, RangeCollection, RangeColumnExpr,
};
use quarry_storage::table::{unwrap_table, IndexedTable, RowIter, Table};
use quarry_storage::Database;

use crate::expr::Expression;

/// How an [`IndexedTableAccess`] obtains its lookup.
#[derive(Debug, Clone)]
pub enum IndexAccess {
    /// A lookup computed once from constants during analysis.
    Static(IndexLookup),
    /// A builder evaluated per primary-side row at execution time.
    Dynamic(LookupBuilder),
}

/// An indexed lookup of a resolved table.
#[derive(Debug, Clone)]
pub struct IndexedTableAccess {
    table: Arc<dyn Table>,
    database: Option<Arc<dyn Database>>,
    indexed: Arc<dyn IndexedTable>,
    access: IndexAccess,
}

impl IndexedTableAccess {
    /// Creates an access node driven by a per-row lookup builder.
    ///
    /// The table (unwrapped from decorators) must be index addressable and
    /// the index must support the builder's zero-key range shape.
    pub fn new_dynamic(
        table: Arc<dyn Table>,
        database: Option<Arc<dyn Database>>,
        mut builder: LookupBuilder,
    ) -> Result<Self> {
        let inner = unwrap_table(Arc::clone(&table));
        let addressable = inner
            .as_index_addressable()
            .ok_or_else(|| Error::NoIndexableTable(inner.name().to_string()))?;
        let zero = builder.get_zero_key();
        let lookup = builder.lookup_for_key(&zero);
        if !lookup.index.can_support(&lookup.ranges) {
            return Err(Error::InvalidLookupForIndexedTable(
                lookup.ranges.debug_string(),
            ));
        }
        let indexed = addressable.indexed_access(&lookup)?;
        Ok(Self {
            table,
            database,
            indexed,
            access: IndexAccess::Dynamic(builder),
        })
    }

    /// Creates an access node with a lookup fixed at analysis time.
    pub fn new_static(
        table: Arc<dyn Table>,
        database: Option<Arc<dyn Database>>,
        lookup: IndexLookup,
    ) -> Result<Self> {
        let inner = unwrap_table(Arc::clone(&table));
        let addressable = inner
            .as_index_addressable()
            .ok_or_else(|| Error::NoIndexableTable(inner.name().to_string()))?;
        if !lookup.index.can_support(&lookup.ranges) {
            return Err(Error::InvalidLookupForIndexedTable(
                lookup.ranges.debug_string(),
            ));
        }
        let indexed = addressable.indexed_access(&lookup)?;
        Ok(Self {
            table,
            database,
            indexed,
            access: IndexAccess::Static(lookup),
        })
    }

    /// The underlying table's name.
    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// The underlying table.
    pub fn table(&self) -> &Arc<dyn Table> {
        &self.table
    }

    /// The owning database, when known.
    pub fn database(&self) -> Option<&Arc<dyn Database>> {
        self.database.as_ref()
    }

    /// The underlying table's schema; indexed access never projects.
    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    /// Whether the lookup was fixed at analysis time.
    pub fn is_static(&self) -> bool {
        matches!(self.access, IndexAccess::Static(_))
    }

    /// The index the access reads.
    pub fn index(&self) -> Arc<dyn Index> {
        match &self.access {
            IndexAccess::Static(lookup) => Arc::clone(&lookup.index),
            IndexAccess::Dynamic(builder) => builder.index(),
        }
    }

    /// Whether the node is resolved; key expressions must all be bound.
    pub fn resolved(&self) -> bool {
        match &self.access {
            IndexAccess::Static(_) => true,
            IndexAccess::Dynamic(builder) => {
                builder.key_exprs.iter().all(Expression::resolved)
            }
        }
    }

    /// Whether a lookup built from the zero key is non-empty. Lets the
    /// analyzer decide at plan time whether dynamic access is worth
    /// materializing; static lookups were already built, so they pass.
    pub fn can_build_index(&self, _ctx: &SessionContext) -> bool {
        match &self.access {
            IndexAccess::Static(_) => true,
            IndexAccess::Dynamic(builder) => {
                let mut probe = builder.clone();
                let zero = probe.get_zero_key();
                let lookup = probe.lookup_for_key(&zero);
                !lookup.is_empty_range
            }
        }
    }

    /// The lookup for a primary-side row: the static lookup when present,
    /// otherwise one built from the row.
    pub fn get_lookup(&mut self, ctx: &SessionContext, row: &Row) -> Result<IndexLookup> {
        match &mut self.access {
            IndexAccess::Static(lookup) => Ok(lookup.clone()),
            IndexAccess::Dynamic(builder) => builder.lookup_for_row(ctx, row),
        }
    }

    /// Iterates matching rows for a primary-side row.
    pub fn lookup_partitions(&mut self, ctx: &SessionContext, row: &Row) -> Result<RowIter> {
        let lookup = self.get_lookup(ctx, row)?;
        self.indexed.lookup_partitions(ctx, &lookup)
    }

    /// Key expressions, exposed so analyzer rules can rewrite them. Static
    /// lookups carry none.
    pub fn expressions(&self) -> Vec<&Expression> {
        match &self.access {
            IndexAccess::Static(_) => vec![],
            IndexAccess::Dynamic(builder) => builder.key_exprs.iter().collect(),
        }
    }

    /// Rebuilds the node with new key expressions.
    pub fn with_expressions(&self, exprs: Vec<Expression>) -> Result<IndexedTableAccess> {
        match &self.access {
            IndexAccess::Static(_) => {
                if !exprs.is_empty() {
                    return Err(Error::InvalidChildrenNumber {
                        node: "IndexedTableAccess".to_string(),
                        got: exprs.len(),
                        expected: 0,
                    });
                }
                Ok(self.clone())
            }
            IndexAccess::Dynamic(builder) => {
                let builder = builder.with_expressions(exprs)?;
                Ok(IndexedTableAccess {
                    table: Arc::clone(&self.table),
                    database: self.database.clone(),
                    indexed: Arc::clone(&self.indexed),
                    access: IndexAccess::Dynamic(builder),
                })
            }
        }
    }

    /// Replaces the underlying table, revalidating index support for the
    /// current lookup shape.
    pub fn with_table(&self, table: Arc<dyn Table>) -> Result<IndexedTableAccess> {
        let inner = unwrap_table(Arc::clone(&table));
        let addressable = inner
            .as_index_addressable()
            .ok_or_else(|| Error::NoIndexableTable(inner.name().to_string()))?;

        let lookup = match &self.access {
            IndexAccess::Static(lookup) => lookup.clone(),
            IndexAccess::Dynamic(builder) => {
                let mut probe = builder.clone();
                let zero = probe.get_zero_key();
                probe.lookup_for_key(&zero)
            }
        };
        if !lookup.index.can_support(&lookup.ranges) {
            return Err(Error::InvalidLookupForIndexedTable(
                lookup.ranges.debug_string(),
            ));
        }
        let indexed = addressable.indexed_access(&lookup)?;
        Ok(IndexedTableAccess {
            table,
            database: self.database.clone(),
            indexed,
            access: self.access.clone(),
        })
    }

    /// The static lookup, when the access carries one.
    pub fn static_lookup(&self) -> Option<&IndexLookup> {
        match &self.access {
            IndexAccess::Static(lookup) => Some(lookup),
            IndexAccess::Dynamic(_) => None,
        }
    }

    /// Rendering pieces used by explain output.
    pub fn describe(&self) -> String {
        let index_cols = self.index().expressions().join(",");
        match &self.access {
            IndexAccess::Static(lookup) => format!(
                "IndexedTableAccess({}) index=[{index_cols}] static={}",
                self.name(),
                lookup.debug_string()
            ),
            IndexAccess::Dynamic(builder) => format!(
                "IndexedTableAccess({}) index=[{index_cols}] keys=[{}]",
                self.name(),
                builder
                    .key_exprs
                    .iter()
                    .map(Expression::debug_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Builds index lookups from primary-side rows.
///
/// For `select * from a join b on a.x = b.x and a.y = b.y` with `b` indexed
/// on `(x, y)`, each row of `a` is evaluated through `key_exprs` into the
/// scratch key, which becomes a single range over the index: closed-equal at
/// plain positions, NULL/not-NULL at `<=>` positions, `All` padding for an
/// unconstrained suffix.
///
/// The scratch key and range are reused across rows, so a builder is owned by
/// exactly one iterator; concurrent iterators must clone their own.
#[derive(Debug, Clone)]
pub struct LookupBuilder {
    index: Arc<dyn Index>,
    key_exprs: Vec<Expression>,
    /// Per position: whether `<=>` semantics apply, i.e. a NULL key value
    /// should match NULL rather than produce an empty range.
    matches_null_mask: Vec<bool>,
    cets: Vec<ColumnExpressionType>,
    null_safe: bool,
    key: Vec<Value>,
    range: Option<Range>,
    empty_range: bool,
    point_lookup: bool,
}

impl LookupBuilder {
    /// Creates a builder for a prefix of the index's key.
    ///
    /// `key_exprs` must not be longer than the index key, and the null mask
    /// must align with `key_exprs`.
    pub fn new(
        index: Arc<dyn Index>,
        key_exprs: Vec<Expression>,
        matches_null_mask: Vec<bool>,
    ) -> Result<Self> {
        let cets = index.column_expression_types();
        if key_exprs.len() > cets.len() {
            return Err(Error::InAnalysis(format!(
                "lookup key of width {} exceeds index arity {}",
                key_exprs.len(),
                cets.len()
            )));
        }
        if matches_null_mask.len() != key_exprs.len() {
            return Err(Error::InAnalysis(format!(
                "null mask width {} does not match key width {}",
                matches_null_mask.len(),
                key_exprs.len()
            )));
        }
        let null_safe = !matches_null_mask.iter().any(|m| *m);
        Ok(Self {
            index,
            key_exprs,
            matches_null_mask,
            cets,
            null_safe,
            key: Vec::new(),
            range: None,
            empty_range: false,
            point_lookup: true,
        })
    }

    /// The index this builder targets.
    pub fn index(&self) -> Arc<dyn Index> {
        Arc::clone(&self.index)
    }

    /// The key expressions, one per covered index prefix position.
    pub fn expressions(&self) -> &[Expression] {
        &self.key_exprs
    }

    /// The all-zero key for this builder's expressions.
    pub fn get_zero_key(&self) -> Vec<Value> {
        self.key_exprs
            .iter()
            .map(|e| Value::zero(&e.data_type()))
            .collect()
    }

    /// Evaluates a primary-side row into a lookup.
    pub fn lookup_for_row(&mut self, ctx: &SessionContext, row: &Row) -> Result<IndexLookup> {
        if self.key.len() != self.key_exprs.len() {
            self.key = vec![Value::Null; self.key_exprs.len()];
        }
        for i in 0..self.key_exprs.len() {
            self.key[i] = self.key_exprs[i].eval(ctx, row)?;
        }
        let key = std::mem::take(&mut self.key);
        let lookup = self.lookup_for_key(&key);
        self.key = key;
        Ok(lookup)
    }

    /// Builds a lookup for an explicit key. The first call allocates the
    /// range; later calls update bounds in place.
    pub fn lookup_for_key(&mut self, key: &[Value]) -> IndexLookup {
        match &mut self.range {
            None => self.initialize_range(key),
            Some(_) => self.update_range(key),
        }
        let range = self.range.as_ref().expect("range initialized above");
        IndexLookup {
            index: Arc::clone(&self.index),
            ranges: RangeCollection(vec![range.clone()]),
            is_point_lookup: self.null_safe && self.point_lookup && self.index.is_unique(),
            is_empty_range: self.empty_range,
            is_spatial_lookup: false,
            is_reverse: false,
        }
    }

    fn initialize_range(&mut self, key: &[Value]) {
        self.empty_range = false;
        self.point_lookup = key.len() == self.cets.len();
        let mut range = Vec::with_capacity(self.cets.len());
        for (i, cet) in self.cets.iter().enumerate() {
            if i >= key.len() {
                range.push(all_range(cet.data_type.clone()));
                self.point_lookup = false;
                continue;
            }
            if key[i].is_null() && !self.matches_null_mask[i] {
                self.empty_range = true;
                self.point_lookup = false;
            }
            if self.matches_null_mask[i] {
                if key[i].is_null() {
                    range.push(null_range(cet.data_type.clone()));
                } else {
                    range.push(not_null_range(cet.data_type.clone()));
                }
            } else {
                range.push(closed_range(
                    key[i].clone(),
                    key[i].clone(),
                    cet.data_type.clone(),
                ));
            }
        }
        self.range = Some(Range(range));
    }

    fn update_range(&mut self, key: &[Value]) {
        self.empty_range = false;
        self.point_lookup = key.len() == self.cets.len();
        let range = self.range.as_mut().expect("update after initialize");
        for (i, value) in key.iter().enumerate() {
            if value.is_null() && !self.matches_null_mask[i] {
                self.empty_range = true;
                self.point_lookup = false;
            }
            if self.matches_null_mask[i] {
                let data_type = self.cets[i].data_type.clone();
                range.0[i] = if value.is_null() {
                    null_range(data_type)
                } else {
                    not_null_range(data_type)
                };
            } else if let RangeColumnExpr::Closed { lower, upper, .. } = &mut range.0[i] {
                *lower = value.clone();
                *upper = value.clone();
            } else {
                range.0[i] = closed_range(
                    value.clone(),
                    value.clone(),
                    self.cets[i].data_type.clone(),
                );
            }
        }
        for i in key.len()..self.cets.len() {
            self.point_lookup = false;
            if !matches!(range.0[i], RangeColumnExpr::All { .. }) {
                range.0[i] = all_range(self.cets[i].data_type.clone());
            }
        }
    }

    /// Rebuilds the builder with new key expressions, preserving the index
    /// binding and null mask. Scratch state is dropped.
    pub fn with_expressions(&self, exprs: Vec<Expression>) -> Result<LookupBuilder> {
        if exprs.len() != self.key_exprs.len() {
            return Err(Error::InvalidChildrenNumber {
                node: "LookupBuilder".to_string(),
                got: exprs.len(),
                expected: self.key_exprs.len(),
            });
        }
        Ok(LookupBuilder {
            index: Arc::clone(&self.index),
            key_exprs: exprs,
            matches_null_mask: self.matches_null_mask.clone(),
            cets: self.cets.clone(),
            null_safe: self.null_safe,
            key: Vec::new(),
            range: None,
            empty_range: false,
            point_lookup: true,
        })
    }

    /// Debug rendering: the index columns and the key expressions feeding
    /// them.
    pub fn debug_string(&self) -> String {
        format!(
            "on [{}], using fields {}",
            self.index.expressions().join(","),
            self.key_exprs
                .iter()
                .map(Expression::debug_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;
    use quarry_common::{Column, Schema};
    use quarry_storage::memory::MemoryTable;
    use quarry_storage::IndexAddressableTable;

    fn indexed_table(unique: bool) -> MemoryTable {
        MemoryTable::new(
            "b",
            Schema::new(vec![
                Column::new("b", "x", DataType::Int64, true),
                Column::new("b", "y", DataType::Int64, true),
            ]),
        )
        .with_rows(vec![
            vec![Value::Int64(1), Value::Int64(2)],
            vec![Value::Int64(3), Value::Int64(4)],
        ])
        .with_index("b_xy", &["x", "y"], unique)
    }

    fn field(index: usize, name: &str) -> Expression {
        Expression::GetField {
            table: "a".to_string(),
            name: name.to_string(),
            index,
            data_type: DataType::Int64,
            nullable: true,
        }
    }

    fn builder(unique: bool, mask: Vec<bool>) -> LookupBuilder {
        let table = indexed_table(unique);
        let index = IndexAddressableTable::indexes(&table).remove(0);
        let width = mask.len();
        let exprs = (0..width).map(|i| field(i, "k")).collect();
        LookupBuilder::new(index, exprs, mask).expect("builder")
    }

    #[test]
    fn full_key_on_unique_index_is_point_lookup() {
        let ctx = SessionContext::new();
        let mut lb = builder(true, vec![false, false]);
        let lookup = lb
            .lookup_for_row(&ctx, &vec![Value::Int64(1), Value::Int64(2)])
            .expect("lookup");
        assert!(lookup.is_point_lookup);
        assert!(!lookup.is_empty_range);
        assert_eq!(lookup.ranges.debug_string(), "{[1, 1], [2, 2]}");
    }

    #[test]
    fn non_unique_index_is_never_point() {
        let ctx = SessionContext::new();
        let mut lb = builder(false, vec![false, false]);
        let lookup = lb
            .lookup_for_row(&ctx, &vec![Value::Int64(1), Value::Int64(2)])
            .expect("lookup");
        assert!(!lookup.is_point_lookup);
    }

    #[test]
    fn short_key_pads_trailing_positions_with_all() {
        let ctx = SessionContext::new();
        let mut lb = builder(true, vec![false]);
        let lookup = lb
            .lookup_for_row(&ctx, &vec![Value::Int64(1)])
            .expect("lookup");
        assert!(!lookup.is_point_lookup);
        assert_eq!(lookup.ranges.debug_string(), "{[1, 1], [-∞, ∞]}");
    }

    #[test]
    fn null_key_without_null_safety_is_empty_range() {
        let ctx = SessionContext::new();
        let mut lb = builder(true, vec![false, false]);
        let lookup = lb
            .lookup_for_row(&ctx, &vec![Value::Null, Value::Int64(2)])
            .expect("lookup");
        assert!(lookup.is_empty_range);
        assert!(!lookup.is_point_lookup);
    }

    #[test]
    fn null_safe_position_builds_null_ranges_and_demotes_point() {
        let ctx = SessionContext::new();
        let mut lb = builder(true, vec![true, false]);
        let lookup = lb
            .lookup_for_row(&ctx, &vec![Value::Null, Value::Int64(2)])
            .expect("lookup");
        assert!(!lookup.is_empty_range);
        // a single <=> makes the whole lookup non-null-safe, hence non-point
        assert!(!lookup.is_point_lookup);
        assert_eq!(lookup.ranges.debug_string(), "{[NULL, NULL], [2, 2]}");

        let lookup = lb
            .lookup_for_row(&ctx, &vec![Value::Int64(9), Value::Int64(2)])
            .expect("lookup");
        assert_eq!(lookup.ranges.debug_string(), "{(NULL, ∞], [2, 2]}");
    }

    #[test]
    fn in_place_update_matches_fresh_build() {
        let ctx = SessionContext::new();
        let mut reused = builder(true, vec![false, false]);
        reused
            .lookup_for_row(&ctx, &vec![Value::Int64(1), Value::Int64(2)])
            .expect("first");
        let updated = reused
            .lookup_for_row(&ctx, &vec![Value::Int64(3), Value::Int64(4)])
            .expect("second");

        let mut fresh = builder(true, vec![false, false]);
        let built = fresh
            .lookup_for_row(&ctx, &vec![Value::Int64(3), Value::Int64(4)])
            .expect("fresh");
        assert_eq!(updated.ranges.debug_string(), built.ranges.debug_string());
        assert_eq!(updated.is_point_lookup, built.is_point_lookup);
    }

    #[test]
    fn builder_rejects_key_wider_than_index() {
        let table = indexed_table(true);
        let index = IndexAddressableTable::indexes(&table).remove(0);
        let err = LookupBuilder::new(
            index,
            vec![field(0, "a"), field(1, "b"), field(2, "c")],
            vec![false, false, false],
        )
        .expect_err("reject");
        assert!(matches!(err, Error::InAnalysis(_)));
    }

    #[test]
    fn dynamic_access_iterates_matching_rows() {
        let ctx = SessionContext::new();
        let table = Arc::new(indexed_table(true));
        let index = IndexAddressableTable::indexes(table.as_ref()).remove(0);
        let lb = LookupBuilder::new(index, vec![field(0, "x")], vec![false]).expect("builder");
        let mut ita =
            IndexedTableAccess::new_dynamic(table, None, lb).expect("indexed access");
        assert!(ita.can_build_index(&ctx));

        let rows: Vec<Row> = ita
            .lookup_partitions(&ctx, &vec![Value::Int64(3)])
            .expect("partitions")
            .collect::<Result<_>>()
            .expect("rows");
        assert_eq!(rows, vec![vec![Value::Int64(3), Value::Int64(4)]]);
    }

    #[test]
    fn unsupported_range_shape_is_rejected() {
        let table = Arc::new(indexed_table(true));
        let index = IndexAddressableTable::indexes(table.as_ref()).remove(0);
        // a skip shape: position 0 unconstrained, position 1 pinned
        let lookup = IndexLookup {
            index,
            ranges: RangeCollection(vec![Range(vec![
                all_range(DataType::Int64),
                closed_range(Value::Int64(1), Value::Int64(1), DataType::Int64),
            ])]),
            is_point_lookup: false,
            is_empty_range: false,
            is_spatial_lookup: false,
            is_reverse: false,
        };
        let err = IndexedTableAccess::new_static(table, None, lookup).expect_err("reject");
        assert!(matches!(err, Error::InvalidLookupForIndexedTable(_)));
    }

    #[test]
    fn with_expressions_checks_arity() {
        let lb = builder(true, vec![false, false]);
        let err = lb.with_expressions(vec![field(0, "x")]).expect_err("reject");
        assert!(matches!(err, Error::InvalidChildrenNumber { .. }));
    }
}
