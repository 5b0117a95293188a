use thiserror::Error;

/// Canonical Quarry error taxonomy used across crates.
///
/// Classification guidance:
/// - name-resolution failures (`TableNotFound`, `ColumnNotFound`,
///   `AmbiguousColumnName`, ...) abort the current statement immediately
/// - type/value failures (`IncompatibleDefaultType`, `ValueOutOfRange`) are
///   fatal for the current statement only
/// - `ContextCancelled` is surfaced upward verbatim
/// - `InvalidChildrenNumber` and `InAnalysis` are internal invariant
///   violations and should be treated as programmer errors
#[derive(Debug, Error)]
pub enum Error {
    /// A column default value expression produced NULL for a column whose
    /// default is not allowed to be NULL.
    #[error("default value expression returned null for a non-null default")]
    ColumnDefaultReturnedNull,

    /// A column default value could not be converted to the column's type.
    #[error("incompatible type for default value")]
    IncompatibleDefaultType,

    /// A value conversion succeeded structurally but fell outside the range
    /// of the target type.
    #[error("value {value} out of range for type {data_type}")]
    ValueOutOfRange {
        /// Display form of the offending value.
        value: String,
        /// Display form of the target type.
        data_type: String,
    },

    /// A node or expression was rebuilt with the wrong number of children.
    #[error("invalid number of children for {node}: got {got}, expected {expected}")]
    InvalidChildrenNumber {
        /// Display form of the node being rebuilt.
        node: String,
        /// Number of children supplied.
        got: usize,
        /// Number of children required.
        expected: usize,
    },

    /// The same table name or alias appears on both sides of a join.
    #[error("duplicate table name or alias: {0}")]
    DuplicateAliasOrTable(String),

    /// Named table does not exist in the selected database.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Named database does not exist.
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// A table was referenced without a database qualifier and no database
    /// is selected on the session.
    #[error("no database selected")]
    NoDatabaseSelected,

    /// Named scalar function does not exist.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// Named table function does not exist.
    #[error("table function not found: {0}")]
    TableFunctionNotFound(String),

    /// Named column is not visible in any scope.
    #[error("column {0} could not be found in any table in scope")]
    ColumnNotFound(String),

    /// An unqualified column name matches columns in more than one table.
    #[error("ambiguous column name {0}")]
    AmbiguousColumnName(String),

    /// Syntax the engine recognizes but does not accept.
    #[error("unsupported syntax: {0}")]
    UnsupportedSyntax(String),

    /// A valid construct the engine intentionally does not implement.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An argument with an invalid value for the operation.
    #[error("invalid argument to {0}")]
    InvalidArgument(String),

    /// `ORDER BY <k>` where k is not a valid 1-based projection position.
    #[error("ORDER BY position {0} is not in the select list")]
    OrderByColumnIndex(i64),

    /// Both a union branch and the outer query specify ORDER BY, LIMIT, or
    /// OFFSET.
    #[error("an external {0} conflicts with one inside the union")]
    ConflictingExternalQuery(&'static str),

    /// The index behind an indexed table access cannot serve the ranges the
    /// lookup produced.
    #[error("index does not support the lookup: {0}")]
    InvalidLookupForIndexedTable(String),

    /// An indexed table access was expected and none could be constructed.
    #[error("expected an index-addressable table, couldn't find one in {0}")]
    NoIndexableTable(String),

    /// An analyzer rule violated its own contract.
    #[error("analysis error: {0}")]
    InAnalysis(String),

    /// The session context was cancelled.
    #[error("context cancelled")]
    ContextCancelled,

    /// Parse or planning failure without a more specific code.
    #[error("planning error: {0}")]
    Planning(String),
}

/// Standard Quarry result alias.
pub type Result<T> = std::result::Result<T, Error>;
