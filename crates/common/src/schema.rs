use std::fmt;

use arrow_schema::DataType;

/// A named, typed column with its source table.
///
/// `source` is the (possibly aliased) table the column comes from, lower-cased
/// by the layers that construct schemas. Nullability is tracked here rather
/// than inside the type.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Table (or alias) the column belongs to.
    pub source: String,
    /// Column name.
    pub name: String,
    /// Declared column type.
    pub data_type: DataType,
    /// Whether the column admits NULL.
    pub nullable: bool,
}

impl Column {
    /// Creates a column.
    pub fn new(
        source: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Returns a copy of this column re-sourced to another table name.
    pub fn with_source(&self, source: impl Into<String>) -> Column {
        Column {
            source: source.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.source, self.name)
        }
    }
}

/// An ordered sequence of columns describing a relation's output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema(Vec<Column>);

impl Schema {
    /// Creates a schema from columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Schema(columns)
    }

    /// An empty schema.
    pub fn empty() -> Self {
        Schema(Vec::new())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The columns, in order.
    pub fn columns(&self) -> &[Column] {
        &self.0
    }

    /// Column at a position.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.0.get(index)
    }

    /// Position of the first column matching the name, and optionally the
    /// source, case-insensitively.
    pub fn index_of(&self, source: Option<&str>, name: &str) -> Option<usize> {
        self.0.iter().position(|c| {
            c.name.eq_ignore_ascii_case(name)
                && source.map_or(true, |s| c.source.eq_ignore_ascii_case(s))
        })
    }

    /// A new schema holding this schema's columns followed by `other`'s.
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut cols = self.0.clone();
        cols.extend(other.0.iter().cloned());
        Schema(cols)
    }

    /// A new schema with every column re-sourced to the given table name.
    pub fn with_source(&self, source: &str) -> Schema {
        Schema(self.0.iter().map(|c| c.with_source(source)).collect())
    }

    /// Iterator over columns.
    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.0.iter()
    }
}

impl FromIterator<Column> for Schema {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        Schema(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
