//! Name-resolution scopes used during plan construction.
//!
//! A scope is one frame of the resolution stack: pushed when the builder
//! enters a subquery, derived table, or join branch, and discarded when the
//! enclosing node is built. Parent frames are shared immutable snapshots;
//! lookups fall through outward. The scope forest never contains cycles: a
//! child only ever points at an already-frozen parent.

use std::collections::HashMap;
use std::rc::Rc;

use arrow_schema::DataType;
use quarry_common::{Error, Result};

use crate::expr::Expression;
use crate::plan::LogicalPlan;

/// One visible column in a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeColumn {
    /// Database the column's table belongs to.
    pub database: String,
    /// Table or alias the column belongs to, lower-cased.
    pub table: String,
    /// Column name, lower-cased.
    pub column: String,
    /// Column type.
    pub data_type: DataType,
    /// Column nullability.
    pub nullable: bool,
    /// Position within the frame's visible columns, used for field indexes.
    pub id: usize,
}

impl ScopeColumn {
    /// The resolved field expression for this column, indexed into the
    /// frame's row layout.
    pub fn scalar_gf(&self) -> Expression {
        Expression::GetField {
            table: self.table.clone(),
            name: self.column.clone(),
            index: self.id,
            data_type: self.data_type.clone(),
            nullable: self.nullable,
        }
    }
}

/// A name-resolution frame.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    /// The plan node currently materialized for this frame.
    pub node: Option<LogicalPlan>,
    cols: Vec<ScopeColumn>,
    /// (table, column) pairs rewritten to another column; used by NATURAL
    /// JOIN to point right-side names at the left-side definition.
    redirects: HashMap<(String, String), ScopeColumn>,
    ctes: HashMap<String, Rc<Scope>>,
}

impl Scope {
    /// An empty root scope.
    pub fn new() -> Scope {
        Scope::default()
    }

    /// Pushes a child frame. The current frame is frozen and shared as the
    /// child's parent; lookups in the child fall through to it.
    pub fn push(&self) -> Scope {
        Scope {
            parent: Some(Rc::new(self.clone())),
            node: None,
            cols: Vec::new(),
            redirects: HashMap::new(),
            ctes: HashMap::new(),
        }
    }

    /// The materialized plan node, which every built frame must carry.
    pub fn take_node(&mut self) -> Result<LogicalPlan> {
        self.node
            .take()
            .ok_or_else(|| Error::InAnalysis("scope has no plan node".to_string()))
    }

    /// The frame's own visible columns, in order.
    pub fn columns(&self) -> &[ScopeColumn] {
        &self.cols
    }

    /// Adds a column to the frame without assigning a new identity; the
    /// column keeps the id it was created with.
    pub fn add_column(&mut self, col: ScopeColumn) {
        self.cols.push(col);
    }

    /// Adds a column and assigns it the next field position in this frame.
    pub fn new_column(
        &mut self,
        database: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> &ScopeColumn {
        let id = self.cols.len();
        self.cols.push(ScopeColumn {
            database: database.into(),
            table: table.into().to_lowercase(),
            column: column.into().to_lowercase(),
            data_type,
            nullable,
            id,
        });
        self.cols.last().expect("pushed above")
    }

    /// Appends another scope's columns after this frame's, renumbering their
    /// field positions. Used after a join to concatenate left then right.
    pub fn append_columns_from_scope(&mut self, other: &Scope) {
        for col in &other.cols {
            let id = self.cols.len();
            self.cols.push(ScopeColumn {
                id,
                ..col.clone()
            });
        }
    }

    /// Registers a CTE under a name in this frame.
    pub fn set_cte(&mut self, name: &str, scope: Scope) {
        self.ctes.insert(name.to_lowercase(), Rc::new(scope));
    }

    /// Looks up a CTE by walking outward, returning a copy of the bound
    /// scope reparented onto this frame. The original binding is preserved.
    pub fn get_cte(&self, name: &str) -> Option<Scope> {
        let key = name.to_lowercase();
        let mut frame = Some(self);
        while let Some(s) = frame {
            if let Some(bound) = s.ctes.get(&key) {
                let mut copy = bound.as_ref().clone();
                copy.parent = Some(Rc::new(self.clone()));
                return Some(copy);
            }
            frame = s.parent.as_deref();
        }
        None
    }

    /// Records that references to `from` resolve as `to`.
    pub fn redirect(&mut self, from: &ScopeColumn, to: ScopeColumn) {
        self.redirects
            .insert((from.table.clone(), from.column.clone()), to);
    }

    /// Stamps every column in this frame with the given table alias.
    pub fn set_table_alias(&mut self, alias: &str) {
        let alias = alias.to_lowercase();
        for col in &mut self.cols {
            col.table = alias.clone();
        }
    }

    /// Whether a table name is visible in this frame.
    pub fn has_table(&self, table: &str) -> bool {
        let t = table.to_lowercase();
        self.cols.iter().any(|c| c.table == t)
    }

    /// The table names visible in this frame, in first-appearance order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for c in &self.cols {
            if !names.contains(&c.table) {
                names.push(c.table.clone());
            }
        }
        names
    }

    /// Resolves a column reference.
    ///
    /// Unqualified names search the innermost frame first, then walk outward;
    /// a name matching more than one table in the same frame is
    /// [`Error::AmbiguousColumnName`]. Qualified names only consider frames
    /// where the table is visible. `Ok(None)` means the name is simply not in
    /// scope, which later resolution passes may still handle.
    pub fn resolve_column(
        &self,
        table: Option<&str>,
        column: &str,
    ) -> Result<Option<ScopeColumn>> {
        let table = table.map(str::to_lowercase);
        let column = column.to_lowercase();

        let mut frame = Some(self);
        while let Some(s) = frame {
            if let Some(col) = s.resolve_in_frame(table.as_deref(), &column)? {
                return Ok(Some(col));
            }
            frame = s.parent.as_deref();
        }
        Ok(None)
    }

    fn resolve_in_frame(&self, table: Option<&str>, column: &str) -> Result<Option<ScopeColumn>> {
        if let Some(t) = table {
            if let Some(target) = self.redirects.get(&(t.to_string(), column.to_string())) {
                return Ok(Some(target.clone()));
            }
        }

        let matches: Vec<&ScopeColumn> = self
            .cols
            .iter()
            .filter(|c| c.column == column && table.map_or(true, |t| c.table == t))
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            _ => {
                // the same (table, column) appearing twice is a self-join
                // artifact, not an ambiguity
                let first = matches[0];
                if matches.iter().all(|c| c.table == first.table) {
                    Ok(Some(first.clone()))
                } else {
                    Err(Error::AmbiguousColumnName(column.to_string()))
                }
            }
        }
    }
}
