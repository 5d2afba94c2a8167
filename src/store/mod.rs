//! Relational store access.
//!
//! The pipeline only ever needs two things from a store: run a read
//! query and materialize the result, and replace a named table with new
//! contents. `Store` is that seam. The live implementation is a
//! PostgreSQL `Session` opened from an `Engine`; `MemoryStore` keeps
//! tables in process.

pub mod connector;
pub mod memory;
pub mod pg;

pub use connector::{ConnectionSettings, Dialect, Engine, new_engine};
pub use memory::MemoryStore;
pub use pg::Session;

use crate::model::{PipelineError, Table};

pub trait Store {
    /// Executes `sql` verbatim and returns the complete result set.
    fn query(&mut self, sql: &str) -> Result<Table, PipelineError>;

    /// Drops `name` if it exists and recreates it holding exactly `table`.
    /// Either the whole replacement lands or the previous table is left
    /// untouched.
    fn replace_table(&mut self, name: &str, table: &Table) -> Result<(), PipelineError>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn query(&mut self, sql: &str) -> Result<Table, PipelineError> {
        (**self).query(sql)
    }

    fn replace_table(&mut self, name: &str, table: &Table) -> Result<(), PipelineError> {
        (**self).replace_table(name, table)
    }
}
