//! In-process store.
//!
//! Holds named tables in memory and understands just enough SQL to read
//! them back (`SELECT * FROM t`, `SELECT a, b FROM t`). It can be switched
//! offline or read-only to exercise the pipeline's failure paths.

use std::collections::BTreeMap;

use crate::model::{PipelineError, Table};
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
    offline: bool,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert_table`.
    pub fn with_table(mut self, name: &str, table: Table) -> Self {
        self.insert_table(name, table);
        self
    }

    pub fn insert_table(&mut self, name: &str, table: Table) {
        self.tables.insert(name.to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Every call fails as if the server had gone away.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Writes are rejected; reads still work.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

impl Store for MemoryStore {
    fn query(&mut self, sql: &str) -> Result<Table, PipelineError> {
        if self.offline {
            return Err(PipelineError::Connection("store is unreachable".to_string()));
        }

        let select = parse_select(sql)?;
        let table = self.tables.get(select.table).ok_or_else(|| {
            PipelineError::Query(format!("relation \"{}\" does not exist", select.table))
        })?;

        match select.columns {
            None => Ok(table.clone()),
            Some(columns) => table.select(&columns).map_err(|missing| {
                PipelineError::Query(format!("column \"{}\" does not exist", missing))
            }),
        }
    }

    fn replace_table(&mut self, name: &str, table: &Table) -> Result<(), PipelineError> {
        if self.offline {
            return Err(PipelineError::Write("store is unreachable".to_string()));
        }
        if self.read_only {
            return Err(PipelineError::Write(format!(
                "permission denied to create table \"{}\"",
                name
            )));
        }
        if name.trim().is_empty() {
            return Err(PipelineError::Write("table name is empty".to_string()));
        }
        self.tables.insert(name.to_string(), table.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Query parsing
// ---------------------------------------------------------------------------

struct Select<'a> {
    /// `None` for `*`.
    columns: Option<Vec<&'a str>>,
    table: &'a str,
}

fn parse_select(sql: &str) -> Result<Select<'_>, PipelineError> {
    let syntax = || PipelineError::Query(format!("syntax error in query: {}", sql.trim()));

    let body = sql.trim().trim_end_matches(';').trim();
    let (keyword, rest) = body.split_once(char::is_whitespace).ok_or_else(syntax)?;
    if !keyword.eq_ignore_ascii_case("select") {
        return Err(syntax());
    }

    let from_at = find_keyword(rest, "from").ok_or_else(syntax)?;
    let projection = rest[..from_at].trim();
    let table = rest[from_at + 4..].trim();

    if projection.is_empty() || table.is_empty() || table.contains(char::is_whitespace) {
        return Err(syntax());
    }

    let columns = if projection == "*" {
        None
    } else {
        let names: Vec<&str> = projection.split(',').map(str::trim).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(syntax());
        }
        Some(names)
    };

    Ok(Select { columns, table })
}

/// Byte offset of `keyword` as a whole, case-insensitive word.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut start = 0;
    while let Some(pos) = lower[start..].find(keyword) {
        let at = start + pos;
        let end = at + keyword.len();
        let before_ok = at == 0 || bytes[at - 1].is_ascii_whitespace();
        let after_ok = end == bytes.len() || bytes[end].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some(at);
        }
        start = at + 1;
    }
    None
}
