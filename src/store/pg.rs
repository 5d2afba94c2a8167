//! PostgreSQL-backed store.
//!
//! Reads go through the simple-query protocol: the query text is sent
//! verbatim and every cell comes back as text or NULL, leaving all type
//! decisions to the cleaner. Writes replace the destination table inside
//! a single transaction.

use std::collections::HashSet;

use postgres::types::ToSql;
use postgres::{Client, SimpleQueryMessage};

use crate::model::{Column, ColumnKind, PipelineError, Table, Value};
use crate::store::Store;

/// A live connection. Dropping it closes the connection.
pub struct Session {
    client: Client,
}

impl Session {
    pub(crate) fn new(client: Client) -> Self {
        Session { client }
    }

    /// Closes the connection, reporting any error from the shutdown
    /// handshake.
    pub fn close(self) -> Result<(), PipelineError> {
        self.client
            .close()
            .map_err(|e| PipelineError::Connection(e.to_string()))
    }

    /// Escape hatch for callers that need the raw client (tests, setup).
    pub fn client(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl Store for Session {
    fn query(&mut self, sql: &str) -> Result<Table, PipelineError> {
        let messages = self.client.simple_query(sql).map_err(read_error)?;

        let mut names: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<Value>> = Vec::new();
        let mut described = false;

        for message in messages {
            match message {
                // Each statement's result set starts with a description;
                // the last one wins.
                SimpleQueryMessage::RowDescription(description) => {
                    names = description.iter().map(|c| c.name().to_string()).collect();
                    columns = vec![Vec::new(); names.len()];
                    described = true;
                }
                SimpleQueryMessage::Row(row) => {
                    if !described {
                        names = row.columns().iter().map(|c| c.name().to_string()).collect();
                        columns = vec![Vec::new(); names.len()];
                        described = true;
                    }
                    for (i, column) in columns.iter_mut().enumerate() {
                        let cell = row.try_get(i).map_err(read_error)?;
                        column.push(Value::from(cell));
                    }
                }
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(PipelineError::Query(format!(
                "result has more than one column named '{}'",
                duplicate
            )));
        }

        Table::from_columns(
            names
                .into_iter()
                .zip(columns)
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
    }

    fn replace_table(&mut self, name: &str, table: &Table) -> Result<(), PipelineError> {
        let ident = quote_ident(name)?;
        let kinds: Vec<ColumnKind> = table.columns().iter().map(Column::kind).collect();

        let column_defs = table
            .columns()
            .iter()
            .zip(&kinds)
            .map(|(column, kind)| -> Result<String, PipelineError> {
                Ok(format!("{} {}", quote_ident(&column.name)?, sql_type(*kind)))
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut tx = self.client.transaction().map_err(write_error)?;
        tx.batch_execute(&format!("DROP TABLE IF EXISTS {}", ident))
            .map_err(write_error)?;
        tx.batch_execute(&format!("CREATE TABLE {} ({})", ident, column_defs))
            .map_err(write_error)?;

        if table.num_columns() > 0 && table.num_rows() > 0 {
            let column_list = table
                .columns()
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            let placeholders = (1..=table.num_columns())
                .map(|i| format!("${}", i))
                .collect::<Vec<_>>()
                .join(", ");
            let insert = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                ident, column_list, placeholders
            );
            let statement = tx.prepare(&insert).map_err(write_error)?;

            for row in 0..table.num_rows() {
                let params: Vec<Box<dyn ToSql + Sync>> = table
                    .columns()
                    .iter()
                    .zip(&kinds)
                    .map(|(column, kind)| bind(*kind, &column.values[row]))
                    .collect();
                let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
                tx.execute(&statement, &refs).map_err(write_error)?;
            }
        }

        tx.commit().map_err(write_error)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Server-side rejections are query errors; anything else means the
/// connection itself failed.
fn read_error(e: postgres::Error) -> PipelineError {
    if e.as_db_error().is_some() {
        PipelineError::Query(e.to_string())
    } else {
        PipelineError::Connection(e.to_string())
    }
}

fn write_error(e: postgres::Error) -> PipelineError {
    PipelineError::Write(e.to_string())
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "BIGINT",
        ColumnKind::Float => "DOUBLE PRECISION",
        ColumnKind::Date => "DATE",
        ColumnKind::Text => "TEXT",
    }
}

fn bind(kind: ColumnKind, value: &Value) -> Box<dyn ToSql + Sync> {
    match kind {
        ColumnKind::Integer => Box::new(value.as_i64()),
        ColumnKind::Float => Box::new(value.as_f64()),
        ColumnKind::Date => Box::new(value.as_date()),
        ColumnKind::Text => Box::new(if value.is_null() {
            None
        } else {
            Some(value.to_string())
        }),
    }
}

/// Double-quotes each dot-separated part of a (possibly schema
/// qualified) identifier.
pub(crate) fn quote_ident(name: &str) -> Result<String, PipelineError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(PipelineError::Write(format!("invalid identifier '{}'", name)));
    }
    Ok(parts
        .iter()
        .map(|p| format!("\"{}\"", p.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join("."))
}
