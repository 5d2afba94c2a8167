//! Writer: persists a result table to the store.

use crate::model::{PipelineError, Table};
use crate::store::Store;

/// Replaces `table_name` with exactly the rows of `table`.
///
/// Drop-and-recreate, never append or upsert, and no synthetic index
/// column. Running it twice with the same input leaves the same table.
pub fn save<S: Store + ?Sized>(
    table: &Table,
    store: &mut S,
    table_name: &str,
) -> Result<(), PipelineError> {
    if table_name.trim().is_empty() {
        return Err(PipelineError::Write("destination table name is empty".to_string()));
    }
    store.replace_table(table_name.trim(), table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Value};
    use crate::store::MemoryStore;

    fn monthly() -> Table {
        Table::from_columns(vec![
            Column::from_values("year", [2024]),
            Column::from_values("month", [1]),
            Column::from_values("avg_temp_max", [12.5]),
            Column::from_values("avg_temp_min", [6.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_save_writes_under_given_name_without_index() {
        let mut store = MemoryStore::new();
        save(&monthly(), &mut store, "MonthlyAvgTemperature").expect("save should succeed");

        let stored = store.table("MonthlyAvgTemperature").expect("table created");
        assert_eq!(
            stored.column_names(),
            vec!["year", "month", "avg_temp_max", "avg_temp_min"]
        );
    }

    #[test]
    fn test_save_replaces_unrelated_rows() {
        let old = Table::from_columns(vec![Column::from_values("note", ["stale", "rows"])]).unwrap();
        let mut store = MemoryStore::new().with_table("MonthlyAvgTemperature", old);

        save(&monthly(), &mut store, "MonthlyAvgTemperature").unwrap();
        let stored = store.table("MonthlyAvgTemperature").unwrap();
        assert_eq!(stored, &monthly());
        assert!(!stored.has_column("note"));
    }

    #[test]
    fn test_save_twice_is_idempotent_in_outcome() {
        let mut store = MemoryStore::new();
        save(&monthly(), &mut store, "Out").unwrap();
        save(&monthly(), &mut store, "Out").unwrap();
        assert_eq!(store.table("Out").unwrap().num_rows(), 1);
        assert_eq!(store.table("Out").unwrap().row(0).unwrap()[2], &Value::Float(12.5));
    }

    #[test]
    fn test_save_rejects_blank_table_name() {
        let mut store = MemoryStore::new();
        assert!(matches!(save(&monthly(), &mut store, " "), Err(PipelineError::Write(_))));
    }
}
