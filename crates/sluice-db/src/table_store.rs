//! In-memory append-only table store.
//!
//! Named tables hold a schema and the batches appended to them, nothing
//! more. Source tables receive user inserts; destination tables receive
//! flushed window results; both are just tables here. A real columnar
//! storage engine can replace this behind the same surface.

use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use fxhash::FxHashMap;

use crate::error::DbError;

/// One stored table: its schema and appended batches.
#[derive(Debug)]
struct StoredTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    row_count: usize,
}

/// Named in-memory tables with append/scan access.
///
/// Not internally synchronized; `SluiceDb` shares it behind a
/// `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: FxHashMap<String, StoredTable>,
}

impl TableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableAlreadyExists`] on a name collision.
    pub fn create_table(&mut self, name: &str, schema: SchemaRef) -> Result<(), DbError> {
        if self.tables.contains_key(name) {
            return Err(DbError::TableAlreadyExists(name.to_string()));
        }
        self.tables.insert(
            name.to_string(),
            StoredTable {
                schema,
                batches: Vec::new(),
                row_count: 0,
            },
        );
        Ok(())
    }

    /// Drops a table and its data.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableNotFound`] if the table does not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<(), DbError> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Returns true if the table exists.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns the table's schema, if it exists.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<SchemaRef> {
        self.tables.get(name).map(|t| Arc::clone(&t.schema))
    }

    /// Appends a batch, checking field names and types against the table
    /// schema.
    ///
    /// Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableNotFound`] or [`DbError::SchemaMismatch`].
    pub fn append(&mut self, name: &str, batch: RecordBatch) -> Result<usize, DbError> {
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

        if !schemas_compatible(&table.schema, &batch.schema()) {
            return Err(DbError::SchemaMismatch(format!(
                "batch schema does not match table '{name}': expected {:?}, got {:?}",
                table.schema.fields(),
                batch.schema().fields()
            )));
        }

        let rows = batch.num_rows();
        table.batches.push(batch);
        table.row_count += rows;
        Ok(rows)
    }

    /// Returns all batches of a table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableNotFound`] if the table does not exist.
    pub fn scan(&self, name: &str) -> Result<Vec<RecordBatch>, DbError> {
        self.tables
            .get(name)
            .map(|t| t.batches.clone())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Total rows in a table, or `None` if it does not exist.
    #[must_use]
    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.tables.get(name).map(|t| t.row_count)
    }

    /// Names of all tables, unsorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

/// Field-level compatibility: same arity, names, and types. Nullability
/// and metadata are intentionally not compared.
pub(crate) fn schemas_compatible(expected: &SchemaRef, actual: &SchemaRef) -> bool {
    expected.fields().len() == actual.fields().len()
        && expected
            .fields()
            .iter()
            .zip(actual.fields().iter())
            .all(|(e, a)| e.name() == a.name() && e.data_type() == a.data_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
    }

    fn batch(values: Vec<i64>) -> RecordBatch {
        RecordBatch::try_new(schema(), vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_create_append_scan() {
        let mut store = TableStore::new();
        store.create_table("t", schema()).unwrap();
        assert_eq!(store.append("t", batch(vec![1, 2])).unwrap(), 2);
        assert_eq!(store.append("t", batch(vec![3])).unwrap(), 1);
        assert_eq!(store.row_count("t"), Some(3));
        assert_eq!(store.scan("t").unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let mut store = TableStore::new();
        store.create_table("t", schema()).unwrap();
        assert!(matches!(
            store.create_table("t", schema()),
            Err(DbError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn test_append_schema_mismatch() {
        let mut store = TableStore::new();
        store.create_table("t", schema()).unwrap();

        let other = Arc::new(Schema::new(vec![Field::new("w", DataType::Int64, false)]));
        let bad = RecordBatch::try_new(other, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        assert!(matches!(
            store.append("t", bad),
            Err(DbError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_drop_table() {
        let mut store = TableStore::new();
        store.create_table("t", schema()).unwrap();
        store.drop_table("t").unwrap();
        assert!(!store.has_table("t"));
        assert!(matches!(store.scan("t"), Err(DbError::TableNotFound(_))));
    }

    #[test]
    fn test_nullability_difference_is_compatible() {
        let mut store = TableStore::new();
        store.create_table("t", schema()).unwrap();

        let nullable = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));
        let b = RecordBatch::try_new(nullable, vec![Arc::new(Int64Array::from(vec![7]))]).unwrap();
        assert_eq!(store.append("t", b).unwrap(), 1);
    }
}
