use std::fmt;
use std::future::Future;

use bigdecimal::BigDecimal;

use crate::error::RelayResult;

/// Data type of a primary-key column, as far as chunking is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Integer-family column (smallint, int, bigint).
    Integer,
    /// Fixed-scale decimal column.
    Decimal,
    /// Anything else; the table cannot be range-chunked.
    Unsupported,
}

/// Primary key metadata for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    /// Key columns in order.
    pub columns: Vec<String>,
    /// Data type of the first key column.
    pub kind: KeyKind,
}

impl PrimaryKey {
    /// Returns `true` when the key is a single numeric column usable for
    /// range chunking.
    pub fn is_chunkable(&self) -> bool {
        self.columns.len() == 1 && self.kind != KeyKind::Unsupported
    }
}

/// Table metadata returned by schema enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Schema the table belongs to.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Primary key, when the table has one.
    pub primary_key: Option<PrimaryKey>,
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A primary-key value observed by a min/max probe.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Integer(i64),
    Decimal(BigDecimal),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Integer(value) => write!(f, "{value}"),
            KeyValue::Decimal(value) => write!(f, "{value}"),
        }
    }
}

/// Result of a `(MIN, MAX, COUNT)` probe on a primary-key column.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyStatistics {
    pub min: KeyValue,
    pub max: KeyValue,
    pub count: u64,
}

/// Narrow read-only interface over a source database.
///
/// The chunk planner is the only consumer. Implementations wrap a real
/// connection; [`crate::store::MemoryInspector`] provides a canned one.
pub trait StoreInspector: Send + Sync {
    /// Lists all schemas, including system schemas.
    fn schemas(&self) -> impl Future<Output = RelayResult<Vec<String>>> + Send;

    /// Returns `true` for schemas owned by the database engine itself.
    fn is_system_schema(&self, schema: &str) -> bool;

    /// Lists the tables of a schema with their key metadata.
    fn tables(&self, schema: &str) -> impl Future<Output = RelayResult<Vec<TableInfo>>> + Send;

    /// Looks up a single table by name.
    fn find_table(
        &self,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = RelayResult<Option<TableInfo>>> + Send;

    /// Probes `(MIN, MAX, COUNT)` on the given key column.
    ///
    /// Returns `None` for an empty table.
    fn key_statistics(
        &self,
        table: &TableInfo,
        column: &str,
    ) -> impl Future<Output = RelayResult<Option<KeyStatistics>>> + Send;
}
