use std::fmt;

use crate::store::KeyValue;

/// A `schema.table` reference carried by a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One unit of bulk-extraction work: a numeric key range of a table.
///
/// Absent bounds mean the whole table. A chunk without a table is the
/// end-of-stream marker that tells an extract worker to exit. Ranged chunks
/// are open on `start_key` and closed on `end_key`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericChunk {
    /// Table the chunk belongs to; `None` marks end of stream.
    pub table: Option<TableRef>,
    /// Exclusive lower bound of the key range.
    pub start_key: Option<KeyValue>,
    /// Inclusive upper bound of the key range.
    pub end_key: Option<KeyValue>,
    /// Column projection for the extraction query, when restricted.
    pub columns: Option<Vec<String>>,
    /// Total number of ranged chunks planned for this table.
    pub total_blocks: u64,
}

impl NumericChunk {
    /// The end-of-stream marker consumed once by each extract worker.
    pub fn end_of_stream() -> Self {
        Self::default()
    }

    /// A chunk covering the whole table.
    pub fn whole_table(table: TableRef, columns: Option<Vec<String>>) -> Self {
        Self {
            table: Some(table),
            columns,
            ..Self::default()
        }
    }

    /// A ranged chunk covering `(start_key, end_key]`.
    pub fn ranged(
        table: TableRef,
        start_key: KeyValue,
        end_key: KeyValue,
        columns: Option<Vec<String>>,
        total_blocks: u64,
    ) -> Self {
        Self {
            table: Some(table),
            start_key: Some(start_key),
            end_key: Some(end_key),
            columns,
            total_blocks,
        }
    }

    /// Returns `true` for the end-of-stream marker.
    pub fn is_end_of_stream(&self) -> bool {
        self.table.is_none()
    }

    /// Returns `true` when the chunk covers its whole table.
    pub fn is_whole_table(&self) -> bool {
        self.table.is_some() && self.start_key.is_none() && self.end_key.is_none()
    }
}
