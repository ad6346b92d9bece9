use std::collections::BTreeMap;

use crate::error::RelayResult;
use crate::store::base::{KeyStatistics, StoreInspector, TableInfo};

/// In-memory store inspector serving canned schema metadata and probes.
///
/// Used in tests and as the reference implementation of the inspection
/// contract; real deployments wrap a database connection instead.
#[derive(Debug, Default)]
pub struct MemoryInspector {
    tables: BTreeMap<String, Vec<TableInfo>>,
    statistics: BTreeMap<(String, String), KeyStatistics>,
    system_schemas: Vec<String>,
}

impl MemoryInspector {
    pub fn new() -> Self {
        Self {
            system_schemas: vec!["information_schema".to_string(), "sys".to_string()],
            ..Default::default()
        }
    }

    /// Adds a table, optionally with key statistics for its probe.
    pub fn with_table(mut self, table: TableInfo, statistics: Option<KeyStatistics>) -> Self {
        if let Some(statistics) = statistics {
            self.statistics
                .insert((table.schema.clone(), table.name.clone()), statistics);
        }
        self.tables
            .entry(table.schema.clone())
            .or_default()
            .push(table);

        self
    }

    /// Marks an additional schema as system-owned.
    pub fn with_system_schema(mut self, schema: impl Into<String>) -> Self {
        self.system_schemas.push(schema.into());
        self
    }
}

impl StoreInspector for MemoryInspector {
    async fn schemas(&self) -> RelayResult<Vec<String>> {
        let mut schemas: Vec<String> = self.tables.keys().cloned().collect();
        schemas.extend(self.system_schemas.iter().cloned());
        schemas.sort();
        schemas.dedup();

        Ok(schemas)
    }

    fn is_system_schema(&self, schema: &str) -> bool {
        self.system_schemas.iter().any(|system| system == schema)
    }

    async fn tables(&self, schema: &str) -> RelayResult<Vec<TableInfo>> {
        Ok(self.tables.get(schema).cloned().unwrap_or_default())
    }

    async fn find_table(&self, schema: &str, table: &str) -> RelayResult<Option<TableInfo>> {
        Ok(self
            .tables
            .get(schema)
            .and_then(|tables| tables.iter().find(|info| info.name == table))
            .cloned())
    }

    async fn key_statistics(
        &self,
        table: &TableInfo,
        _column: &str,
    ) -> RelayResult<Option<KeyStatistics>> {
        Ok(self
            .statistics
            .get(&(table.schema.clone(), table.name.clone()))
            .cloned())
    }
}
