use std::path::Path;

use crate::bail;
use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;

/// One line of a chunk-definitions document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Schema to plan.
    pub schema: String,
    /// Specific table, or `None` for every table in the schema.
    pub table: Option<String>,
    /// Chunk size override: negative uses the default, zero forces a single
    /// whole-table chunk, positive overrides the size.
    pub chunk_size: i64,
    /// Optional column projection for the extraction queries.
    pub columns: Option<Vec<String>>,
}

/// A parsed chunk-definitions document.
///
/// The format is line-oriented: `#` starts a comment, blank lines are
/// ignored, and each remaining line is
/// `schema[.table][,chunk_size][,col1|col2|...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkDefinitions {
    requests: Vec<ChunkRequest>,
}

impl ChunkDefinitions {
    /// Parses a definitions document from text.
    pub fn parse(text: &str) -> RelayResult<Self> {
        let mut requests = Vec::new();

        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            requests.push(Self::parse_line(line).map_err(|err| {
                relay_error!(
                    ErrorKind::ChunkDefinitionInvalid,
                    "Failed to parse chunk definition line",
                    format!("line={} error={err}", line_number + 1)
                )
            })?);
        }

        Ok(Self { requests })
    }

    /// Loads and parses a definitions document from a file.
    pub fn from_file(path: &Path) -> RelayResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            relay_error!(
                ErrorKind::ChunkDefinitionInvalid,
                "Failed to read chunk definitions file",
                format!("path={} error={err}", path.display())
            )
        })?;

        Self::parse(&text)
    }

    /// Returns the parsed requests in document order.
    pub fn requests(&self) -> &[ChunkRequest] {
        &self.requests
    }

    fn parse_line(line: &str) -> RelayResult<ChunkRequest> {
        let mut fields = line.split(',').map(str::trim);

        let Some(target) = fields.next().filter(|target| !target.is_empty()) else {
            bail!(
                ErrorKind::ChunkDefinitionInvalid,
                "Missing schema or schema.table target"
            );
        };

        let (schema, table) = match target.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                (schema.to_string(), Some(table.to_string()))
            }
            Some(_) => {
                bail!(
                    ErrorKind::ChunkDefinitionInvalid,
                    "Empty schema or table in target"
                );
            }
            None => (target.to_string(), None),
        };

        let chunk_size = match fields.next() {
            None | Some("") => -1,
            Some(size) => size.parse::<i64>().map_err(|_| {
                relay_error!(
                    ErrorKind::ChunkDefinitionInvalid,
                    "Chunk size is not an integer",
                    format!("value={size}")
                )
            })?,
        };

        let columns = fields.next().filter(|columns| !columns.is_empty()).map(
            |columns| -> Vec<String> {
                columns
                    .split('|')
                    .map(|column| column.trim().to_string())
                    .collect()
            },
        );

        Ok(ChunkRequest {
            schema,
            table,
            chunk_size,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_line_shapes() {
        let text = "\
# tables to extract in parallel
billing
billing.invoices
billing.line_items,500
billing.customers,0,id|name|region

billing.archive,-1
";
        let definitions = ChunkDefinitions::parse(text).unwrap();
        let requests = definitions.requests();

        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0].schema, "billing");
        assert_eq!(requests[0].table, None);
        assert_eq!(requests[0].chunk_size, -1);

        assert_eq!(requests[1].table.as_deref(), Some("invoices"));

        assert_eq!(requests[2].chunk_size, 500);

        assert_eq!(requests[3].chunk_size, 0);
        assert_eq!(
            requests[3].columns.as_deref(),
            Some(&["id".to_string(), "name".to_string(), "region".to_string()][..])
        );

        assert_eq!(requests[4].chunk_size, -1);
    }

    #[test]
    fn rejects_non_numeric_chunk_size() {
        let error = ChunkDefinitions::parse("billing.invoices,many").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::ChunkDefinitionInvalid);
    }

    #[test]
    fn rejects_empty_table_name() {
        assert!(ChunkDefinitions::parse("billing.").is_err());
    }
}
