//! Schema provisioning seam.
//!
//! The query engine itself is external; the pipeline only hands it table
//! definitions that match the raw and processed artifact layouts.

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::store::{join_path, ArtifactRef, ArtifactStore, StoreLayout};
use crate::transform::OutputFormat;

pub const DEFAULT_DATABASE: &str = "weblogs";

/// What a provisioner needs to describe the artifacts
#[derive(Debug, Clone, Copy)]
pub struct SchemaRequest<'a> {
    pub database: &'a str,
    pub layout: &'a StoreLayout,
    pub format: OutputFormat,
}

pub trait SchemaProvisioner {
    /// Make tables for the raw and processed prefixes available; returns the
    /// artifact holding the definitions, if any was written
    fn provision(&self, request: &SchemaRequest<'_>) -> Result<Option<ArtifactRef>>;
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid database name '{}'", name);
    }
    Ok(())
}

fn field_terminator(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Csv => ",",
        OutputFormat::Tsv => "\\t",
    }
}

/// HiveQL for the database and its two external tables
pub fn render_hive_ddl(request: &SchemaRequest<'_>) -> Result<String> {
    validate_identifier(request.database)?;
    let db = request.database;
    let layout = request.layout;

    Ok(format!(
        "CREATE DATABASE IF NOT EXISTS {db};\n\
         \n\
         CREATE EXTERNAL TABLE IF NOT EXISTS {db}.raw_logs (\n\
         \x20   ip STRING,\n\
         \x20   `timestamp` STRING,\n\
         \x20   request_line STRING,\n\
         \x20   status INT,\n\
         \x20   size BIGINT,\n\
         \x20   referer STRING,\n\
         \x20   user_agent STRING,\n\
         \x20   method STRING,\n\
         \x20   url STRING,\n\
         \x20   protocol STRING\n\
         )\n\
         ROW FORMAT SERDE 'org.apache.hive.hcatalog.data.JsonSerDe'\n\
         STORED AS TEXTFILE\n\
         LOCATION '{raw}/';\n\
         \n\
         CREATE EXTERNAL TABLE IF NOT EXISTS {db}.processed_logs (\n\
         \x20   ip STRING,\n\
         \x20   `timestamp` STRING,\n\
         \x20   method STRING,\n\
         \x20   url STRING,\n\
         \x20   protocol STRING,\n\
         \x20   status INT,\n\
         \x20   size BIGINT,\n\
         \x20   referer STRING,\n\
         \x20   user_agent STRING\n\
         )\n\
         ROW FORMAT DELIMITED\n\
         FIELDS TERMINATED BY '{term}'\n\
         STORED AS TEXTFILE\n\
         LOCATION '{processed}/';\n",
        db = db,
        raw = layout.raw_dir,
        processed = layout.processed_dir,
        term = field_terminator(request.format),
    ))
}

/// Writes the table definitions as a script next to the data
pub struct HiveDdlScript<'a> {
    store: &'a dyn ArtifactStore,
}

impl<'a> HiveDdlScript<'a> {
    pub fn new(store: &'a dyn ArtifactStore) -> Self {
        Self { store }
    }
}

impl SchemaProvisioner for HiveDdlScript<'_> {
    fn provision(&self, request: &SchemaRequest<'_>) -> Result<Option<ArtifactRef>> {
        let ddl = render_hive_ddl(request)?;
        let path = ArtifactRef::new(join_path(
            &request.layout.schema_dir,
            &format!("{}_tables.hql", request.database),
        ));
        self.store
            .create(path.as_str(), ddl.as_bytes())
            .with_context(|| format!("Failed to write table definitions to {}", path))?;
        info!(database = request.database, script = %path, "Table definitions written");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transform::PROCESSED_COLUMNS;

    #[test]
    fn test_processed_table_matches_column_order() {
        let layout = StoreLayout::default();
        let ddl = render_hive_ddl(&SchemaRequest {
            database: "weblogs",
            layout: &layout,
            format: OutputFormat::Csv,
        })
        .unwrap();

        let processed = ddl.split("processed_logs (").nth(1).unwrap();
        let columns: Vec<String> = processed
            .split(')')
            .next()
            .unwrap()
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .map(|c| c.trim_matches('`').to_string())
            .collect();
        assert_eq!(columns, PROCESSED_COLUMNS);
        assert!(ddl.contains("FIELDS TERMINATED BY ','"));
        assert!(ddl.contains("LOCATION '/logs/processed/'"));
        assert!(ddl.contains("LOCATION '/logs/raw/'"));
    }

    #[test]
    fn test_tsv_terminator() {
        let layout = StoreLayout::default();
        let ddl = render_hive_ddl(&SchemaRequest {
            database: "weblogs",
            layout: &layout,
            format: OutputFormat::Tsv,
        })
        .unwrap();
        assert!(ddl.contains(r"FIELDS TERMINATED BY '\t'"));
    }

    #[test]
    fn test_rejects_unsafe_database_name() {
        let layout = StoreLayout::default();
        for name in ["", "1db", "web;DROP", "a b"] {
            assert!(render_hive_ddl(&SchemaRequest {
                database: name,
                layout: &layout,
                format: OutputFormat::Csv,
            })
            .is_err());
        }
    }

    #[test]
    fn test_script_written_to_schema_dir() {
        let store = MemoryStore::new();
        let layout = StoreLayout::default();
        layout.initialize(&store).unwrap();
        let written = HiveDdlScript::new(&store)
            .provision(&SchemaRequest {
                database: "weblogs",
                layout: &layout,
                format: OutputFormat::Csv,
            })
            .unwrap()
            .unwrap();
        assert_eq!(written.as_str(), "/logs/schema/weblogs_tables.hql");
        let content = String::from_utf8(store.contents(written.as_str()).unwrap()).unwrap();
        assert!(content.starts_with("CREATE DATABASE IF NOT EXISTS weblogs;"));
    }
}
