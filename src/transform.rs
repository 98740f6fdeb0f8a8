use std::borrow::Cow;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{DecodeFailure, StoreError, TransformFailure};
use crate::record::StoredRecord;
use crate::stats::TransformStats;
use crate::store::{fresh_artifact, ArtifactRef, ArtifactStore, StoreLayout};

/// Column order of processed artifacts; downstream tables bind positionally
pub const PROCESSED_COLUMNS: [&str; 9] = [
    "ip",
    "timestamp",
    "method",
    "url",
    "protocol",
    "status",
    "size",
    "referer",
    "user_agent",
];

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Tsv,
}

impl OutputFormat {
    pub fn delimiter(self) -> char {
        match self {
            OutputFormat::Csv => ',',
            OutputFormat::Tsv => '\t',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            other => Err(anyhow::anyhow!(
                "unknown output format '{}', expected csv or tsv",
                other
            )),
        }
    }
}

fn percent_code(c: char) -> String {
    format!("%{:02X}", c as u32)
}

fn needs_escape(c: char, delimiter: char) -> bool {
    c == delimiter || matches!(c, '%' | '\n' | '\r')
}

/// Percent-encode `%`, the delimiter and line breaks so a free-text value
/// stays in its column and decodes back unchanged
pub fn escape_field(value: &str, delimiter: char) -> Cow<'_, str> {
    if !value.contains(|c| needs_escape(c, delimiter)) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if needs_escape(c, delimiter) {
            escaped.push_str(&percent_code(c));
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

/// Inverse of [`escape_field`], decoded in a single left-to-right pass
pub fn unescape_field(value: &str, delimiter: char) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        unescaped.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .get(1..3)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .map(char::from)
            .filter(|&c| needs_escape(c, delimiter));
        match decoded {
            Some(c) => {
                unescaped.push(c);
                rest = &tail[3..];
            }
            None => {
                unescaped.push('%');
                rest = &tail[1..];
            }
        }
    }
    unescaped.push_str(rest);
    unescaped
}

/// The nine processed columns of one record, in [`PROCESSED_COLUMNS`] order.
/// Every text column is escaped; a proxied client like `10.0.0.1,10.0.0.2`
/// would otherwise shift the columns after it.
pub fn processed_fields(record: &StoredRecord, format: OutputFormat) -> [Cow<'_, str>; 9] {
    let delimiter = format.delimiter();
    [
        escape_field(record.ip(), delimiter),
        escape_field(record.timestamp(), delimiter),
        escape_field(record.method(), delimiter),
        escape_field(record.url(), delimiter),
        escape_field(record.protocol(), delimiter),
        Cow::Owned(record.status().to_string()),
        Cow::Owned(record.size().to_string()),
        escape_field(record.referer(), delimiter),
        escape_field(record.user_agent(), delimiter),
    ]
}

/// Decode every non-blank line of a raw artifact, collecting failures
pub fn decode_raw(content: &str) -> (Vec<StoredRecord>, Vec<DecodeFailure>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => failures.push(DecodeFailure {
                line_number: idx + 1,
                reason: e.to_string(),
            }),
        }
    }
    (records, failures)
}

/// Render records as delimited lines, each terminated by `\n`
pub fn render_processed(records: &[StoredRecord], format: OutputFormat) -> Result<Vec<u8>, TransformFailure> {
    let mut writer = WriterBuilder::new()
        .delimiter(format.delimiter() as u8)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(Vec::new());
    for record in records {
        let fields = processed_fields(record, format);
        writer
            .write_record(fields.iter().map(|f| f.as_bytes()))
            .map_err(|e| TransformFailure::Encode(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| TransformFailure::Encode(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub artifact: ArtifactRef,
    pub stats: TransformStats,
}

/// Flattens a raw artifact into a delimited processed artifact
pub struct RecordTransformer<'a> {
    store: &'a dyn ArtifactStore,
    clock: &'a dyn Clock,
    layout: &'a StoreLayout,
}

impl<'a> RecordTransformer<'a> {
    pub fn new(store: &'a dyn ArtifactStore, clock: &'a dyn Clock, layout: &'a StoreLayout) -> Self {
        Self {
            store,
            clock,
            layout,
        }
    }

    fn read_source(&self, source: &ArtifactRef) -> Result<String, TransformFailure> {
        let read_failure = |cause| TransformFailure::SourceRead {
            source_ref: source.clone(),
            cause,
        };
        if !self.store.exists(source.as_str()).map_err(read_failure)? {
            return Err(TransformFailure::SourceMissing(source.clone()));
        }
        let mut bytes = Vec::new();
        self.store
            .open(source.as_str())
            .map_err(read_failure)?
            .read_to_end(&mut bytes)
            .map_err(|e| {
                read_failure(StoreError::Io {
                    path: source.to_string(),
                    source: e,
                })
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn transform(
        &self,
        source: &ArtifactRef,
        format: OutputFormat,
    ) -> Result<TransformOutcome, TransformFailure> {
        let content = self.read_source(source)?;
        let (records, failures) = decode_raw(&content);

        let mut stats = TransformStats {
            lines_read: records.len() + failures.len(),
            ..Default::default()
        };
        for failure in failures {
            warn!(source = %source, line_number = failure.line_number, reason = %failure.reason, "Skipping undecodable record");
            stats.record_decode_failure(failure.to_string());
        }

        let payload = render_processed(&records, format)?;
        let destination = fresh_artifact(
            self.store,
            self.clock,
            &self.layout.processed_dir,
            &self.layout.base_name,
            format.extension(),
        )
        .map_err(|cause| TransformFailure::Write {
            destination: ArtifactRef::new(&self.layout.processed_dir),
            cause,
            stats: stats.clone(),
        })?;

        debug!(destination = %destination, bytes = payload.len(), "Writing processed artifact");
        self.store
            .create(destination.as_str(), &payload)
            .map_err(|cause| TransformFailure::Write {
                destination: destination.clone(),
                cause,
                stats: stats.clone(),
            })?;

        stats.records_transformed = records.len();
        info!(
            source = %source,
            destination = %destination,
            records = stats.records_transformed,
            undecodable = stats.decode_failures,
            "Transform finished"
        );

        Ok(TransformOutcome {
            artifact: destination,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::parsers::{CombinedLogParser, LineParser};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    const RAW: &str = r#"{"ip":"203.0.113.5","timestamp":"2023-10-10T13:55:36","request_line":"GET /a,b HTTP/1.1","status":200,"size":512,"referer":"-","user_agent":"curl/7.68.0","method":"GET","url":"/a,b","protocol":"HTTP/1.1"}"#;

    fn clock() -> FixedClock {
        FixedClock::at(
            NaiveDate::from_ymd_opt(2023, 10, 10)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
        )
    }

    fn setup(raw: &str) -> (MemoryStore, StoreLayout, ArtifactRef) {
        let store = MemoryStore::new();
        let layout = StoreLayout::default();
        layout.initialize(&store).unwrap();
        let source = ArtifactRef::new("/logs/raw/weblogs_20231010_135536.json");
        store.create(source.as_str(), raw.as_bytes()).unwrap();
        (store, layout, source)
    }

    #[test]
    fn test_example_line_is_escaped() {
        let (store, layout, source) = setup(&format!("{RAW}\n"));
        let clock = clock();
        let outcome = RecordTransformer::new(&store, &clock, &layout)
            .transform(&source, OutputFormat::Csv)
            .unwrap();

        assert_eq!(outcome.artifact.as_str(), "/logs/processed/weblogs_20231010_140000.csv");
        assert_eq!(outcome.stats.records_transformed, 1);
        let content = String::from_utf8(store.contents(outcome.artifact.as_str()).unwrap()).unwrap();
        assert_eq!(
            content,
            "203.0.113.5,2023-10-10T13:55:36,GET,/a%2Cb,HTTP/1.1,200,512,-,curl/7.68.0\n"
        );
    }

    #[test]
    fn test_missing_keys_use_sentinels() {
        let (store, layout, source) = setup("{\"ip\":\"10.0.0.1\"}\n");
        let clock = clock();
        let outcome = RecordTransformer::new(&store, &clock, &layout)
            .transform(&source, OutputFormat::Csv)
            .unwrap();
        let content = String::from_utf8(store.contents(outcome.artifact.as_str()).unwrap()).unwrap();
        assert_eq!(content, "10.0.0.1,-,-,-,-,-1,-1,-,-\n");
    }

    #[test]
    fn test_undecodable_lines_are_counted() {
        let raw = format!("{RAW}\nnot json\n\n42\n{{\"status\":\"abc\"}}\n{RAW}\n");
        let (store, layout, source) = setup(&raw);
        let clock = clock();
        let outcome = RecordTransformer::new(&store, &clock, &layout)
            .transform(&source, OutputFormat::Csv)
            .unwrap();

        assert_eq!(outcome.stats.records_transformed, 2);
        assert_eq!(outcome.stats.decode_failures, 3);
        assert_eq!(outcome.stats.lines_read, 5);
        assert!(outcome.stats.failure_examples[0].starts_with("line 2:"));
    }

    #[test]
    fn test_tsv_keeps_commas_and_escapes_tabs() {
        let raw = r#"{"url":"/a,b","user_agent":"x\ty"}"#;
        let (store, layout, source) = setup(raw);
        let clock = clock();
        let outcome = RecordTransformer::new(&store, &clock, &layout)
            .transform(&source, OutputFormat::Tsv)
            .unwrap();
        assert!(outcome.artifact.as_str().ends_with(".tsv"));
        let content = String::from_utf8(store.contents(outcome.artifact.as_str()).unwrap()).unwrap();
        let columns: Vec<&str> = content.trim_end().split('\t').collect();
        assert_eq!(columns.len(), 9);
        assert_eq!(columns[3], "/a,b");
        assert_eq!(columns[8], "x%09y");
    }

    #[test]
    fn test_missing_source_fails() {
        let (store, layout, _) = setup("");
        let clock = clock();
        let failure = RecordTransformer::new(&store, &clock, &layout)
            .transform(&ArtifactRef::new("/logs/raw/nope.json"), OutputFormat::Csv)
            .unwrap_err();
        assert!(matches!(failure, TransformFailure::SourceMissing(_)));
    }

    #[test]
    fn test_unwritable_destination_fails() {
        let store = MemoryStore::new();
        store.mkdirs("/logs/raw").unwrap();
        let source = ArtifactRef::new("/logs/raw/a.json");
        store.create(source.as_str(), RAW.as_bytes()).unwrap();
        let layout = StoreLayout::default();
        let clock = clock();

        let failure = RecordTransformer::new(&store, &clock, &layout)
            .transform(&source, OutputFormat::Csv)
            .unwrap_err();
        assert!(matches!(failure, TransformFailure::Write { .. }));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!(" tsv ".parse::<OutputFormat>().unwrap(), OutputFormat::Tsv);
        assert!("parquet".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_escape_borrows_when_clean() {
        assert!(matches!(escape_field("/plain", ','), Cow::Borrowed(_)));
        assert_eq!(escape_field("a,b\nc", ','), "a%2Cb%0Ac");
    }

    #[test]
    fn test_existing_percent_sequences_survive() {
        let url = "/search?q=a,b&r=x%2Cy&s=%09%25";
        let escaped = escape_field(url, ',');
        assert_eq!(escaped, "/search?q=a%2Cb&r=x%252Cy&s=%2509%2525");
        assert_eq!(unescape_field(&escaped, ','), url);
        // A stray percent that is not one of our codes is left alone
        assert_eq!(unescape_field("100%", ','), "100%");
        assert_eq!(unescape_field("%zz%4", ','), "%zz%4");
    }

    #[test]
    fn test_proxied_client_keeps_nine_columns() {
        let parser = CombinedLogParser::new().unwrap();
        let line = r#"10.0.0.1,10.0.0.2 - - [10/Oct/2023:13:55:36 +0000] "GET / HTTP/1.1" 200 5 "-" "-""#;
        let record = StoredRecord::from(parser.parse(line).unwrap());

        let rendered = String::from_utf8(render_processed(&[record], OutputFormat::Csv).unwrap()).unwrap();
        assert_eq!(
            rendered,
            "10.0.0.1%2C10.0.0.2,2023-10-10T13:55:36,GET,/,HTTP/1.1,200,5,-,-\n"
        );
        let columns: Vec<&str> = rendered.trim_end().split(',').collect();
        assert_eq!(columns.len(), 9);
        assert_eq!(unescape_field(columns[0], ','), "10.0.0.1,10.0.0.2");
    }

    proptest! {
        #[test]
        fn prop_escape_roundtrip(value in "[a-zA-Z0-9/,%\t\r\n ._-]{0,40}", tsv in any::<bool>()) {
            let delimiter = if tsv { '\t' } else { ',' };
            let escaped = escape_field(&value, delimiter);
            prop_assert!(!escaped.contains(delimiter));
            prop_assert_eq!(unescape_field(&escaped, delimiter), value);
        }
    }
}
