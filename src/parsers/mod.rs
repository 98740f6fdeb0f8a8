pub mod combined;

pub use combined::CombinedLogParser;

use crate::error::ParseFailure;
use crate::record::StructuredLogRecord;

/// Turns one raw access-log line into a record, or explains why it cannot
pub trait LineParser {
    fn parse(&self, line: &str) -> Result<StructuredLogRecord, ParseFailure>;
}
