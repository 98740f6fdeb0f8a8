use anyhow::{Context, Result};
use chrono::DateTime;
use regex::Regex;

use super::LineParser;
use crate::error::ParseFailure;
use crate::record::{StructuredLogRecord, DASH, UNKNOWN_NUMBER};

/// Timestamp layout inside the brackets of an access-log line
pub const ACCESS_LOG_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Timestamp layout stored in records (second precision, no offset)
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct CombinedLogParser {
    combined_regex: Regex,
}

impl CombinedLogParser {
    pub fn new() -> Result<Self> {
        // Combined Log Format (Apache)
        // Example: 192.168.1.1 - user [25/Dec/1995:10:00:00 +0000] "GET /index.html HTTP/1.0" 200 1234 "http://www.example.com/" "Mozilla/4.08"
        // Quoted segments may carry backslash-escaped quotes, which are kept verbatim.
        let combined_regex = Regex::new(
            r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "((?:[^"\\]|\\.)*)" (\S+) (\S+) "((?:[^"\\]|\\.)*)" "((?:[^"\\]|\\.)*)"\s*$"#,
        )
        .context("Failed to compile Combined Log Format regex")?;

        Ok(Self { combined_regex })
    }

    /// Split a request line into method, url and protocol.
    ///
    /// Fewer than two tokens leaves all three at `-`.
    pub fn split_request(request: &str) -> (String, String, String) {
        let tokens: Vec<&str> = request.split_whitespace().collect();
        if tokens.len() < 2 {
            return (DASH.to_string(), DASH.to_string(), DASH.to_string());
        }
        (
            tokens[0].to_string(),
            tokens[1].to_string(),
            tokens.get(2).copied().unwrap_or(DASH).to_string(),
        )
    }

    /// `10/Oct/2023:13:55:36 +0000` -> `2023-10-10T13:55:36`, keeping the
    /// wall-clock time of the source offset
    pub fn normalize_timestamp(raw: &str) -> Option<String> {
        DateTime::parse_from_str(raw, ACCESS_LOG_TIME_FORMAT)
            .ok()
            .map(|dt| dt.naive_local().format(RECORD_TIME_FORMAT).to_string())
    }

    fn parse_status(value: &str, line: &str) -> Result<i64, ParseFailure> {
        let status: i64 = value
            .parse()
            .map_err(|_| ParseFailure::new(format!("non-numeric status '{}'", value), line))?;
        if !(100..=599).contains(&status) {
            return Err(ParseFailure::new(
                format!("status {} outside 100-599", status),
                line,
            ));
        }
        Ok(status)
    }

    fn parse_size(value: &str, line: &str) -> Result<i64, ParseFailure> {
        if value == DASH {
            return Ok(UNKNOWN_NUMBER);
        }
        value
            .parse::<u64>()
            .ok()
            .and_then(|size| i64::try_from(size).ok())
            .ok_or_else(|| ParseFailure::new(format!("non-numeric size '{}'", value), line))
    }

    /// Best description of why a line did not match
    fn mismatch_reason(line: &str) -> &'static str {
        if !(line.contains('[') && line.contains(']')) {
            "missing bracketed timestamp"
        } else if line.matches('"').count() < 6 {
            "missing quoted segment"
        } else {
            "does not match Combined Log Format"
        }
    }
}

impl LineParser for CombinedLogParser {
    fn parse(&self, line: &str) -> Result<StructuredLogRecord, ParseFailure> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let captures = self
            .combined_regex
            .captures(line)
            .ok_or_else(|| ParseFailure::new(Self::mismatch_reason(line), line))?;
        let field = |idx: usize| captures.get(idx).map_or("", |m| m.as_str());

        let timestamp = Self::normalize_timestamp(field(4))
            .ok_or_else(|| ParseFailure::new(format!("invalid timestamp '{}'", field(4)), line))?;
        let status = Self::parse_status(field(6), line)?;
        let size = Self::parse_size(field(7), line)?;

        let request_line = field(5).to_string();
        let (method, url, protocol) = Self::split_request(&request_line);

        Ok(StructuredLogRecord {
            ip: field(1).to_string(),
            timestamp,
            request_line,
            status,
            size,
            referer: field(8).to_string(),
            user_agent: field(9).to_string(),
            method,
            url,
            protocol,
        })
    }
}
