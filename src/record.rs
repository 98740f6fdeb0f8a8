use serde::{Deserialize, Serialize};

/// Marker for an absent textual field, as written in access logs
pub const DASH: &str = "-";

/// Marker for an absent or unknown numeric field (status, size)
pub const UNKNOWN_NUMBER: i64 = -1;

/// One successfully parsed access-log line.
///
/// This is the shape written to raw artifacts, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredLogRecord {
    pub ip: String,
    pub timestamp: String,
    pub request_line: String,
    pub status: i64,
    pub size: i64,
    pub referer: String,
    pub user_agent: String,
    pub method: String,
    pub url: String,
    pub protocol: String,
}

impl StructuredLogRecord {
    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Decode shape for records read back from a raw artifact.
///
/// Every field is optional so that a record written by an older or foreign
/// producer still decodes; missing keys fall back to the sentinels through the
/// accessor methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoredRecord {
    pub ip: Option<String>,
    pub timestamp: Option<String>,
    #[serde(alias = "request")]
    pub request_line: Option<String>,
    pub status: Option<i64>,
    pub size: Option<i64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub protocol: Option<String>,
}

fn text_or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(DASH)
}

impl StoredRecord {
    pub fn ip(&self) -> &str {
        text_or_dash(&self.ip)
    }

    pub fn timestamp(&self) -> &str {
        text_or_dash(&self.timestamp)
    }

    pub fn method(&self) -> &str {
        text_or_dash(&self.method)
    }

    pub fn url(&self) -> &str {
        text_or_dash(&self.url)
    }

    pub fn protocol(&self) -> &str {
        text_or_dash(&self.protocol)
    }

    pub fn referer(&self) -> &str {
        text_or_dash(&self.referer)
    }

    pub fn user_agent(&self) -> &str {
        text_or_dash(&self.user_agent)
    }

    pub fn status(&self) -> i64 {
        self.status.unwrap_or(UNKNOWN_NUMBER)
    }

    pub fn size(&self) -> i64 {
        self.size.unwrap_or(UNKNOWN_NUMBER)
    }
}

impl From<StructuredLogRecord> for StoredRecord {
    fn from(record: StructuredLogRecord) -> Self {
        Self {
            ip: Some(record.ip),
            timestamp: Some(record.timestamp),
            request_line: Some(record.request_line),
            status: Some(record.status),
            size: Some(record.size),
            referer: Some(record.referer),
            user_agent: Some(record.user_agent),
            method: Some(record.method),
            url: Some(record.url),
            protocol: Some(record.protocol),
        }
    }
}
