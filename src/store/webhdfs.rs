//! WebHDFS REST backend.
//!
//! Data-carrying operations (CREATE, APPEND, OPEN) are two-step: the namenode
//! answers with a redirect to a datanode, and the payload goes to that
//! location. Redirects are followed by hand so the body is only sent once.

use std::io::Read;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use super::{join_path, normalize_path, ArtifactStore, EntryKind, StoreEntry};
use crate::error::StoreError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct WebHdfsConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub timeout: Duration,
}

impl WebHdfsConfig {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct WebHdfsStore {
    client: Client,
    base_url: Url,
    user: String,
}

#[derive(Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStatusResponse {
    file_statuses: FileStatuses,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatuses {
    file_status: Vec<FileStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStatus {
    path_suffix: String,
    #[serde(rename = "type")]
    kind: String,
    length: u64,
    modification_time: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteExceptionResponse {
    remote_exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    message: String,
}

impl WebHdfsStore {
    pub fn connect(config: &WebHdfsConfig) -> Result<Self, StoreError> {
        let endpoint = format!("http://{}:{}/webhdfs/v1", config.host, config.port);
        let base_url = Url::parse(&endpoint).map_err(|e| StoreError::Protocol {
            op: "connect",
            path: endpoint.clone(),
            message: e.to_string(),
        })?;
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(config.timeout)
            .build()
            .map_err(|source| StoreError::Http {
                path: endpoint,
                source,
            })?;
        Ok(Self {
            client,
            base_url,
            user: config.user.clone(),
        })
    }

    /// Namenode URL for `path`; each path segment is percent-encoded
    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let normalized = normalize_path(path);
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        // An http base always has path segments
        if let Ok(mut parts) = url.path_segments_mut() {
            parts.pop_if_empty();
            if segments.is_empty() {
                parts.push("");
            } else {
                parts.extend(segments);
            }
        }
        url
    }

    /// Namenode request for `op`; the query is encoded by reqwest
    fn request(&self, method: Method, path: &str, op: &str, params: &[(&str, &str)]) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .query(&[("op", op), ("user.name", self.user.as_str())])
            .query(params)
    }

    fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        request.send().map_err(|source| StoreError::Http {
            path: normalize_path(path),
            source,
        })
    }

    /// Turn a non-success response into a store error
    fn check(&self, op: &'static str, path: &str, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<RemoteExceptionResponse>(&body)
            .map(|r| r.remote_exception.message)
            .unwrap_or(body);
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(normalize_path(path)));
        }
        Err(StoreError::Rejected {
            op,
            path: normalize_path(path),
            status: status.as_u16(),
            message,
        })
    }

    /// Ask the namenode where the payload should go
    fn datanode_location(
        &self,
        op: &'static str,
        request: RequestBuilder,
        path: &str,
    ) -> Result<String, StoreError> {
        let response = self.send(path, request)?;
        if !response.status().is_redirection() {
            let response = self.check(op, path, response)?;
            return Err(StoreError::Protocol {
                op,
                path: normalize_path(path),
                message: format!("expected a redirect, got HTTP {}", response.status()),
            });
        }
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Protocol {
                op,
                path: normalize_path(path),
                message: "redirect without a Location header".to_string(),
            })
    }

    fn write(
        &self,
        op: &'static str,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        data: &[u8],
    ) -> Result<(), StoreError> {
        let location = self.datanode_location(op, self.request(method.clone(), path, op, params), path)?;
        debug!(op, path, bytes = data.len(), "Writing to datanode");
        let response = self.send(
            path,
            self.client
                .request(method, location)
                .header("Content-Type", "application/octet-stream")
                .body(data.to_vec()),
        )?;
        self.check(op, path, response).map(|_| ())
    }
}

impl ArtifactStore for WebHdfsStore {
    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let response = self.send(path, self.request(Method::GET, path, "GETFILESTATUS", &[]))?;
        match self.check("GETFILESTATUS", path, response) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        let response = self.send(path, self.request(Method::PUT, path, "MKDIRS", &[]))?;
        let response = self.check("MKDIRS", path, response)?;
        let created: BooleanResponse = response.json().map_err(|source| StoreError::Http {
            path: normalize_path(path),
            source,
        })?;
        if created.boolean {
            Ok(())
        } else {
            Err(StoreError::Protocol {
                op: "MKDIRS",
                path: normalize_path(path),
                message: "namenode refused to create the directory".to_string(),
            })
        }
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.write("CREATE", Method::PUT, path, &[("overwrite", "true")], data)
    }

    fn append(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.write("APPEND", Method::POST, path, &[], data)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, StoreError> {
        let location =
            self.datanode_location("OPEN", self.request(Method::GET, path, "OPEN", &[]), path)?;
        let response = self.send(path, self.client.get(location))?;
        let response = self.check("OPEN", path, response)?;
        Ok(Box::new(response))
    }

    fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let response = self.send(path, self.request(Method::GET, path, "LISTSTATUS", &[]))?;
        let response = self.check("LISTSTATUS", path, response)?;
        let listing: ListStatusResponse = response.json().map_err(|source| StoreError::Http {
            path: normalize_path(path),
            source,
        })?;

        Ok(listing
            .file_statuses
            .file_status
            .into_iter()
            .map(|status| StoreEntry {
                path: join_path(path, &status.path_suffix),
                kind: if status.kind == "DIRECTORY" {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                length: status.length,
                modified: DateTime::<Utc>::from_timestamp_millis(status.modification_time)
                    .unwrap_or_default(),
                name: status.path_suffix,
            })
            .collect())
    }
}
