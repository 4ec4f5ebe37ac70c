//! Typed request/response surface used by the editor UI
//!
//! Every call the UI makes against files or storage arrives as a
//! `BridgeRequest` and leaves as a `BridgeResponse` envelope. Failures are
//! always reported in the envelope; nothing here panics on bad input.

pub mod mime;
pub mod server;
pub mod stdio;

use crate::buffer::FileBufferCache;
use crate::error::{Result, ShellError};
use crate::storage::LocalCache;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How `content` strings are encoded on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BridgeRequest {
    ReadFile {
        path: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        content: String,
        #[serde(default)]
        encoding: Encoding,
    },
    CompareSavedContent {
        path: PathBuf,
        content: String,
        #[serde(default)]
        encoding: Encoding,
        #[serde(default)]
        force_refresh: bool,
    },
    InvalidateBuffer {
        path: PathBuf,
    },
    CacheStats,
    /// Drop snapshots idle for longer than `ttl_secs` (the cache TTL if omitted)
    EvictStale {
        #[serde(default)]
        ttl_secs: Option<u64>,
    },
    ClearBuffers,
    StorageGet {
        key: String,
    },
    StorageSet {
        key: String,
        value: Value,
    },
    StorageRemove {
        key: String,
    },
    StorageKeys,
    StorageData,
    StorageSave,
    StorageClear,
}

impl BridgeRequest {
    pub fn op(&self) -> &'static str {
        match self {
            BridgeRequest::ReadFile { .. } => "readFile",
            BridgeRequest::WriteFile { .. } => "writeFile",
            BridgeRequest::CompareSavedContent { .. } => "compareSavedContent",
            BridgeRequest::InvalidateBuffer { .. } => "invalidateBuffer",
            BridgeRequest::CacheStats => "cacheStats",
            BridgeRequest::EvictStale { .. } => "evictStale",
            BridgeRequest::ClearBuffers => "clearBuffers",
            BridgeRequest::StorageGet { .. } => "storageGet",
            BridgeRequest::StorageSet { .. } => "storageSet",
            BridgeRequest::StorageRemove { .. } => "storageRemove",
            BridgeRequest::StorageKeys => "storageKeys",
            BridgeRequest::StorageData => "storageData",
            BridgeRequest::StorageSave => "storageSave",
            BridgeRequest::StorageClear => "storageClear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    #[serde(rename_all = "camelCase")]
    File {
        content: String,
        encoding: Encoding,
        size: u64,
        mime_type: Option<&'static str>,
    },
    Compared {
        equal: bool,
    },
    Invalidated {
        removed: bool,
    },
    #[serde(rename_all = "camelCase")]
    Stats {
        entries: usize,
        bytes: usize,
        oldest_age_secs: Option<u64>,
    },
    Value {
        value: Value,
    },
    Keys {
        keys: Vec<String>,
    },
    Data {
        data: Map<String, Value>,
    },
    Evicted {
        evicted: usize,
    },
    Done {},
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// JSON envelope returned for every request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeResponse {
    pub success: bool,
    pub data: Option<ResponseData>,
    pub error: Option<ErrorBody>,
}

impl BridgeResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &ShellError) -> Self {
        Self::failure_message(err.kind(), err.to_string())
    }

    pub fn failure_message(kind: &'static str, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody { kind, message }),
        }
    }
}

/// Owns the buffer cache and local storage for one UI session.
#[derive(Clone)]
pub struct Bridge {
    buffers: Arc<FileBufferCache>,
    storage: Arc<Mutex<LocalCache>>,
}

impl Bridge {
    pub fn new(buffers: FileBufferCache, storage: LocalCache) -> Self {
        Self {
            buffers: Arc::new(buffers),
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    #[cfg(test)]
    pub fn buffers(&self) -> &FileBufferCache {
        &self.buffers
    }

    pub fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let op = request.op();
        match self.dispatch(request) {
            Ok(data) => {
                debug!(op, "Bridge request handled");
                BridgeResponse::ok(data)
            }
            Err(err) => {
                warn!(op, kind = err.kind(), error = %err, "Bridge request failed");
                BridgeResponse::failure(&err)
            }
        }
    }

    fn dispatch(&self, request: BridgeRequest) -> Result<ResponseData> {
        match request {
            BridgeRequest::ReadFile { path } => {
                validate_path(&path)?;
                let snapshot = self.buffers.read(&path)?;
                let (content, encoding) = encode(&snapshot);
                Ok(ResponseData::File {
                    content,
                    encoding,
                    size: snapshot.len() as u64,
                    mime_type: mime::guess(&path),
                })
            }
            BridgeRequest::WriteFile {
                path,
                content,
                encoding,
            } => {
                validate_path(&path)?;
                let bytes = decode(content, encoding)?;
                self.buffers.write(&path, &bytes)?;
                Ok(ResponseData::Done {})
            }
            BridgeRequest::CompareSavedContent {
                path,
                content,
                encoding,
                force_refresh,
            } => {
                validate_path(&path)?;
                let bytes = decode(content, encoding)?;
                let equal = self.buffers.compare(&path, &bytes, force_refresh)?;
                Ok(ResponseData::Compared { equal })
            }
            BridgeRequest::InvalidateBuffer { path } => {
                validate_path(&path)?;
                let removed = self.buffers.invalidate(&path)?;
                Ok(ResponseData::Invalidated { removed })
            }
            BridgeRequest::CacheStats => {
                let stats = self.buffers.stats()?;
                Ok(ResponseData::Stats {
                    entries: stats.entries,
                    bytes: stats.bytes,
                    oldest_age_secs: stats.oldest_age.map(|age| age.as_secs()),
                })
            }
            BridgeRequest::EvictStale { ttl_secs } => {
                let ttl = ttl_secs.map_or(self.buffers.ttl(), Duration::from_secs);
                let evicted = self.buffers.evict_stale(Instant::now(), ttl)?;
                Ok(ResponseData::Evicted { evicted })
            }
            BridgeRequest::ClearBuffers => {
                self.buffers.clear()?;
                Ok(ResponseData::Done {})
            }
            BridgeRequest::StorageGet { key } => {
                let value = self.storage()?.get(&key).cloned().unwrap_or(Value::Null);
                Ok(ResponseData::Value { value })
            }
            BridgeRequest::StorageSet { key, value } => {
                self.storage()?.set(key, value);
                Ok(ResponseData::Done {})
            }
            BridgeRequest::StorageRemove { key } => {
                let value = self.storage()?.remove(&key).unwrap_or(Value::Null);
                Ok(ResponseData::Value { value })
            }
            BridgeRequest::StorageKeys => Ok(ResponseData::Keys {
                keys: self.storage()?.keys(),
            }),
            BridgeRequest::StorageData => Ok(ResponseData::Data {
                data: self.storage()?.data(),
            }),
            BridgeRequest::StorageSave => {
                self.storage()?.save()?;
                Ok(ResponseData::Done {})
            }
            BridgeRequest::StorageClear => {
                self.storage()?.clear()?;
                Ok(ResponseData::Done {})
            }
        }
    }

    fn storage(&self) -> Result<MutexGuard<'_, LocalCache>> {
        self.storage
            .lock()
            .map_err(|_| ShellError::CacheLock("local storage"))
    }
}

fn validate_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(ShellError::InvalidRequest("path is empty".to_string()));
    }
    if !path.is_absolute() {
        return Err(ShellError::InvalidRequest(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    Ok(())
}

fn decode(content: String, encoding: Encoding) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Utf8 => Ok(content.into_bytes()),
        Encoding::Base64 => STANDARD
            .decode(content.as_bytes())
            .map_err(|e| ShellError::InvalidRequest(format!("invalid base64 content: {}", e))),
    }
}

// Text when the bytes allow it, base64 otherwise
pub(crate) fn encode(bytes: &[u8]) -> (String, Encoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), Encoding::Utf8),
        Err(_) => (STANDARD.encode(bytes), Encoding::Base64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn bridge(dir: &TempDir) -> Bridge {
        let storage = LocalCache::open(&dir.path().join("storage"), "cceditor").unwrap();
        Bridge::new(FileBufferCache::new(), storage)
    }

    fn request(value: Value) -> BridgeRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_wire_format() {
        let req = request(json!({
            "op": "compareSavedContent",
            "path": "/w/a.rs",
            "content": "fn a() {}",
            "forceRefresh": true
        }));
        match req {
            BridgeRequest::CompareSavedContent {
                encoding,
                force_refresh,
                ..
            } => {
                assert_eq!(encoding, Encoding::Utf8);
                assert!(force_refresh);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        assert!(matches!(request(json!({"op": "cacheStats"})), BridgeRequest::CacheStats));
        assert!(serde_json::from_value::<BridgeRequest>(json!({"op": "openDialog"})).is_err());
    }

    #[test]
    fn test_write_read_compare_through_bridge() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        let path = dir.path().join("index.html");

        let resp = bridge.handle(request(json!({
            "op": "writeFile",
            "path": path,
            "content": "<p>hi</p>"
        })));
        assert!(resp.success);
        assert_eq!(std::fs::read(&path).unwrap(), b"<p>hi</p>");

        let resp = bridge.handle(request(json!({
            "op": "compareSavedContent",
            "path": path,
            "content": "<p>hi</p>"
        })));
        assert_eq!(resp.data, Some(ResponseData::Compared { equal: true }));

        let resp = bridge.handle(request(json!({"op": "readFile", "path": path})));
        assert_eq!(
            resp.data,
            Some(ResponseData::File {
                content: "<p>hi</p>".to_string(),
                encoding: Encoding::Utf8,
                size: 9,
                mime_type: Some("text/html"),
            })
        );
    }

    #[test]
    fn test_response_envelope_shape() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "abc").unwrap();

        let resp = bridge.handle(request(json!({"op": "readFile", "path": path})));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "data": {"content": "abc", "encoding": "utf8", "size": 3, "mimeType": "text/plain"},
                "error": null
            })
        );

        let resp = bridge.handle(request(json!({"op": "storageSave"})));
        assert_eq!(serde_json::to_value(&resp).unwrap()["data"], json!({}));
    }

    #[test]
    fn test_binary_content_uses_base64() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        let path = dir.path().join("blob.bin");
        let bytes = [0xff_u8, 0x00, 0xfe];
        std::fs::write(&path, bytes).unwrap();

        let resp = bridge.handle(request(json!({"op": "readFile", "path": path})));
        let Some(ResponseData::File {
            content, encoding, ..
        }) = resp.data
        else {
            panic!("expected file data");
        };
        assert_eq!(encoding, Encoding::Base64);

        let resp = bridge.handle(request(json!({
            "op": "compareSavedContent",
            "path": path,
            "content": content,
            "encoding": "base64"
        })));
        assert_eq!(resp.data, Some(ResponseData::Compared { equal: true }));
    }

    #[test]
    fn test_relative_path_rejected() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);

        let resp = bridge.handle(request(json!({"op": "readFile", "path": "src/main.rs"})));
        assert!(!resp.success);
        assert_eq!(resp.error.unwrap().kind, "invalidRequest");
    }

    #[test]
    fn test_bad_base64_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        let path = dir.path().join("a.txt");

        let resp = bridge.handle(request(json!({
            "op": "writeFile",
            "path": path,
            "content": "not base64!!",
            "encoding": "base64"
        })));
        assert_eq!(resp.error.unwrap().kind, "invalidRequest");
        assert!(!path.exists());
        assert!(bridge.buffers().is_empty().unwrap());
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        let path = dir.path().join("ghost.rs");

        let resp = bridge.handle(request(json!({
            "op": "compareSavedContent",
            "path": path,
            "content": ""
        })));
        let error = resp.error.unwrap();
        assert_eq!(error.kind, "notFound");
        assert!(error.message.contains("ghost.rs"));
    }

    #[test]
    fn test_invalidate_and_stats() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        let path = dir.path().join("a.txt");

        bridge.handle(request(json!({"op": "writeFile", "path": path, "content": "1234"})));
        let resp = bridge.handle(request(json!({"op": "cacheStats"})));
        assert!(matches!(
            resp.data,
            Some(ResponseData::Stats {
                entries: 1,
                bytes: 4,
                ..
            })
        ));

        let resp = bridge.handle(request(json!({"op": "invalidateBuffer", "path": path})));
        assert_eq!(resp.data, Some(ResponseData::Invalidated { removed: true }));
        assert!(bridge.buffers().is_empty().unwrap());
    }

    #[test]
    fn test_evict_stale_and_clear_buffers() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        for name in ["a.txt", "b.txt"] {
            let path = dir.path().join(name);
            bridge.handle(request(json!({"op": "writeFile", "path": path, "content": name})));
        }

        let resp = bridge.handle(request(json!({"op": "evictStale"})));
        assert_eq!(resp.data, Some(ResponseData::Evicted { evicted: 0 }));
        assert_eq!(bridge.buffers().len().unwrap(), 2);

        std::thread::sleep(Duration::from_millis(20));
        let resp = bridge.handle(request(json!({"op": "evictStale", "ttlSecs": 0})));
        assert_eq!(resp.data, Some(ResponseData::Evicted { evicted: 2 }));

        let path = dir.path().join("a.txt");
        bridge.handle(request(json!({"op": "readFile", "path": path})));
        let resp = bridge.handle(request(json!({"op": "clearBuffers"})));
        assert_eq!(resp.data, Some(ResponseData::Done {}));
        assert!(bridge.buffers().is_empty().unwrap());
    }

    #[test]
    fn test_storage_data_returns_every_entry() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        bridge.handle(request(json!({"op": "storageSet", "key": "theme", "value": "dark"})));
        bridge.handle(request(json!({"op": "storageSet", "key": "tabs", "value": [1, 2]})));

        let resp = bridge.handle(request(json!({"op": "storageData"})));
        assert_eq!(
            serde_json::to_value(&resp).unwrap()["data"],
            json!({"data": {"theme": "dark", "tabs": [1, 2]}})
        );
    }

    #[test]
    fn test_storage_ops() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);

        bridge.handle(request(json!({"op": "storageSet", "key": "recent", "value": ["/a.rs"]})));
        let resp = bridge.handle(request(json!({"op": "storageGet", "key": "recent"})));
        assert_eq!(resp.data, Some(ResponseData::Value { value: json!(["/a.rs"]) }));

        let resp = bridge.handle(request(json!({"op": "storageGet", "key": "missing"})));
        assert_eq!(resp.data, Some(ResponseData::Value { value: Value::Null }));

        assert!(bridge.handle(request(json!({"op": "storageSave"}))).success);
        let reopened = LocalCache::open(&dir.path().join("storage"), "cceditor").unwrap();
        assert_eq!(reopened.get("recent"), Some(&json!(["/a.rs"])));

        let resp = bridge.handle(request(json!({"op": "storageKeys"})));
        assert_eq!(resp.data, Some(ResponseData::Keys { keys: vec!["recent".to_string()] }));

        assert!(bridge.handle(request(json!({"op": "storageClear"}))).success);
        let resp = bridge.handle(request(json!({"op": "storageRemove", "key": "recent"})));
        assert_eq!(resp.data, Some(ResponseData::Value { value: Value::Null }));
    }
}
