//! In-memory catalog with the same upload checks as the real one.
//!
//! - `Content-MD5` is verified when a part is PUT
//! - completion re-verifies every stored part and the whole-file multihash
//! - a second session for an asset with one in progress is a 409
//!
//! Presigned URLs look like `memory://{upload_id}/{part}`.

use async_trait::async_trait;
use eoflow_protocol::defaults::UPLOAD_IN_PROGRESS_MARKER;
use eoflow_publish::{
    md5_base64, sha256_multihash, AssetKey, AssetPayload, CatalogApi, CatalogError, CatalogResult,
    CompletedPart, CreateUploadRequest, ItemPayload, PresignedUrl, UploadSession, UploadStatus,
    UploadSummary,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct UploadRecord {
    key: AssetKey,
    status: UploadStatus,
    request: Option<CreateUploadRequest>,
    parts: BTreeMap<u32, Vec<u8>>,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: String,
    status: u16,
    remaining: usize,
}

#[derive(Default)]
struct CatalogState {
    items: BTreeMap<(String, String), Value>,
    assets: BTreeMap<String, Value>,
    objects: BTreeMap<String, Vec<u8>>,
    uploads: BTreeMap<String, UploadRecord>,
    next_upload: u64,
    failures: Vec<InjectedFailure>,
    corrupt_parts: HashSet<u32>,
    calls: Vec<String>,
}

impl CatalogState {
    /// Record the call and consume an injected failure for it, if any.
    fn enter(&mut self, operation: &str) -> CatalogResult<()> {
        self.calls.push(operation.to_string());
        if let Some(failure) = self
            .failures
            .iter_mut()
            .find(|f| f.operation == operation && f.remaining > 0)
        {
            failure.remaining -= 1;
            return Err(CatalogError::status(failure.status, "injected failure"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().expect("catalog state poisoned")
    }

    /// Fail the next `times` calls of `operation` with `status`.
    pub fn fail_next(&self, operation: &str, status: u16, times: usize) {
        self.state().failures.push(InjectedFailure {
            operation: operation.to_string(),
            status,
            remaining: times,
        });
    }

    /// Flip a byte of part `part_number` after its `Content-MD5` was
    /// accepted, as if storage had corrupted it.
    pub fn corrupt_stored_part(&self, part_number: u32) {
        self.state().corrupt_parts.insert(part_number);
    }

    /// Open a session for `key` that nobody will finish. Returns its id.
    pub fn seed_in_progress_upload(&self, key: &AssetKey) -> String {
        let mut state = self.state();
        let upload_id = next_upload_id(&mut state);
        state.uploads.insert(
            upload_id.clone(),
            UploadRecord {
                key: key.clone(),
                status: UploadStatus::InProgress,
                request: None,
                parts: BTreeMap::new(),
            },
        );
        upload_id
    }

    /// Store a raw item, bypassing the API.
    pub fn seed_item(&self, collection: &str, item: &str, value: Value) {
        self.state()
            .items
            .insert((collection.to_string(), item.to_string()), value);
    }

    pub fn item(&self, collection: &str, item: &str) -> Option<Value> {
        self.state()
            .items
            .get(&(collection.to_string(), item.to_string()))
            .cloned()
    }

    pub fn asset(&self, key: &AssetKey) -> Option<Value> {
        self.state().assets.get(&key.to_string()).cloned()
    }

    /// Bytes of the last completed upload of `key`.
    pub fn object_bytes(&self, key: &AssetKey) -> Option<Vec<u8>> {
        self.state().objects.get(&key.to_string()).cloned()
    }

    /// Every session ever opened for `key`, oldest first.
    pub fn uploads(&self, key: &AssetKey) -> Vec<UploadSummary> {
        self.state()
            .uploads
            .iter()
            .filter(|(_, u)| u.key == *key)
            .map(|(id, u)| summary(id, u.status))
            .collect()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }
}

fn next_upload_id(state: &mut CatalogState) -> String {
    state.next_upload += 1;
    format!("upload-{:04}", state.next_upload)
}

fn summary(upload_id: &str, status: UploadStatus) -> UploadSummary {
    UploadSummary {
        upload_id: upload_id.to_string(),
        status: status.as_str().to_string(),
    }
}

fn parse_presigned(url: &str) -> Option<(String, u32)> {
    let rest = url.strip_prefix("memory://")?;
    let (upload_id, part) = rest.split_once('/')?;
    Some((upload_id.to_string(), part.parse().ok()?))
}

#[async_trait]
impl CatalogApi for InMemoryCatalog {
    async fn get_item(&self, collection: &str, item: &str) -> CatalogResult<Option<Value>> {
        let mut state = self.state();
        state.enter("get_item")?;
        Ok(state
            .items
            .get(&(collection.to_string(), item.to_string()))
            .cloned())
    }

    async fn put_item(
        &self,
        collection: &str,
        item: &str,
        payload: &ItemPayload,
    ) -> CatalogResult<()> {
        let mut state = self.state();
        state.enter("put_item")?;
        let value =
            serde_json::to_value(payload).map_err(|e| CatalogError::Decode(e.to_string()))?;
        state
            .items
            .insert((collection.to_string(), item.to_string()), value);
        Ok(())
    }

    async fn get_asset(&self, key: &AssetKey) -> CatalogResult<Option<Value>> {
        let mut state = self.state();
        state.enter("get_asset")?;
        Ok(state.assets.get(&key.to_string()).cloned())
    }

    async fn put_asset(&self, key: &AssetKey, payload: &AssetPayload) -> CatalogResult<()> {
        let mut state = self.state();
        state.enter("put_asset")?;
        if !state
            .items
            .contains_key(&(key.collection.clone(), key.item.clone()))
        {
            return Err(CatalogError::status(404, format!("no item for {key}")));
        }
        let value =
            serde_json::to_value(payload).map_err(|e| CatalogError::Decode(e.to_string()))?;
        state.assets.insert(key.to_string(), value);
        Ok(())
    }

    async fn create_upload(
        &self,
        key: &AssetKey,
        request: &CreateUploadRequest,
    ) -> CatalogResult<UploadSession> {
        let mut state = self.state();
        state.enter("create_upload")?;
        if let Some((open, _)) = state
            .uploads
            .iter()
            .find(|(_, u)| u.key == *key && u.status == UploadStatus::InProgress)
        {
            return Err(CatalogError::UploadInProgress(format!(
                "{UPLOAD_IN_PROGRESS_MARKER} ({open})"
            )));
        }
        if request.md5_parts.len() != request.number_parts as usize {
            return Err(CatalogError::status(400, "md5_parts does not match number_parts"));
        }

        let upload_id = next_upload_id(&mut state);
        let urls = (1..=request.number_parts)
            .map(|part| PresignedUrl {
                part,
                url: format!("memory://{upload_id}/{part}"),
            })
            .collect();
        state.uploads.insert(
            upload_id.clone(),
            UploadRecord {
                key: key.clone(),
                status: UploadStatus::InProgress,
                request: Some(request.clone()),
                parts: BTreeMap::new(),
            },
        );
        Ok(UploadSession {
            upload_id,
            status: UploadStatus::InProgress.as_str().to_string(),
            urls,
        })
    }

    async fn list_uploads(
        &self,
        key: &AssetKey,
        status: UploadStatus,
    ) -> CatalogResult<Vec<UploadSummary>> {
        let mut state = self.state();
        state.enter("list_uploads")?;
        Ok(state
            .uploads
            .iter()
            .filter(|(_, u)| u.key == *key && u.status == status)
            .map(|(id, u)| summary(id, u.status))
            .collect())
    }

    async fn upload_part(
        &self,
        url: &str,
        data: Vec<u8>,
        content_md5: &str,
    ) -> CatalogResult<String> {
        let mut state = self.state();
        state.enter("upload_part")?;
        let (upload_id, part) = parse_presigned(url)
            .ok_or_else(|| CatalogError::Url(format!("not a presigned URL: {url}")))?;
        if md5_base64(&data) != content_md5 {
            return Err(CatalogError::status(400, "BadDigest"));
        }

        let mut stored = data;
        if state.corrupt_parts.remove(&part) {
            if let Some(byte) = stored.first_mut() {
                *byte ^= 0xff;
            } else {
                stored.push(0);
            }
        }
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| CatalogError::status(404, format!("no upload {upload_id}")))?;
        if upload.status != UploadStatus::InProgress {
            return Err(CatalogError::status(409, format!("upload {upload_id} is {}", upload.status)));
        }
        upload.parts.insert(part, stored);
        Ok(format!("\"{content_md5}\""))
    }

    async fn complete_upload(
        &self,
        key: &AssetKey,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> CatalogResult<UploadSummary> {
        let mut state = self.state();
        state.enter("complete_upload")?;
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.key == *key)
            .cloned()
            .ok_or_else(|| CatalogError::status(404, format!("no upload {upload_id}")))?;
        if upload.status != UploadStatus::InProgress {
            return Err(CatalogError::status(409, format!("upload {upload_id} is {}", upload.status)));
        }
        let request = upload
            .request
            .as_ref()
            .ok_or_else(|| CatalogError::status(400, "upload has no checksums"))?;
        if parts.len() != request.number_parts as usize {
            return Err(CatalogError::status(400, "part count mismatch"));
        }

        let mut assembled = Vec::new();
        for expected in &request.md5_parts {
            let data = upload
                .parts
                .get(&expected.part_number)
                .ok_or_else(|| CatalogError::status(400, format!("part {} missing", expected.part_number)))?;
            if md5_base64(data) != expected.md5 {
                return Err(CatalogError::status(
                    400,
                    format!("checksum mismatch in part {}", expected.part_number),
                ));
            }
            assembled.extend_from_slice(data);
        }
        if sha256_multihash(&assembled) != request.multihash {
            return Err(CatalogError::status(400, "multihash mismatch"));
        }

        state.objects.insert(key.to_string(), assembled);
        if let Some(record) = state.uploads.get_mut(upload_id) {
            record.status = UploadStatus::Completed;
        }
        Ok(summary(upload_id, UploadStatus::Completed))
    }

    async fn abort_upload(&self, key: &AssetKey, upload_id: &str) -> CatalogResult<UploadSummary> {
        let mut state = self.state();
        state.enter("abort_upload")?;
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == *key)
            .ok_or_else(|| CatalogError::status(404, format!("no upload {upload_id}")))?;
        if upload.status == UploadStatus::InProgress {
            upload.status = UploadStatus::Aborted;
        }
        Ok(summary(upload_id, upload.status))
    }
}
