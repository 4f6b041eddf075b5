//! Multipart asset upload with checksums.
//!
//! ```text
//! plan (md5 per part, sha2-256 multihash)
//!   -> create session (409 in progress: abort stale sessions when forced)
//!   -> PUT parts to presigned URLs with Content-MD5, keep ETags
//!   -> complete
//! ```
//!
//! Once a session exists, every failure path (including cancellation)
//! aborts it before the error is returned.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::api::{AssetKey, CatalogApi, CompletedPart, UploadSession, UploadStatus, UploadSummary};
use crate::cancel::CancellationToken;
use crate::checksum::{PartChecksum, UploadPlan};
use crate::error::{CatalogError, PublishError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub part_size: u64,
    pub update_interval_secs: u64,
    /// Abort a conflicting in-progress session instead of failing
    pub force: bool,
    /// `false` sends the file as a single part
    pub multipart: bool,
}

pub struct Uploader<'a> {
    api: &'a dyn CatalogApi,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> Uploader<'a> {
    pub fn new(api: &'a dyn CatalogApi, retry: &'a RetryPolicy, cancel: &'a CancellationToken) -> Self {
        Self { api, retry, cancel }
    }

    pub async fn upload(
        &self,
        key: &AssetKey,
        path: &Path,
        options: &UploadOptions,
    ) -> Result<UploadSummary> {
        self.cancel.check()?;
        let plan = plan_file(path, options).await?;
        debug!(
            asset = %key,
            parts = plan.part_count(),
            part_size = plan.part_size,
            "Planned upload of {} bytes",
            plan.file_size
        );

        let request = plan.create_request(options.update_interval_secs);
        let session = self.create_session(key, &request, options.force).await?;
        info!(asset = %key, upload_id = %session.upload_id, "Upload session created");

        match self.transfer_and_complete(key, path, &plan, &session).await {
            Ok(summary) => {
                info!(asset = %key, upload_id = %summary.upload_id, "Upload completed");
                Ok(summary)
            }
            Err(err) => {
                self.abort_quietly(key, &session.upload_id).await;
                Err(err)
            }
        }
    }

    async fn create_session(
        &self,
        key: &AssetKey,
        request: &crate::api::CreateUploadRequest,
        force: bool,
    ) -> Result<UploadSession> {
        let attempt = self
            .retry
            .run("create_upload", || self.api.create_upload(key, request))
            .await;

        let detail = match attempt {
            Err(CatalogError::UploadInProgress(detail)) => detail,
            other => return other.map_err(PublishError::from),
        };
        if !force {
            return Err(PublishError::UploadInProgress {
                asset: key.to_string(),
                detail,
            });
        }

        let aborted = self.abort_in_progress(key).await?;
        warn!(asset = %key, aborted, "Force-aborted in-progress uploads");

        self.retry
            .run("create_upload", || self.api.create_upload(key, request))
            .await
            .map_err(|err| match err {
                CatalogError::UploadInProgress(detail) => PublishError::UploadInProgress {
                    asset: key.to_string(),
                    detail,
                },
                other => PublishError::Catalog(other),
            })
    }

    /// Abort every in-progress session of `key`. Returns how many.
    pub async fn abort_in_progress(&self, key: &AssetKey) -> Result<usize> {
        let open = self
            .retry
            .run("list_uploads", || {
                self.api.list_uploads(key, UploadStatus::InProgress)
            })
            .await?;
        for upload in &open {
            self.retry
                .run("abort_upload", || self.api.abort_upload(key, &upload.upload_id))
                .await?;
        }
        Ok(open.len())
    }

    async fn transfer_and_complete(
        &self,
        key: &AssetKey,
        path: &Path,
        plan: &UploadPlan,
        session: &UploadSession,
    ) -> Result<UploadSummary> {
        let mut completed = Vec::with_capacity(plan.parts.len());
        for part in &plan.parts {
            self.cancel.check()?;
            let url = session.url_for(part.part_number).ok_or_else(|| {
                PublishError::integrity(format!(
                    "no presigned URL for part {} of {}",
                    part.part_number, key
                ))
            })?;

            let data = read_part(path, part).await?;
            if !plan.verify_part(part.part_number, &data) {
                return Err(PublishError::integrity(format!(
                    "{} changed on disk while uploading part {}",
                    path.display(),
                    part.part_number
                )));
            }

            let etag = self
                .retry
                .run("upload_part", || {
                    self.api.upload_part(url, data.clone(), &part.md5)
                })
                .await?;
            debug!(asset = %key, part = part.part_number, "Part uploaded");
            completed.push(CompletedPart {
                etag,
                part_number: part.part_number,
            });
        }

        self.cancel.check()?;
        let summary = self
            .retry
            .run("complete_upload", || {
                self.api.complete_upload(key, &session.upload_id, &completed)
            })
            .await?;
        if summary.status() != Some(UploadStatus::Completed) {
            return Err(PublishError::integrity(format!(
                "upload {} of {} ended as '{}'",
                session.upload_id, key, summary.status
            )));
        }
        Ok(summary)
    }

    async fn abort_quietly(&self, key: &AssetKey, upload_id: &str) {
        match self
            .retry
            .run("abort_upload", || self.api.abort_upload(key, upload_id))
            .await
        {
            Ok(_) => info!(asset = %key, upload_id, "Upload session aborted"),
            Err(err) => warn!(asset = %key, upload_id, "Failed to abort upload session: {}", err),
        }
    }
}

async fn plan_file(path: &Path, options: &UploadOptions) -> Result<UploadPlan> {
    let owned: PathBuf = path.to_path_buf();
    let part_size = options.part_size;
    let multipart = options.multipart;
    tokio::task::spawn_blocking(move || UploadPlan::from_file(&owned, part_size, multipart))
        .await
        .map_err(|e| PublishError::io(path, std::io::Error::other(e)))?
        .map_err(|e| PublishError::io(path, e))
}

async fn read_part(path: &Path, part: &PartChecksum) -> Result<Vec<u8>> {
    let owned: PathBuf = path.to_path_buf();
    let part = part.clone();
    tokio::task::spawn_blocking(move || UploadPlan::read_part(&owned, &part))
        .await
        .map_err(|e| PublishError::io(path, std::io::Error::other(e)))?
        .map_err(|e| PublishError::io(path, e))
}
