//! Publishing the finished video.
//!
//! A [`Publisher`] takes the local video and a destination name (by default
//! `videos/pdf_movie_YYYYMMDD_HHMMSS.mp4`) and returns a reference the user
//! can follow: a URL for the Hugging Face dataset backend, a filesystem path
//! for the local one.

use crate::config::Credentials;
use crate::error::MovieError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Hugging Face Hub root.
pub const HF_HUB_URL: &str = "https://huggingface.co";

/// Destination name for a video published at `now`.
pub fn destination_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("videos/pdf_movie_{}.mp4", now.format("%Y%m%d_%H%M%S"))
}

/// Where finished videos go.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Human-readable description of the backend, for logs and summaries.
    fn describe(&self) -> String;

    /// Publish `video` under `destination`; returns the published reference.
    async fn publish(&self, video: &Path, destination: &str) -> Result<String, MovieError>;
}

/// Copies videos into a local directory.
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    dir: PathBuf,
}

impl LocalPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }

    async fn publish(&self, video: &Path, destination: &str) -> Result<String, MovieError> {
        let target = self.dir.join(destination);
        let write_err = |source: std::io::Error| MovieError::OutputWriteFailed {
            path: target.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::copy(video, &target).await.map_err(write_err)?;

        info!("Published {} → {}", video.display(), target.display());
        Ok(target.display().to_string())
    }
}

/// Media type of Git LFS batch API requests and responses.
const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Bytes of content the preupload check gets to sniff.
const SAMPLE_BYTES: usize = 512;

/// Uploads videos into a Hugging Face dataset repository.
///
/// Follows the Hub's commit protocol: a preupload call decides whether the
/// file goes through LFS (videos always do in practice) or inline; LFS
/// content is PUT to the storage URL from the LFS batch API and the commit
/// then only references it by sha256.
pub struct HfDatasetPublisher {
    client: reqwest::Client,
    token: String,
    repo_id: String,
    hub_url: String,
}

impl HfDatasetPublisher {
    pub fn new(token: impl Into<String>, repo_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            repo_id: repo_id.into(),
            hub_url: HF_HUB_URL.to_string(),
        }
    }

    /// Build from credentials; both the token and the repository are required.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, MovieError> {
        let token = credentials
            .hf_token
            .as_deref()
            .ok_or_else(|| MovieError::MissingCredential {
                name: "HF_TOKEN".into(),
                hint: "Pass --hf-token or export HF_TOKEN, or use --publish-dir.".into(),
            })?;
        let repo = credentials
            .hf_repo_id
            .as_deref()
            .ok_or_else(|| MovieError::MissingCredential {
                name: "HF_REPO_ID".into(),
                hint: "Pass --hf-repo or export HF_REPO_ID, or use --publish-dir.".into(),
            })?;
        Ok(Self::new(token, repo))
    }

    /// Point at a different Hub (mirrors, test servers).
    pub fn with_hub_url(mut self, url: impl Into<String>) -> Self {
        self.hub_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Public URL of `destination` once committed.
    pub fn file_url(&self, destination: &str) -> String {
        format!(
            "{}/datasets/{}/blob/main/{}",
            self.hub_url, self.repo_id, destination
        )
    }

    fn api_url(&self, action: &str) -> String {
        format!("{}/api/datasets/{}/{}/main", self.hub_url, self.repo_id, action)
    }

    fn lfs_batch_url(&self) -> String {
        format!(
            "{}/datasets/{}.git/info/lfs/objects/batch",
            self.hub_url, self.repo_id
        )
    }

    fn fail(&self, detail: String) -> MovieError {
        MovieError::PublishFailed {
            destination: self.repo_id.clone(),
            detail,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, step: &str) -> Result<reqwest::Response, MovieError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.fail(format!("{step}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.fail(format!("{step}: HTTP {status}: {}", body.trim())))
    }

    async fn preupload(&self, destination: &str, info: &UploadInfo) -> Result<UploadMode, MovieError> {
        let request = self
            .client
            .post(self.api_url("preupload"))
            .bearer_auth(&self.token)
            .json(&preupload_body(destination, info));
        let answer: PreuploadResponse = self
            .send(request, "preupload")
            .await?
            .json()
            .await
            .map_err(|e| self.fail(format!("preupload: {e}")))?;

        answer
            .files
            .into_iter()
            .find(|f| f.path == destination)
            .map(|f| f.upload_mode)
            .ok_or_else(|| self.fail(format!("preupload: no answer for {destination}")))
    }

    async fn upload_lfs(&self, content: Vec<u8>, info: &UploadInfo) -> Result<(), MovieError> {
        let request = self
            .client
            .post(self.lfs_batch_url())
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, LFS_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_MEDIA_TYPE)
            .body(lfs_batch_body(info).to_string());
        let batch: BatchResponse = self
            .send(request, "LFS batch")
            .await?
            .json()
            .await
            .map_err(|e| self.fail(format!("LFS batch: {e}")))?;

        let object = batch
            .objects
            .into_iter()
            .find(|o| o.oid == info.sha256)
            .ok_or_else(|| self.fail(format!("LFS batch: no answer for {}", info.sha256)))?;
        if let Some(error) = object.error {
            return Err(self.fail(format!("LFS batch: {} {}", error.code, error.message)));
        }
        let Some(actions) = object.actions else {
            debug!("LFS object {} is already stored", info.sha256);
            return Ok(());
        };

        if let Some(upload) = actions.upload {
            let mut request = self.client.put(&upload.href).body(content);
            for (name, value) in &upload.header {
                request = request.header(name.as_str(), value.as_str());
            }
            self.send(request, "LFS upload").await?;
            debug!("Uploaded LFS object {} ({} bytes)", info.sha256, info.size);
        }
        if let Some(verify) = actions.verify {
            let mut request = self
                .client
                .post(&verify.href)
                .bearer_auth(&self.token)
                .json(&json!({ "oid": info.sha256, "size": info.size }));
            for (name, value) in &verify.header {
                request = request.header(name.as_str(), value.as_str());
            }
            self.send(request, "LFS verify").await?;
        }
        Ok(())
    }
}

/// Size, sha256 and leading sample of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub size: u64,
    /// Lowercase hex sha256, the LFS object id.
    pub sha256: String,
    /// Base64 of the first 512 bytes.
    pub sample: String,
}

impl UploadInfo {
    pub fn of(content: &[u8]) -> Self {
        Self {
            size: content.len() as u64,
            sha256: format!("{:x}", Sha256::digest(content)),
            sample: STANDARD.encode(&content[..content.len().min(SAMPLE_BYTES)]),
        }
    }
}

/// How the Hub wants a file delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Lfs,
    Regular,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    objects: Vec<BatchObject>,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    oid: String,
    actions: Option<BatchActions>,
    error: Option<BatchError>,
}

#[derive(Debug, Deserialize)]
struct BatchActions {
    upload: Option<BatchAction>,
    verify: Option<BatchAction>,
}

#[derive(Debug, Deserialize)]
struct BatchAction {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct BatchError {
    code: i64,
    message: String,
}

/// Body of the preupload check for one file.
pub fn preupload_body(destination: &str, info: &UploadInfo) -> Value {
    json!({ "files": [{ "path": destination, "size": info.size, "sample": info.sample }] })
}

/// Body of an LFS batch upload request for one object, basic transfer only.
pub fn lfs_batch_body(info: &UploadInfo) -> Value {
    json!({
        "operation": "upload",
        "transfers": ["basic"],
        "hash_algo": "sha256",
        "objects": [{ "oid": info.sha256, "size": info.size }],
    })
}

fn commit_header(destination: &str) -> Value {
    json!({
        "key": "header",
        "value": { "summary": format!("Upload {destination}"), "description": "" }
    })
}

/// NDJSON body of a single-file commit carrying the content inline.
pub fn commit_payload(destination: &str, content: &[u8]) -> String {
    let file = json!({
        "key": "file",
        "value": { "path": destination, "encoding": "base64", "content": STANDARD.encode(content) }
    });
    format!("{}\n{file}\n", commit_header(destination))
}

/// NDJSON body of a single-file commit referencing an uploaded LFS object.
pub fn lfs_commit_payload(destination: &str, info: &UploadInfo) -> String {
    let file = json!({
        "key": "lfsFile",
        "value": { "path": destination, "algo": "sha256", "oid": info.sha256, "size": info.size }
    });
    format!("{}\n{file}\n", commit_header(destination))
}

#[async_trait]
impl Publisher for HfDatasetPublisher {
    fn describe(&self) -> String {
        format!("dataset {}", self.repo_id)
    }

    async fn publish(&self, video: &Path, destination: &str) -> Result<String, MovieError> {
        let content = tokio::fs::read(video)
            .await
            .map_err(|e| self.fail(format!("reading {}: {e}", video.display())))?;
        let info = UploadInfo::of(&content);

        let mode = self.preupload(destination, &info).await?;
        info!(
            "Uploading {} ({} bytes, {:?}) to {}",
            destination, info.size, mode, self.repo_id
        );
        let payload = match mode {
            UploadMode::Regular => commit_payload(destination, &content),
            UploadMode::Lfs => {
                self.upload_lfs(content, &info).await?;
                lfs_commit_payload(destination, &info)
            }
        };

        let request = self
            .client
            .post(self.api_url("commit"))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload);
        self.send(request, "commit").await?;

        let url = self.file_url(destination);
        info!("Published {}", url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_stub::{Reply, StubServer};
    use chrono::Utc;
    use std::io::Write;

    #[test]
    fn destination_uses_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(destination_name(&at), "videos/pdf_movie_20250309_070501.mp4");
    }

    #[test]
    fn payload_is_two_json_lines() {
        let payload = commit_payload("videos/x.mp4", b"abc");
        let lines: Vec<serde_json::Value> = payload
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["key"], "header");
        assert_eq!(lines[1]["value"]["path"], "videos/x.mp4");
        assert_eq!(lines[1]["value"]["content"], "YWJj");
    }

    #[test]
    fn file_url_points_at_dataset_blob() {
        let p = HfDatasetPublisher::new("hf_x", "me/movies");
        assert_eq!(
            p.file_url("videos/a.mp4"),
            "https://huggingface.co/datasets/me/movies/blob/main/videos/a.mp4"
        );
    }

    #[test]
    fn missing_hf_credentials_are_reported_by_name() {
        let err = HfDatasetPublisher::from_credentials(&Credentials {
            hf_token: Some("hf_x".into()),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("HF_REPO_ID"));
    }

    #[test]
    fn upload_info_hashes_and_samples() {
        let info = UploadInfo::of(b"abc");
        assert_eq!(info.size, 3);
        assert_eq!(
            info.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(info.sample, "YWJj");

        let long = UploadInfo::of(&[7u8; 2000]);
        assert_eq!(STANDARD.decode(long.sample).unwrap().len(), 512);
    }

    #[test]
    fn lfs_commit_references_the_object() {
        let info = UploadInfo::of(b"video bytes");
        let payload = lfs_commit_payload("videos/x.mp4", &info);
        let lines: Vec<serde_json::Value> = payload
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["key"], "lfsFile");
        assert_eq!(lines[1]["value"]["oid"], info.sha256.as_str());
        assert_eq!(lines[1]["value"]["size"], 11);
        assert!(!payload.contains("base64"));
    }

    #[test]
    fn batch_body_asks_for_basic_upload() {
        let info = UploadInfo::of(b"x");
        let body = lfs_batch_body(&info);
        assert_eq!(body["operation"], "upload");
        assert_eq!(body["transfers"], json!(["basic"]));
        assert_eq!(body["objects"][0]["oid"], info.sha256.as_str());
    }

    fn video_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut video = tempfile::NamedTempFile::new().unwrap();
        video.write_all(content).unwrap();
        video
    }

    #[tokio::test]
    async fn large_video_goes_through_lfs_before_the_commit() {
        let content = vec![42u8; 64 * 1024];
        let oid = UploadInfo::of(&content).sha256;
        let expected_oid = oid.clone();
        let server = StubServer::start(move |req, base| match req.path.as_str() {
            "/api/datasets/me/movies/preupload/main" => Reply::json(
                200,
                json!({ "files": [{ "path": "videos/a.mp4", "uploadMode": "lfs" }] }),
            ),
            "/datasets/me/movies.git/info/lfs/objects/batch" => Reply::json(
                200,
                json!({ "objects": [{
                    "oid": oid,
                    "size": 65536,
                    "actions": {
                        "upload": { "href": format!("{base}/storage/{oid}"), "header": { "x-amz-meta-sig": "s1" } },
                        "verify": { "href": format!("{base}/lfs/verify") }
                    }
                }] }),
            ),
            "/api/datasets/me/movies/commit/main" => {
                Reply::json(200, json!({ "commitUrl": format!("{base}/c/1") }))
            }
            _ => Reply::empty(200),
        })
        .await;

        let publisher = HfDatasetPublisher::new("hf_secret", "me/movies").with_hub_url(&server.base_url);
        let video = video_file(&content);
        let url = publisher.publish(video.path(), "videos/a.mp4").await.unwrap();
        assert_eq!(url, format!("{}/datasets/me/movies/blob/main/videos/a.mp4", server.base_url));

        let requests = server.requests();
        let steps: Vec<(&str, &str)> = requests
            .iter()
            .map(|r| (r.method.as_str(), r.path.as_str()))
            .collect();
        let storage = format!("/storage/{expected_oid}");
        assert_eq!(
            steps,
            vec![
                ("POST", "/api/datasets/me/movies/preupload/main"),
                ("POST", "/datasets/me/movies.git/info/lfs/objects/batch"),
                ("PUT", storage.as_str()),
                ("POST", "/lfs/verify"),
                ("POST", "/api/datasets/me/movies/commit/main"),
            ]
        );

        assert_eq!(requests[0].header("authorization"), Some("Bearer hf_secret"));
        assert_eq!(requests[0].json()["files"][0]["size"], 65536);
        assert_eq!(requests[1].header("accept"), Some(LFS_MEDIA_TYPE));

        // Storage gets the raw bytes and its own headers, not the Hub token.
        assert_eq!(requests[2].body, content);
        assert_eq!(requests[2].header("x-amz-meta-sig"), Some("s1"));
        assert_eq!(requests[2].header("authorization"), None);

        assert_eq!(requests[3].json()["oid"], expected_oid.as_str());

        let commit = String::from_utf8(requests[4].body.clone()).unwrap();
        let file: serde_json::Value = serde_json::from_str(commit.lines().nth(1).unwrap()).unwrap();
        assert_eq!(file["key"], "lfsFile");
        assert_eq!(file["value"]["oid"], expected_oid.as_str());
    }

    #[tokio::test]
    async fn regular_mode_commits_inline() {
        let server = StubServer::start(|req, _| match req.path.as_str() {
            "/api/datasets/me/movies/preupload/main" => Reply::json(
                200,
                json!({ "files": [{ "path": "videos/a.mp4", "uploadMode": "regular" }] }),
            ),
            _ => Reply::json(200, json!({})),
        })
        .await;

        let publisher = HfDatasetPublisher::new("hf_x", "me/movies").with_hub_url(&server.base_url);
        let video = video_file(b"tiny");
        publisher.publish(video.path(), "videos/a.mp4").await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].path.ends_with("/commit/main"));
        let commit = String::from_utf8(requests[1].body.clone()).unwrap();
        assert!(commit.contains(r#""encoding":"base64""#));
        assert!(commit.contains(&STANDARD.encode(b"tiny")));
    }

    #[tokio::test]
    async fn rejected_commit_is_a_publish_failure() {
        let server = StubServer::start(|req, _| match req.path.as_str() {
            "/api/datasets/me/movies/preupload/main" => Reply::json(
                200,
                json!({ "files": [{ "path": "videos/a.mp4", "uploadMode": "regular" }] }),
            ),
            _ => Reply::json(403, json!({ "error": "You don't have the rights" })),
        })
        .await;

        let publisher = HfDatasetPublisher::new("hf_x", "me/movies").with_hub_url(&server.base_url);
        let video = video_file(b"tiny");
        let err = publisher.publish(video.path(), "videos/a.mp4").await.unwrap_err();
        match err {
            MovieError::PublishFailed { destination, detail } => {
                assert_eq!(destination, "me/movies");
                assert!(detail.starts_with("commit: HTTP 403"), "{detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_publisher_copies_into_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let video = video_file(b"fake mp4");

        let publisher = LocalPublisher::new(dir.path());
        let reference = publisher
            .publish(video.path(), "videos/pdf_movie_1.mp4")
            .await
            .unwrap();

        let target = dir.path().join("videos/pdf_movie_1.mp4");
        assert_eq!(reference, target.display().to_string());
        assert_eq!(std::fs::read(target).unwrap(), b"fake mp4");
    }
}
