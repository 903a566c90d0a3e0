//! S3 and S3-compatible (R2, MinIO) provider
//!
//! Requests are signed with AWS Signature Version 4 and use path-style URLs
//! (`<endpoint>/<bucket>/<key>`) so custom endpoints work without DNS setup.
//! Artifacts live at `<directory>/<name>.zip`.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::{Client, Method, Response, StatusCode};
use rnef_core::S3Config;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{RemoteCacheError, RemoteResult};
use crate::progress::ProgressReporter;

use super::{
    archive, blocking, download_zip, http_client, DownloadedArtifact, RemoteArtifact,
    RemoteBuildCache, RepoDetails, UploadSource,
};

type HmacSha256 = Hmac<Sha256>;

const CREATED_AT_HEADER: &str = "x-amz-meta-createdat";

/// Build cache stored in an S3 bucket
pub struct S3Cache {
    config: S3Config,
    access_key_id: String,
    secret_access_key: String,
    endpoint: Url,
    client: Client,
}

impl S3Cache {
    /// Create a provider; credentials fall back to `AWS_ACCESS_KEY_ID` and
    /// `AWS_SECRET_ACCESS_KEY`
    pub fn new(config: S3Config) -> RemoteResult<Self> {
        if config.bucket.trim().is_empty() {
            return Err(RemoteCacheError::Configuration("S3 bucket is required".into()));
        }
        if config.region.trim().is_empty() {
            return Err(RemoteCacheError::Configuration("S3 region is required".into()));
        }

        let access_key_id = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .ok_or_else(|| {
                RemoteCacheError::Configuration(
                    "S3 access key missing; set access_key_id or AWS_ACCESS_KEY_ID".into(),
                )
            })?;
        let secret_access_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .ok_or_else(|| {
                RemoteCacheError::Configuration(
                    "S3 secret key missing; set secret_access_key or AWS_SECRET_ACCESS_KEY".into(),
                )
            })?;

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            RemoteCacheError::Configuration(format!("invalid S3 endpoint {}: {}", endpoint, e))
        })?;

        Ok(Self {
            config,
            access_key_id,
            secret_access_key,
            endpoint,
            client: http_client()?,
        })
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Key prefix shared by every artifact, with a trailing `/`
    fn prefix(&self) -> String {
        let directory = self.config.directory.trim_matches('/');
        if directory.is_empty() {
            String::new()
        } else {
            format!("{}/", directory)
        }
    }

    fn key(&self, artifact_name: &str) -> String {
        format!("{}{}.zip", self.prefix(), artifact_name)
    }

    fn name_from_key(&self, key: &str) -> Option<String> {
        key.strip_prefix(&self.prefix())?
            .strip_suffix(".zip")
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(str::to_string)
    }

    /// Encoded path of the bucket, or of a key inside it
    fn canonical_path(&self, key: Option<&str>) -> String {
        let mut path = self.endpoint.path().trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(&uri_encode(&self.config.bucket, true));
        if let Some(key) = key {
            path.push('/');
            path.push_str(&uri_encode(key, false));
        }
        path
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            self.host(),
            self.canonical_path(Some(key))
        )
    }

    /// Send a signed request
    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(&str, String)],
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> RemoteResult<Response> {
        let path = self.canonical_path(key);
        let query = canonical_query(query);
        let payload_hash = hex_sha256(&body);
        let now = Utc::now();

        let request = SigningRequest {
            method: method.as_str(),
            host: &self.host(),
            path: &path,
            query: &query,
            headers,
            payload_hash: &payload_hash,
            timestamp: now,
        };
        let authorization = sign(
            &request,
            &self.access_key_id,
            &self.secret_access_key,
            &self.config.region,
        )?;

        let mut url = format!("{}://{}{}", self.endpoint.scheme(), self.host(), path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let mut builder = self
            .client
            .request(method, &url)
            .header("Authorization", authorization)
            .header("x-amz-date", amz_date(now))
            .header("x-amz-content-sha256", payload_hash);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        debug!(url = %url, status = response.status().as_u16(), "S3 request");
        Ok(response)
    }

    async fn check(&self, response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteCacheError::Unauthorized {
                provider: self.config.name.clone(),
                remediation: "Check access_key_id and secret_access_key (or AWS_ACCESS_KEY_ID and \
                              AWS_SECRET_ACCESS_KEY) and the bucket policy."
                    .to_string(),
            }),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
                Err(RemoteCacheError::RateLimited { retry_after: None })
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(RemoteCacheError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Metadata of one object, `None` when it does not exist
    async fn head(&self, artifact_name: &str) -> RemoteResult<Option<RemoteArtifact>> {
        let key = self.key(artifact_name);
        let response = self.send(Method::HEAD, Some(&key), &[], &[], Vec::new()).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = self.check(response).await?;

        let headers = response.headers();
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let created_at = header(CREATED_AT_HEADER)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .or_else(|| header("last-modified").and_then(|v| DateTime::parse_from_rfc2822(v).ok()))
            .map(|d| d.with_timezone(&Utc));

        Ok(Some(RemoteArtifact {
            name: artifact_name.to_string(),
            url: self.object_url(&key),
            id: None,
            size: header("content-length").and_then(|v| v.parse().ok()),
            created_at,
        }))
    }

    /// Every artifact under the prefix, following continuation tokens
    async fn list_all(&self) -> RemoteResult<Vec<RemoteArtifact>> {
        let mut artifacts = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![("list-type", "2".to_string()), ("prefix", self.prefix())];
            if let Some(token) = &continuation {
                query.push(("continuation-token", token.clone()));
            }

            let response = self.send(Method::GET, None, &query, &[], Vec::new()).await?;
            let xml = self.check(response).await?.text().await?;
            let page = parse_list_objects(&xml);

            for object in page.objects {
                if let Some(name) = self.name_from_key(&object.key) {
                    artifacts.push(RemoteArtifact {
                        name,
                        url: self.object_url(&object.key),
                        id: None,
                        size: Some(object.size),
                        created_at: object.last_modified,
                    });
                }
            }

            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation = Some(token),
                _ => break,
            }
        }

        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(artifacts)
    }
}

#[async_trait]
impl RemoteBuildCache for S3Cache {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn detect_repo_details(&self) -> RemoteResult<Option<RepoDetails>> {
        Ok(Some(RepoDetails {
            provider: self.config.name.clone(),
            location: format!("{}/{}", self.config.bucket, self.prefix().trim_end_matches('/')),
            url: format!(
                "{}://{}{}",
                self.endpoint.scheme(),
                self.host(),
                self.canonical_path(None)
            ),
        }))
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn list(&self, artifact_name: Option<&str>) -> RemoteResult<Vec<RemoteArtifact>> {
        match artifact_name {
            Some(name) => Ok(self.head(name).await?.into_iter().collect()),
            None => self.list_all().await,
        }
    }

    #[instrument(skip(self, dest, progress), fields(artifact = %artifact.name))]
    async fn download(
        &self,
        artifact: &RemoteArtifact,
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> RemoteResult<DownloadedArtifact> {
        progress.message(&format!("Downloading {} from {}", artifact.name, self.config.name));
        let key = self.key(&artifact.name);
        let response = self.send(Method::GET, Some(&key), &[], &[], Vec::new()).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteCacheError::NotFound(artifact.name.clone()));
        }
        let response = self.check(response).await?;
        let downloaded = download_zip(response, &artifact.name, dest, progress).await?;

        info!(artifact = %artifact.name, provider = %self.config.name, "downloaded artifact");
        Ok(downloaded)
    }

    #[instrument(skip(self, source), fields(bucket = %self.config.bucket))]
    async fn upload(&self, artifact_name: &str, source: UploadSource) -> RemoteResult<RemoteArtifact> {
        let body = match source {
            UploadSource::Buffer(bytes) => bytes,
            UploadSource::Path(path) => blocking(move || archive::zip_path(&path)).await?,
        };
        let size = body.len() as u64;
        let created_at = Utc::now();
        let key = self.key(artifact_name);

        let headers = [
            ("content-type", "application/zip".to_string()),
            (CREATED_AT_HEADER, created_at.to_rfc3339()),
        ];
        let response = self.send(Method::PUT, Some(&key), &[], &headers, body).await?;
        self.check(response).await?;

        info!(artifact = artifact_name, size, "uploaded artifact");
        Ok(RemoteArtifact {
            name: artifact_name.to_string(),
            url: self.object_url(&key),
            id: None,
            size: Some(size),
            created_at: Some(created_at),
        })
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn delete(
        &self,
        artifact_name: &str,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<RemoteArtifact>> {
        let matches = self.list(Some(artifact_name)).await?;
        let mut deleted = Vec::new();
        for artifact in matches.into_iter().take(limit.unwrap_or(usize::MAX)) {
            let key = self.key(&artifact.name);
            let response = self.send(Method::DELETE, Some(&key), &[], &[], Vec::new()).await?;
            self.check(response).await?;
            deleted.push(artifact);
        }
        info!(name = artifact_name, count = deleted.len(), "deleted S3 artifacts");
        Ok(deleted)
    }
}

struct SigningRequest<'a> {
    method: &'a str,
    host: &'a str,
    /// Already URI-encoded
    path: &'a str,
    /// Already canonical
    query: &'a str,
    /// Extra headers to sign, besides host, date and content hash
    headers: &'a [(&'a str, String)],
    payload_hash: &'a str,
    timestamp: DateTime<Utc>,
}

/// Authorization header value for a request
fn sign(
    request: &SigningRequest<'_>,
    access_key_id: &str,
    secret_access_key: &str,
    region: &str,
) -> RemoteResult<String> {
    let date = request.timestamp.format("%Y%m%d").to_string();
    let timestamp = amz_date(request.timestamp);

    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), request.host.to_string()),
        ("x-amz-content-sha256".to_string(), request.payload_hash.to_string()),
        ("x-amz-date".to_string(), timestamp.clone()),
    ];
    headers.extend(
        request
            .headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.trim().to_string())),
    );
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        if request.path.is_empty() { "/" } else { request.path },
        request.query,
        canonical_headers,
        signed_headers,
        request.payload_hash
    );

    let scope = format!("{}/{}/s3/aws4_request", date, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        timestamp,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let mut key = hmac_sha256(format!("AWS4{}", secret_access_key).as_bytes(), date.as_bytes())?;
    for part in [region, "s3", "aws4_request"] {
        key = hmac_sha256(&key, part.as_bytes())?;
    }
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
        access_key_id, scope, signed_headers, signature
    ))
}

fn amz_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> RemoteResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| RemoteCacheError::Configuration(format!("invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// RFC 3986 encoding as SigV4 expects; `/` is kept unless `encode_slash`
fn uri_encode(value: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Query string with encoded pairs sorted by name
fn canonical_query(pairs: &[(&str, String)]) -> String {
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Default)]
struct ListObjectsPage {
    objects: Vec<ListedObject>,
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug)]
struct ListedObject {
    key: String,
    size: u64,
    last_modified: Option<DateTime<Utc>>,
}

/// Pull the fields we need out of a `ListObjectsV2` response
fn parse_list_objects(xml: &str) -> ListObjectsPage {
    let element = |name: &str| Regex::new(&format!(r"(?s)<{0}>(.*?)</{0}>", name)).ok();
    let first = |re: &Option<Regex>, text: &str| -> Option<String> {
        re.as_ref()?
            .captures(text)
            .map(|c| xml_unescape(c[1].trim()))
    };

    let contents = element("Contents");
    let key = element("Key");
    let size = element("Size");
    let last_modified = element("LastModified");
    let truncated = element("IsTruncated");
    let token = element("NextContinuationToken");

    let mut page = ListObjectsPage {
        is_truncated: first(&truncated, xml).is_some_and(|v| v == "true"),
        next_continuation_token: first(&token, xml),
        ..Default::default()
    };

    if let Some(contents) = &contents {
        for block in contents.captures_iter(xml) {
            let block = &block[1];
            let Some(key) = first(&key, block) else {
                continue;
            };
            page.objects.push(ListedObject {
                key,
                size: first(&size, block).and_then(|s| s.parse().ok()).unwrap_or(0),
                last_modified: first(&last_modified, block)
                    .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                    .map(|d| d.with_timezone(&Utc)),
            });
        }
    }
    page
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
