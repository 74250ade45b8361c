use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Display, Error, From};
use rusoto_core::{credential::StaticProvider, HttpClient, Region, RusotoError};
use rusoto_s3::{
    DeleteObjectError, DeleteObjectRequest, GetObjectError, GetObjectRequest, HeadObjectError,
    HeadObjectRequest, ListObjectsV2Error, ListObjectsV2Request, PutObjectError, PutObjectRequest, S3Client, S3,
};
use tracing::{info_span, Instrument};

use crate::configuration::StorageConfiguration;

/// An object read back from the blob store.
#[derive(Clone, PartialEq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("body_len_bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("e_tag", &self.e_tag)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlobSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), Error>;
    /// `Ok(None)` when no object is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Blob>, Error>;
    /// Checks for an object without reading its body.
    async fn exists(&self, key: &str) -> Result<bool, Error>;
    async fn delete(&self, key: &str) -> Result<(), Error>;
    async fn list(&self, prefix: &str) -> Result<Vec<BlobSummary>, Error>;
}

#[derive(Debug, Display, From, Error)]
pub enum Error {
    #[display(fmt = "Failed to create request dispatcher: {}", _0)]
    Dispatcher(rusoto_core::request::TlsError),
    #[display(fmt = "Put: {}", _0)]
    Put(RusotoError<PutObjectError>),
    #[display(fmt = "Get: {}", _0)]
    Get(RusotoError<GetObjectError>),
    #[display(fmt = "Head: {}", _0)]
    Head(RusotoError<HeadObjectError>),
    #[display(fmt = "Delete: {}", _0)]
    Delete(RusotoError<DeleteObjectError>),
    #[display(fmt = "List: {}", _0)]
    List(RusotoError<ListObjectsV2Error>),
    #[display(fmt = "Reading object body: {}", _0)]
    Body(std::io::Error),
}

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(config: &StorageConfiguration) -> Result<Self, Error> {
        let client = S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(
                config.access_key.expose().to_string(),
                config.secret_key.expose().to_string(),
            ),
            Region::Custom {
                name: config.region.clone(),
                endpoint: config.endpoint.as_str().trim_end_matches('/').to_string(),
            },
        );
        Ok(S3BlobStore {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[tracing::instrument(name = "Storing object.", level = "info", err, skip(self, bytes), fields(body_len_bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), Error> {
        self.client
            .put_object(PutObjectRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                content_type: Some(content_type.to_string()),
                body: Some(bytes.into()),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Fetching object from storage.", level = "info", err, skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Blob>, Error> {
        let response = self
            .client
            .get_object(GetObjectRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                ..Default::default()
            })
            .await;
        let response = match response {
            Ok(response) => response,
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => return Ok(None),
            // Some S3-compatible stores answer a bare 404 instead of NoSuchKey.
            Err(RusotoError::Unknown(ref raw)) if raw.status.as_u16() == 404 => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let body_len_bytes = response.content_length.unwrap_or(0);
        let body_len_bytes = usize::try_from(body_len_bytes).unwrap_or(0);
        let bytes = match response.body {
            Some(body) => {
                use tokio::io::AsyncReadExt;
                let mut out = Vec::with_capacity(body_len_bytes);
                body.into_async_read()
                    .read_to_end(&mut out)
                    .instrument(info_span!("Reading object body."))
                    .await?;
                out
            }
            None => Vec::with_capacity(0),
        };
        Ok(Some(Blob {
            bytes,
            content_type: response.content_type,
            e_tag: response.e_tag,
        }))
    }

    #[tracing::instrument(name = "Checking object in storage.", level = "info", err, skip(self))]
    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let response = self
            .client
            .head_object(HeadObjectRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                ..Default::default()
            })
            .await;
        match response {
            Ok(_) => Ok(true),
            Err(RusotoError::Service(HeadObjectError::NoSuchKey(_))) => Ok(false),
            // HEAD has no body to carry an error code, so a miss is usually a bare 404.
            Err(RusotoError::Unknown(ref raw)) if raw.status.as_u16() == 404 => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(name = "Deleting object from storage.", level = "info", err, skip(self))]
    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.client
            .delete_object(DeleteObjectRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    #[tracing::instrument(name = "Listing objects in storage.", level = "info", err, skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<BlobSummary>, Error> {
        let mut out = Vec::new();
        let mut continuation_token = None;
        loop {
            let page = self
                .client
                .list_objects_v2(ListObjectsV2Request {
                    bucket: self.bucket.clone(),
                    prefix: Some(prefix.to_string()),
                    continuation_token: continuation_token.take(),
                    ..Default::default()
                })
                .await?;
            for object in page.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    out.push(BlobSummary {
                        key,
                        size: object.size.unwrap_or(0),
                        last_modified: object
                            .last_modified
                            .and_then(|x| DateTime::parse_from_rfc3339(&x).ok())
                            .map(|x| x.with_timezone(&Utc)),
                    });
                }
            }
            match page.next_continuation_token {
                Some(token) if page.is_truncated.unwrap_or(false) => continuation_token = Some(token),
                _ => break,
            }
        }
        Ok(out)
    }
}
