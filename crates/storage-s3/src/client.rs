//! AWS SDK S3 connector implementation.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client as S3Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use rusty_cloudpath_storage::{
    ListEntry, ListStream, ListingBuilder, ObjectLocation, ObjectMetadata, PathKind,
    StorageBackend, StorageError,
};

use crate::error::S3Error;
use crate::settings::StorageSettings;

/// StorageBackend implementation using the AWS SDK for Rust.
///
/// Retries, connection pooling and streaming are whatever the SDK provides;
/// this connector adds no policy of its own.
pub struct S3StorageBackend {
    /// The underlying S3 client.
    s3_client: S3Client,
    /// Expected bucket owner for security validation.
    expected_bucket_owner: Option<String>,
}

impl S3StorageBackend {
    /// Create a new S3 connector with the default credential chain.
    ///
    /// # Arguments
    /// * `settings` - Region, endpoint and optional static credentials
    ///
    /// # Returns
    /// A new S3 connector.
    pub async fn new(settings: StorageSettings) -> Result<Self, StorageError> {
        let mut config_loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = settings.region {
            config_loader = config_loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }

        if let Some(ref endpoint) = settings.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        if let Some(ref creds) = settings.credentials {
            let credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "rusty-cloudpath",
            );
            config_loader = config_loader.credentials_provider(credentials);
        }

        let sdk_config = config_loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        Ok(Self {
            s3_client: S3Client::from_conf(s3_config),
            expected_bucket_owner: settings.expected_bucket_owner,
        })
    }

    /// Create a connector from an existing S3Client (for testing).
    ///
    /// # Arguments
    /// * `s3_client` - Pre-configured S3 client
    /// * `expected_bucket_owner` - Optional expected bucket owner
    pub fn from_client(s3_client: S3Client, expected_bucket_owner: Option<String>) -> Self {
        Self {
            s3_client,
            expected_bucket_owner,
        }
    }

    /// Lazily list raw keys under a prefix, one ListObjectsV2 page per item.
    ///
    /// With `delimited` set, common prefixes are returned as `prefix/` keys so
    /// the listing emulation treats them as directories. The next page is only
    /// requested once the previous one has been consumed.
    fn key_pages(
        &self,
        bucket: &str,
        prefix: &str,
        delimited: bool,
    ) -> BoxStream<'static, Result<Vec<String>, StorageError>> {
        let s3_client: S3Client = self.s3_client.clone();
        let owner: Option<String> = self.expected_bucket_owner.clone();
        let bucket: String = bucket.to_string();
        let prefix: String = prefix.to_string();

        // `None` once the last page has been returned; `Some(token)` otherwise.
        stream::try_unfold(Some(None::<String>), move |state: Option<Option<String>>| {
            let s3_client: S3Client = s3_client.clone();
            let owner: Option<String> = owner.clone();
            let bucket: String = bucket.clone();
            let prefix: String = prefix.clone();
            async move {
                let token: Option<String> = match state {
                    Some(token) => token,
                    None => return Ok(None),
                };
                let page: KeyPage = list_page(
                    &s3_client,
                    owner.as_deref(),
                    &bucket,
                    &prefix,
                    delimited,
                    None,
                    token,
                )
                .await?;
                Ok::<Option<(Vec<String>, Option<Option<String>>)>, StorageError>(Some((
                    page.keys,
                    page.next_token.map(Some),
                )))
            }
        })
        .boxed()
    }
}

/// One page of a ListObjectsV2 response.
struct KeyPage {
    keys: Vec<String>,
    /// Continuation token when more pages follow.
    next_token: Option<String>,
}

async fn list_page(
    s3_client: &S3Client,
    expected_bucket_owner: Option<&str>,
    bucket: &str,
    prefix: &str,
    delimited: bool,
    max_keys: Option<i32>,
    continuation_token: Option<String>,
) -> Result<KeyPage, StorageError> {
    let mut request = s3_client.list_objects_v2().bucket(bucket).prefix(prefix);

    if delimited {
        request = request.delimiter("/");
    }

    if let Some(limit) = max_keys {
        request = request.max_keys(limit);
    }

    if let Some(owner) = expected_bucket_owner {
        request = request.expected_bucket_owner(owner);
    }

    if let Some(token) = continuation_token {
        request = request.continuation_token(token);
    }

    let response = request.send().await.map_err(|err| {
        let service_err = err.into_service_error();
        if service_err.is_no_such_bucket() {
            StorageError::not_found(format!("{}/", bucket))
        } else {
            sdk_error(&service_err, true)
        }
    })?;

    let mut keys: Vec<String> = Vec::new();
    for obj in response.contents() {
        if let Some(key) = obj.key() {
            keys.push(key.to_string());
        }
    }

    for common in response.common_prefixes() {
        if let Some(key) = common.prefix() {
            keys.push(key.to_string());
        }
    }

    let next_token: Option<String> = if response.is_truncated() == Some(true) {
        response.next_continuation_token().map(|s| s.to_string())
    } else {
        None
    };

    Ok(KeyPage { keys, next_token })
}

/// Format an SDK error with its full source chain.
fn sdk_error<E: std::error::Error>(err: &E, retryable: bool) -> StorageError {
    S3Error::SdkError {
        message: format!("{}", DisplayErrorContext(err)),
        retryable,
    }
    .into()
}

fn to_system_time(dt: &DateTime) -> SystemTime {
    let millis: i64 = dt.to_millis().unwrap_or(0);
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

#[async_trait]
impl StorageBackend for S3StorageBackend {
    async fn classify(&self, location: &ObjectLocation) -> Result<PathKind, StorageError> {
        if location.is_root() {
            let mut request = self.s3_client.head_bucket().bucket(&location.drive);
            if let Some(ref owner) = self.expected_bucket_owner {
                request = request.expected_bucket_owner(owner);
            }
            return match request.send().await {
                Ok(_) => Ok(PathKind::Directory),
                Err(err) => {
                    let service_err = err.into_service_error();
                    if service_err.is_not_found() {
                        Ok(PathKind::Absent)
                    } else {
                        Err(sdk_error(&service_err, false))
                    }
                }
            };
        }

        match self.get_metadata(location).await {
            Ok(_) => return Ok(PathKind::File),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let page: KeyPage = list_page(
            &self.s3_client,
            self.expected_bucket_owner.as_deref(),
            &location.drive,
            &location.prefix(),
            false,
            Some(1),
            None,
        )
        .await?;
        if page.keys.is_empty() {
            Ok(PathKind::Absent)
        } else {
            Ok(PathKind::Directory)
        }
    }

    async fn get_metadata(
        &self,
        location: &ObjectLocation,
    ) -> Result<ObjectMetadata, StorageError> {
        let mut request = self
            .s3_client
            .head_object()
            .bucket(&location.drive)
            .key(&location.key);

        if let Some(ref owner) = self.expected_bucket_owner {
            request = request.expected_bucket_owner(owner);
        }

        match request.send().await {
            Ok(output) => Ok(ObjectMetadata {
                size: output.content_length().map(|l| l as u64).unwrap_or(0),
                last_modified: output
                    .last_modified()
                    .map(to_system_time)
                    .unwrap_or(UNIX_EPOCH),
                etag: output.e_tag().map(|s| s.to_string()),
                content_type: output.content_type().map(|s| s.to_string()),
            }),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Err(StorageError::not_found(location))
                } else {
                    Err(sdk_error(&service_err, false))
                }
            }
        }
    }

    async fn download(&self, location: &ObjectLocation, dest: &Path) -> Result<(), StorageError> {
        let mut request = self
            .s3_client
            .get_object()
            .bucket(&location.drive)
            .key(&location.key);

        if let Some(ref owner) = self.expected_bucket_owner {
            request = request.expected_bucket_owner(owner);
        }

        let response = request.send().await.map_err(|err| {
            let service_err = err.into_service_error();
            if service_err.is_no_such_key() {
                StorageError::not_found(location)
            } else {
                sdk_error(&service_err, true)
            }
        })?;

        let mut file: File = File::create(dest)
            .await
            .map_err(|e| StorageError::io(dest, e))?;

        let mut body = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| StorageError::NetworkError {
            message: e.to_string(),
            retryable: true,
        })? {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(dest, e))?;
        }

        file.flush().await.map_err(|e| StorageError::io(dest, e))?;

        log::debug!("Downloaded s3://{} to {}", location, dest.display());
        Ok(())
    }

    async fn upload(&self, src: &Path, location: &ObjectLocation) -> Result<(), StorageError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::IoError {
                path: src.display().to_string(),
                message: e.to_string(),
            })?;

        let mut request = self
            .s3_client
            .put_object()
            .bucket(&location.drive)
            .key(&location.key)
            .body(body);

        if let Some(ref owner) = self.expected_bucket_owner {
            request = request.expected_bucket_owner(owner);
        }

        request
            .send()
            .await
            .map_err(|err| sdk_error(&err.into_service_error(), true))?;

        log::debug!("Uploaded {} to s3://{}", src.display(), location);
        Ok(())
    }

    fn list_children(&self, location: &ObjectLocation, recursive: bool) -> ListStream {
        let mut builder: ListingBuilder = ListingBuilder::new(location, recursive);
        self.key_pages(&location.drive, &location.prefix(), !recursive)
            .map_ok(move |keys: Vec<String>| {
                let entries: Vec<ListEntry> = keys
                    .iter()
                    .flat_map(|key: &String| builder.push(key))
                    .collect();
                stream::iter(entries.into_iter().map(Ok::<ListEntry, StorageError>))
            })
            .try_flatten()
            .boxed()
    }

    async fn get_range(
        &self,
        location: &ObjectLocation,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StorageError> {
        if end < start {
            return Ok(Vec::new());
        }

        let mut request = self
            .s3_client
            .get_object()
            .bucket(&location.drive)
            .key(&location.key)
            .range(format!("bytes={}-{}", start, end));

        if let Some(ref owner) = self.expected_bucket_owner {
            request = request.expected_bucket_owner(owner);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(StorageError::not_found(location));
                }
                // A range starting past the end of the object.
                if service_err.code() == Some("InvalidRange") {
                    return Ok(Vec::new());
                }
                return Err(sdk_error(&service_err, true));
            }
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::NetworkError {
                message: e.to_string(),
                retryable: true,
            })?;
        Ok(data.into_bytes().to_vec())
    }

    async fn move_object(
        &self,
        src: &ObjectLocation,
        dst: &ObjectLocation,
        remove_src: bool,
    ) -> Result<(), StorageError> {
        let copy_source: String = format!("{}/{}", src.drive, urlencoding::encode(&src.key));

        let mut request = self
            .s3_client
            .copy_object()
            .bucket(&dst.drive)
            .key(&dst.key)
            .copy_source(copy_source);

        // S3 refuses a copy onto itself unless the metadata changes.
        if src == dst {
            request = request.metadata_directive(MetadataDirective::Replace);
        }

        if let Some(ref owner) = self.expected_bucket_owner {
            request = request
                .expected_bucket_owner(owner)
                .expected_source_bucket_owner(owner);
        }

        request.send().await.map_err(|err| {
            let service_err = err.into_service_error();
            if service_err.code() == Some("NoSuchKey") {
                StorageError::not_found(src)
            } else {
                sdk_error(&service_err, true)
            }
        })?;

        if remove_src && src != dst {
            self.delete(src).await?;
        }
        Ok(())
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        let mut pages: BoxStream<'static, Result<Vec<String>, StorageError>> =
            match self.classify(location).await? {
                PathKind::Absent => return Ok(()),
                PathKind::File => stream::iter([Ok(vec![location.key.clone()])]).boxed(),
                PathKind::Directory => {
                    self.key_pages(&location.drive, &location.prefix(), false)
                }
            };

        while let Some(keys) = pages.try_next().await? {
            for key in keys {
                let mut request = self
                    .s3_client
                    .delete_object()
                    .bucket(&location.drive)
                    .key(&key);

                if let Some(ref owner) = self.expected_bucket_owner {
                    request = request.expected_bucket_owner(owner);
                }

                request
                    .send()
                    .await
                    .map_err(|err| sdk_error(&err.into_service_error(), true))?;
            }
        }
        Ok(())
    }
}
