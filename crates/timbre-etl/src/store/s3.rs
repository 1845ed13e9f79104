use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{
    Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use super::{ListPage, ObjectStore};
use crate::error::StoreError;

/// Connection settings for an S3-compatible bucket (AWS S3, R2, MinIO).
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    /// Custom endpoint; `None` uses the AWS default for the region.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: String,
}

/// Blocking facade over the async S3 client.
///
/// The store owns a current-thread runtime and drives every request to
/// completion before returning, so callers stay synchronous.
#[derive(Debug)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    runtime: Runtime,
}

impl S3ObjectStore {
    pub fn connect(settings: &S3Settings) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Unavailable(format!("tokio runtime init failed: {e}")))?;

        let region = Region::new(settings.region.clone());
        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load(),
        );

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            // R2 rejects the default CRC checksums on uploads and responses.
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(id), Some(secret)) => {
                builder = builder.credentials_provider(Credentials::new(
                    id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "timbre-config",
                ));
            }
            (None, None) => {
                log::debug!("No explicit credentials, using the default provider chain");
            }
            _ => {
                return Err(StoreError::Unavailable(
                    "access_key_id and secret_access_key must be set together".to_string(),
                ));
            }
        }

        log::info!(
            "Connected object store: bucket {} at {}",
            settings.bucket,
            settings.endpoint.as_deref().unwrap_or("default AWS endpoint")
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            runtime,
        })
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStore for S3ObjectStore {
    fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage, StoreError> {
        let response = self
            .runtime
            .block_on(
                self.client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .set_continuation_token(continuation.map(str::to_string))
                    .send(),
            )
            .map_err(|e| StoreError::Request {
                message: format!(
                    "list_objects_v2 {}/{} failed: {}",
                    self.bucket,
                    prefix,
                    DisplayErrorContext(&e)
                ),
            })?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .filter(|key| !key.ends_with('/'))
            .map(str::to_string)
            .collect();

        let next = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                        StoreError::NotFound {
                            key: key.to_string(),
                        }
                    } else {
                        StoreError::Request {
                            message: format!(
                                "get_object {}/{} failed: {}",
                                self.bucket,
                                key,
                                DisplayErrorContext(&e)
                            ),
                        }
                    }
                })?;

            let body = output.body.collect().await.map_err(|e| StoreError::Request {
                message: format!("reading body of {}/{} failed: {}", self.bucket, key, e),
            })?;

            Ok(body.into_bytes().to_vec())
        })
    }
}
