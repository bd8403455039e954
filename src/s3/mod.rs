use crate::{
    errors::{self, Error},
    ApiFuture,
};
use aws_sdk_s3::{
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use aws_types::SdkConfig as AwsSdkConfig;

/// Region S3 uses when no location constraint is sent.
/// The service rejects it as an explicit constraint.
pub const DEFAULT_LOCATION: &str = "us-east-1";

/// S3 operations used for storage provisioning and upload.
pub trait Storage {
    /// Returns the names of all buckets owned by the caller.
    fn list_buckets(&self) -> ApiFuture<'_, Vec<String>>;

    /// Creates a bucket in the "location_constraint" region.
    fn create_bucket<'a>(
        &'a self,
        s3_bucket: &'a str,
        location_constraint: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// Writes "body" to "s3://{s3_bucket}/{s3_key}" in a single request.
    fn put_object<'a>(
        &'a self,
        s3_bucket: &'a str,
        s3_key: &'a str,
        body: Vec<u8>,
    ) -> ApiFuture<'a, ()>;
}

/// Implements AWS S3 manager.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    pub cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        Self {
            region: shared_config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            cli: Client::new(shared_config),
        }
    }
}

impl Storage for Manager {
    fn list_buckets(&self) -> ApiFuture<'_, Vec<String>> {
        Box::pin(async move {
            log::info!("listing buckets in region {}", self.region);
            let resp = self.cli.list_buckets().send().await.map_err(|e| Error::API {
                message: format!("failed list_buckets {}", e),
                retryable: errors::is_sdk_err_retryable(&e),
            })?;

            let names: Vec<String> = resp
                .buckets()
                .unwrap_or_default()
                .iter()
                .filter_map(|b| b.name().map(String::from))
                .collect();
            log::info!("listed {} buckets", names.len());
            Ok(names)
        })
    }

    fn create_bucket<'a>(
        &'a self,
        s3_bucket: &'a str,
        location_constraint: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            log::info!("creating bucket '{s3_bucket}' in region {location_constraint}");

            let mut req = self.cli.create_bucket().bucket(s3_bucket);
            if let Some(bucket_cfg) = bucket_configuration(location_constraint) {
                req = req.create_bucket_configuration(bucket_cfg);
            }

            req.send().await.map_err(|e| Error::API {
                message: format!("failed create_bucket {}", e),
                retryable: errors::is_sdk_err_retryable(&e),
            })?;

            log::info!("created bucket '{s3_bucket}'");
            Ok(())
        })
    }

    fn put_object<'a>(
        &'a self,
        s3_bucket: &'a str,
        s3_key: &'a str,
        body: Vec<u8>,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            log::info!(
                "put object ({} bytes) to 's3://{}/{}' (region '{}')",
                body.len(),
                s3_bucket,
                s3_key,
                self.region
            );

            self.cli
                .put_object()
                .bucket(s3_bucket)
                .key(s3_key)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|e| Error::API {
                    message: format!("failed put_object {}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                })?;

            Ok(())
        })
    }
}

/// Returns the bucket configuration for the location constraint,
/// or "None" for the default location.
fn bucket_configuration(location_constraint: &str) -> Option<CreateBucketConfiguration> {
    if location_constraint.is_empty() || location_constraint == DEFAULT_LOCATION {
        return None;
    }
    let constraint = BucketLocationConstraint::from(location_constraint);
    Some(
        CreateBucketConfiguration::builder()
            .location_constraint(constraint)
            .build(),
    )
}

#[test]
fn test_bucket_configuration() {
    assert!(bucket_configuration("us-east-1").is_none());
    assert!(bucket_configuration("").is_none());

    let cfg = bucket_configuration("eu-west-1").unwrap();
    assert_eq!(
        cfg.location_constraint(),
        Some(&BucketLocationConstraint::EuWest1)
    );
}
