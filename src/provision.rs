use std::{fmt, io::Write};

use crate::{
    ec2::{self, Compute, ImageFilter, LaunchRequest},
    errors::{self, Error::Other, Result},
    s3::Storage,
};
use log::{info, warn};
use thiserror::Error;

/// Fixed resource names and request parameters.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub region: String,
    pub key_name: String,
    /// Where newly created private key material is written.
    pub key_path: String,
    pub image_filter: ImageFilter,
    pub instance_type: String,
    pub bucket: String,
    pub object_key: String,
    pub object_body: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: String::from("us-east-1"),
            key_name: String::from("aws-demo"),
            key_path: String::from("aws-demo-ec2.pem"),
            image_filter: ImageFilter {
                name_pattern: String::from(
                    "ubuntu/images/hvm-ssd/ubuntu-focal-20.04-amd64-server-*",
                ),
                virtualization_type: String::from("hvm"),
                // Canonical
                owners: vec![String::from("099720109477")],
            },
            instance_type: String::from("t3.micro"),
            bucket: String::from("aws-demo-test-bucket-22dez"),
            object_key: String::from("test.txt"),
            object_body: String::from("hello world"),
        }
    }
}

/// Provisioning steps, in execution order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Step {
    CreateInstance,
    CreateBucket,
    Upload,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::CreateInstance => "create_instance",
            Step::CreateBucket => "create_bucket",
            Step::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// Error from a failed step; no later step runs.
#[derive(Error, Debug)]
#[error("{step} error: {source}")]
pub struct StepError {
    pub step: Step,
    pub source: errors::Error,
}

impl Step {
    fn wrap(self) -> impl FnOnce(errors::Error) -> StepError {
        move |source| StepError { step: self, source }
    }
}

/// Ensures the key-pair exists, then launches exactly one instance
/// from the first matching image. Returns the instance Id.
///
/// Resources created before a failure are left in place.
pub async fn create_instance<C>(compute: &C, cfg: &Config) -> Result<String>
where
    C: Compute + ?Sized,
{
    match compute.describe_key_pair(&cfg.key_name).await? {
        Some(name) => info!("key-pair '{}' already exists", name),
        None => {
            let key_material = compute.create_key_pair(&cfg.key_name).await?;
            ec2::write_key_file(&cfg.key_path, &key_material)?;
        }
    }

    let image_ids = compute.describe_images(&cfg.image_filter).await?;
    let image_id = image_ids.first().ok_or_else(|| Other {
        message: format!(
            "no image found for '{}' (owners {:?})",
            cfg.image_filter.name_pattern, cfg.image_filter.owners
        ),
        retryable: false,
    })?;
    if image_ids.len() > 1 {
        info!("found {} images, using '{}'", image_ids.len(), image_id);
    }

    let req = LaunchRequest {
        image_id: image_id.clone(),
        key_name: cfg.key_name.clone(),
        instance_type: cfg.instance_type.clone(),
        count: 1,
    };
    let instance_ids = compute.run_instances(&req).await?;
    let instance_id = instance_ids.into_iter().next().ok_or_else(|| Other {
        message: format!("no instance returned from launching '{}'", image_id),
        retryable: false,
    })?;

    info!("launched instance '{}'", instance_id);
    Ok(instance_id)
}

/// Creates the bucket unless a bucket with the same name is already listed.
pub async fn create_bucket<S>(storage: &S, cfg: &Config) -> Result<()>
where
    S: Storage + ?Sized,
{
    let buckets = storage.list_buckets().await?;
    if buckets.iter().any(|b| b == &cfg.bucket) {
        warn!("bucket '{}' already exists; skipping create", cfg.bucket);
        return Ok(());
    }

    storage.create_bucket(&cfg.bucket, &cfg.region).await
}

/// Writes the fixed object into the bucket.
pub async fn upload<S>(storage: &S, cfg: &Config) -> Result<()>
where
    S: Storage + ?Sized,
{
    storage
        .put_object(
            &cfg.bucket,
            &cfg.object_key,
            cfg.object_body.as_bytes().to_vec(),
        )
        .await
}

/// Runs every step in order, writing progress lines to "out".
/// Stops at the first failing step.
pub async fn run<C, S, W>(
    cfg: &Config,
    compute: &C,
    storage: &S,
    out: &mut W,
) -> std::result::Result<(), StepError>
where
    C: Compute + ?Sized,
    S: Storage + ?Sized,
    W: Write,
{
    let instance_id = create_instance(compute, cfg)
        .await
        .map_err(Step::CreateInstance.wrap())?;
    // exact output format, "Instace" spelling included
    writeln!(out, "Instace ID: {}", instance_id)
        .map_err(write_err)
        .map_err(Step::CreateInstance.wrap())?;

    create_bucket(storage, cfg)
        .await
        .map_err(Step::CreateBucket.wrap())?;

    upload(storage, cfg).await.map_err(Step::Upload.wrap())?;
    writeln!(out, "Upload complete successfully.")
        .map_err(write_err)
        .map_err(Step::Upload.wrap())?;

    Ok(())
}

fn write_err(e: std::io::Error) -> errors::Error {
    Other {
        message: format!("failed to write output {}", e),
        retryable: false,
    }
}
