use std::{
    fs::{OpenOptions, Permissions},
    io::prelude::*,
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
};

use crate::{
    errors::{
        self,
        Error::{Other, API},
        Result,
    },
    ApiFuture,
};
use aws_sdk_ec2::{
    operation::describe_key_pairs::DescribeKeyPairsError,
    types::{Filter, InstanceType},
    Client,
};
use aws_smithy_client::SdkError;
use aws_types::SdkConfig as AwsSdkConfig;
use log::{info, warn};

/// Selects machine images by name pattern and virtualization type,
/// restricted to the listed owners.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageFilter {
    pub name_pattern: String,
    pub virtualization_type: String,
    pub owners: Vec<String>,
}

/// Parameters for launching instances.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LaunchRequest {
    pub image_id: String,
    pub key_name: String,
    pub instance_type: String,
    /// Used as both the minimum and maximum count.
    pub count: i32,
}

/// EC2 operations used for compute provisioning.
pub trait Compute {
    /// Returns the key-pair name if it exists, "None" if EC2 reports it not found.
    fn describe_key_pair<'a>(&'a self, key_name: &'a str) -> ApiFuture<'a, Option<String>>;

    /// Creates a key-pair and returns its private key material.
    fn create_key_pair<'a>(&'a self, key_name: &'a str) -> ApiFuture<'a, String>;

    /// Returns the matching image Ids in the order returned by the API.
    fn describe_images<'a>(&'a self, filter: &'a ImageFilter) -> ApiFuture<'a, Vec<String>>;

    /// Returns the launched instance Ids in the order returned by the API.
    fn run_instances<'a>(&'a self, req: &'a LaunchRequest) -> ApiFuture<'a, Vec<String>>;
}

/// Implements AWS EC2 manager.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    cli: Client,
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

impl Compute for Manager {
    fn describe_key_pair<'a>(&'a self, key_name: &'a str) -> ApiFuture<'a, Option<String>> {
        Box::pin(async move {
            info!(
                "describing EC2 key-pair '{}' in region {}",
                key_name, self.region
            );
            let resp = match self.cli.describe_key_pairs().key_names(key_name).send().await {
                Ok(r) => r,
                Err(e) => {
                    if is_err_not_found_describe_key_pairs(&e) {
                        warn!("key-pair '{}' not found", key_name);
                        return Ok(None);
                    }
                    return Err(API {
                        message: format!("failed describe_key_pairs {:?}", e),
                        retryable: errors::is_sdk_err_retryable(&e),
                    });
                }
            };

            let found = resp
                .key_pairs()
                .unwrap_or_default()
                .iter()
                .find_map(|kp| kp.key_name().map(String::from));
            info!("described key-pair '{}' (found {})", key_name, found.is_some());
            Ok(found)
        })
    }

    fn create_key_pair<'a>(&'a self, key_name: &'a str) -> ApiFuture<'a, String> {
        Box::pin(async move {
            info!("creating EC2 key-pair '{}'", key_name);
            let resp = self
                .cli
                .create_key_pair()
                .key_name(key_name)
                .send()
                .await
                .map_err(|e| API {
                    message: format!("failed create_key_pair {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                })?;

            let key_material = resp.key_material().ok_or_else(|| API {
                message: format!("no key material returned for key-pair '{}'", key_name),
                retryable: false,
            })?;
            Ok(key_material.to_string())
        })
    }

    fn describe_images<'a>(&'a self, filter: &'a ImageFilter) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            info!(
                "describing images '{}' ({}) owned by {:?}",
                filter.name_pattern, filter.virtualization_type, filter.owners
            );
            let resp = self
                .cli
                .describe_images()
                .filters(
                    Filter::builder()
                        .name("name")
                        .values(filter.name_pattern.as_str())
                        .build(),
                )
                .filters(
                    Filter::builder()
                        .name("virtualization-type")
                        .values(filter.virtualization_type.as_str())
                        .build(),
                )
                .set_owners(Some(filter.owners.clone()))
                .send()
                .await
                .map_err(|e| API {
                    message: format!("failed describe_images {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                })?;

            let image_ids: Vec<String> = resp
                .images()
                .unwrap_or_default()
                .iter()
                .filter_map(|img| img.image_id().map(String::from))
                .collect();
            info!("described {} images", image_ids.len());
            Ok(image_ids)
        })
    }

    fn run_instances<'a>(&'a self, req: &'a LaunchRequest) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move {
            info!(
                "launching {} '{}' instance(s) from '{}' with key-pair '{}'",
                req.count, req.instance_type, req.image_id, req.key_name
            );
            let resp = self
                .cli
                .run_instances()
                .image_id(req.image_id.as_str())
                .key_name(req.key_name.as_str())
                .instance_type(InstanceType::from(req.instance_type.as_str()))
                .min_count(req.count)
                .max_count(req.count)
                .send()
                .await
                .map_err(|e| API {
                    message: format!("failed run_instances {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                })?;

            let instance_ids: Vec<String> = resp
                .instances()
                .unwrap_or_default()
                .iter()
                .filter_map(|inst| inst.instance_id().map(String::from))
                .collect();
            info!("launched instances {:?}", instance_ids);
            Ok(instance_ids)
        })
    }
}

/// Saves the private key material to "key_path" with owner-only read/write.
/// An existing file is overwritten and its permissions reset.
pub fn write_key_file(key_path: &str, key_material: &str) -> Result<()> {
    info!("saving key material to '{}'", key_path);
    let mut f = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(key_path)
        .map_err(|e| Other {
            message: format!("failed to create file {:?}", e),
            retryable: false,
        })?;

    // "mode" only applies when the file is newly created
    f.set_permissions(Permissions::from_mode(0o600))
        .map_err(|e| Other {
            message: format!("failed to set file permissions {:?}", e),
            retryable: false,
        })?;

    f.write_all(key_material.as_bytes()).map_err(|e| Other {
        message: format!("failed to write file {:?}", e),
        retryable: false,
    })?;

    Ok(())
}

#[inline]
fn is_err_not_found_describe_key_pairs(e: &SdkError<DescribeKeyPairsError>) -> bool {
    match e {
        SdkError::ServiceError(err) => err.err().meta().code() == Some("InvalidKeyPair.NotFound"),
        _ => false,
    }
}
