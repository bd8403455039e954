pub mod errors;

#[cfg(feature = "ec2")]
pub mod ec2;

#[cfg(feature = "s3")]
pub mod s3;

#[cfg(all(feature = "ec2", feature = "s3"))]
pub mod provision;

use std::{future::Future, pin::Pin};

use aws_config::{self, meta::region::RegionProviderChain};
use aws_types::{region::Region, SdkConfig as AwsSdkConfig};

/// Future returned by the remote collaborator traits ("ec2::Compute", "s3::Storage").
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = errors::Result<T>> + Send + 'a>>;

/// Loads an AWS config from default environments.
/// Credentials are resolved by the SDK's default provider chain.
pub async fn load_config(reg: Option<String>) -> AwsSdkConfig {
    log::info!("loading AWS configuration for region {:?}", reg);
    let regp = RegionProviderChain::first_try(reg.map(Region::new))
        .or_default_provider()
        .or_else(Region::new("us-west-2"));

    aws_config::from_env().region(regp).load().await
}
