use std::{io, process};

use aws_demo::{ec2, provision, s3};

/// cargo run --bin aws-demo
#[tokio::main]
async fn main() {
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let cfg = provision::Config::default();
    let shared_config = aws_demo::load_config(Some(cfg.region.clone())).await;
    log::info!("region {:?}", shared_config.region());

    let ec2_manager = ec2::Manager::new(&shared_config);
    let s3_manager = s3::Manager::new(&shared_config);

    let mut stdout = io::stdout();
    if let Err(e) = provision::run(&cfg, &ec2_manager, &s3_manager, &mut stdout).await {
        println!("{}", e);
        process::exit(1);
    }
}
