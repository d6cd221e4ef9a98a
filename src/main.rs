use lambda_http::{run, service_fn, Error, Request};
use std::sync::Arc;

mod config;
mod error;
mod handler;
mod model;
mod response;
mod scoring;
mod store;

use config::Config;
use handler::{function_handler, AppContext};
use model::{load_predictor, S3BlobSource};
use store::DynamoStore;

fn init_tracing() {
    // CloudWatch stamps every line, so no timestamps here
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .compact()
        .init();
}

// Model and clients are loaded once per Lambda container; a failed load fails the init phase
async fn init_context(config: &Config) -> Result<AppContext, Error> {
    let aws = aws_config::load_from_env().await;

    let blobs = S3BlobSource::new(aws_sdk_s3::Client::new(&aws));
    let predictor =
        load_predictor(&blobs, &config.bucket_name, &config.model_key, &config.scratch_path)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "model load failed"))?;

    let store = DynamoStore::new(aws_sdk_dynamodb::Client::new(&aws), config.table_name.clone());
    Ok(AppContext { predictor, store: Arc::new(store) })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::from_env()
        .inspect_err(|e| tracing::error!(error = %e, "invalid configuration"))?;
    let ctx = init_context(&config).await?;
    let ctx = &ctx;

    run(service_fn(|request: Request| async move { function_handler(ctx, request).await }))
        .await
}
