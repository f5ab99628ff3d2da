pub mod assemble;
pub mod canonical;
pub mod config;
pub mod detect;
pub mod endpoint;
pub mod errors;
pub mod feed;
pub mod fetch;
pub mod groups;
pub mod merge;
pub mod metrics_defs;
pub mod pipeline;
pub mod service;

#[cfg(test)]
mod testutils;

use crate::errors::ConverterError;
use crate::fetch::HttpFetcher;
use crate::pipeline::Pipeline;
use crate::service::ConverterService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

pub async fn run(config: config::Config) -> Result<(), ConverterError> {
    config.validate()?;

    let fetcher = HttpFetcher::new(&config.fetch)?;
    tracing::info!(
        template = %config.template_url,
        manual_groups = config.merge.manual_groups.len(),
        "starting converter"
    );

    let converter_service = ConverterService::new(Pipeline::from_config(&config), Arc::new(fetcher));
    let converter_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        converter_service,
    );

    let admin_service = AdminService::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(converter_task, admin_task)?;
    Ok(())
}
