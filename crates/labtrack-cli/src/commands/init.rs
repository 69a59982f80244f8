//! Storage initialization command.

use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use labtrack_core::AppResult;
use labtrack_core::config::AppConfig;

use super::Services;

#[derive(Debug, Serialize, Tabled)]
struct ReportRow {
    drives_registered: usize,
    drives_existing: usize,
    root_folders: usize,
}

/// Register the drives listed under `[[storage.drives]]`.
pub async fn execute(config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    if config.storage.drives.is_empty() {
        output::print_warning("No drives configured under [[storage.drives]].");
        return Ok(());
    }

    let services = Services::connect(config).await?;
    let report = services.initializer.initialize(&config.storage).await?;
    output::print_item(
        &ReportRow {
            drives_registered: report.drives_registered,
            drives_existing: report.drives_existing,
            root_folders: report.root_folders,
        },
        format,
    );
    services.pool.close().await;
    Ok(())
}
