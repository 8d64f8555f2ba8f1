//! Binary asset download
//!
//! Downloads the binary for every extracted file entity, concurrently and
//! individually fault-isolated. A failed download leaves a file entity
//! without its asset; the gap surfaces again at load time but never blocks
//! other downloads or later stages.

use anyhow::{Context, Result};
use futures::future::join_all;
use log::info;
use serde_json::Value;

use crate::api::DirectusClient;
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, RunReport, StageOutcome};
use crate::template::TemplateStore;

pub async fn download_assets(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
    report: &mut RunReport,
) {
    let files = match store.read_entities(EntityKind::Files) {
        Ok(Some(files)) => files,
        Ok(None) => {
            report.record("assets", StageOutcome::Skipped("no files.json".into()));
            return;
        }
        Err(err) => {
            report.record("assets", StageOutcome::Failed(format!("{:#}", err)));
            return;
        }
    };

    if files.is_empty() {
        report.record("assets", StageOutcome::Skipped("no file entities".into()));
        return;
    }

    let downloads = files.iter().map(|file| async move {
        let name = file
            .get("filename_disk")
            .and_then(|n| n.as_str())
            .unwrap_or("<unknown>")
            .to_string();
        (name, download_one(client, store, file).await)
    });

    let mut failures = 0usize;
    for (name, result) in join_all(downloads).await {
        if let Err(err) = result {
            failures += 1;
            log.write(&format!("asset {} failed: {:#}", name, err));
            report.warn(format!("asset download failed for {}: {}", name, err));
        }
    }

    info!(
        "downloaded {} assets ({} failed)",
        files.len() - failures,
        failures
    );
    if failures == 0 {
        report.record("assets", StageOutcome::Ok);
    } else {
        report.record(
            "assets",
            StageOutcome::Failed(format!("{} of {} downloads failed", failures, files.len())),
        );
    }
}

async fn download_one(
    client: &DirectusClient,
    store: &TemplateStore,
    file: &Value,
) -> Result<()> {
    let id = file
        .get("id")
        .and_then(|i| i.as_str())
        .context("file entity has no id")?;
    let filename_disk = file
        .get("filename_disk")
        .and_then(|n| n.as_str())
        .context("file entity has no filename_disk")?;

    let bytes = client
        .download_asset(id)
        .await
        .with_context(|| format!("Failed to download asset {}", id))?;
    store.write_asset(filename_disk, &bytes)
}
