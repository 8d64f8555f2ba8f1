//! Folder and file loading
//!
//! Folders are created parents before children so the hierarchy resolves
//! on the first pass. Files already present at the destination, by ID or
//! by stored filename, are skipped; everything else is uploaded from the
//! template's asset directory as multipart form data.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::Value;

use crate::api::DirectusClient;
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, StageOutcome};
use crate::template::TemplateStore;

pub async fn load_folders(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(folders) = store.read_entities(EntityKind::Folders)? else {
        return Ok(StageOutcome::Skipped("no folders.json".into()));
    };

    let ordered = parent_first(&folders);
    let tally = super::create_each(client, log, "/folders", "folders", &ordered).await;
    Ok(tally.outcome("folders"))
}

/// Order folder records so every parent precedes its children. Folders
/// whose parent is not in the set (stale reference) come last, so every
/// record is still attempted.
fn parent_first(folders: &[Value]) -> Vec<Value> {
    let ids: HashSet<&str> = folders
        .iter()
        .filter_map(|f| f.get("id").and_then(|i| i.as_str()))
        .collect();

    let mut ordered: Vec<Value> = Vec::with_capacity(folders.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&Value> = folders.iter().collect();

    while !remaining.is_empty() {
        let mut progressed = false;
        remaining.retain(|folder| {
            let parent = folder.get("parent").and_then(|p| p.as_str());
            let ready = match parent {
                None => true,
                Some(parent) => placed.contains(parent) || !ids.contains(parent),
            };
            if ready {
                if let Some(id) = folder.get("id").and_then(|i| i.as_str()) {
                    placed.insert(id);
                }
                ordered.push((*folder).clone());
                progressed = true;
                false
            } else {
                true
            }
        });
        if !progressed {
            // Parent cycle; emit the rest in input order.
            warn!("folder hierarchy contains a cycle; creating the rest as-is");
            ordered.extend(remaining.iter().map(|f| (*f).clone()));
            break;
        }
    }
    ordered
}

pub async fn load_files(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(files) = store.read_entities(EntityKind::Files)? else {
        return Ok(StageOutcome::Skipped("no files.json".into()));
    };

    let existing = client
        .get_with_query("/files", &[("limit", "-1"), ("fields", "id,filename_disk")])
        .await
        .context("Failed to list destination files")?;
    let existing = existing.as_array().cloned().unwrap_or_default();
    let existing_ids: HashSet<&str> = existing
        .iter()
        .filter_map(|f| f.get("id").and_then(|i| i.as_str()))
        .collect();
    let existing_names: HashSet<&str> = existing
        .iter()
        .filter_map(|f| f.get("filename_disk").and_then(|n| n.as_str()))
        .collect();

    let mut tally = super::BatchTally::default();
    for file in &files {
        match upload_one(client, store, file, &existing_ids, &existing_names).await {
            Ok(true) => tally.created += 1,
            Ok(false) => tally.skipped += 1,
            Err(err) => {
                let label = file
                    .get("filename_disk")
                    .and_then(|n| n.as_str())
                    .unwrap_or("<unknown>");
                tally.failed += 1;
                log.write(&format!("apply files: {} failed: {:#}", label, err));
                warn!("file {} failed: {:#}", label, err);
            }
        }
    }

    Ok(tally.outcome("files"))
}

async fn upload_one(
    client: &DirectusClient,
    store: &TemplateStore,
    file: &Value,
    existing_ids: &HashSet<&str>,
    existing_names: &HashSet<&str>,
) -> Result<bool> {
    let id = file
        .get("id")
        .and_then(|i| i.as_str())
        .context("file entity has no id")?;
    let filename_disk = file
        .get("filename_disk")
        .and_then(|n| n.as_str())
        .context("file entity has no filename_disk")?;

    if existing_ids.contains(id) || existing_names.contains(filename_disk) {
        return Ok(false);
    }

    let bytes = store
        .read_asset(filename_disk)?
        .with_context(|| format!("asset {} missing from template", filename_disk))?;

    let display_name = file
        .get("filename_download")
        .and_then(|n| n.as_str())
        .unwrap_or(filename_disk);
    client
        .upload_file(file, display_name, bytes)
        .await
        .with_context(|| format!("Failed to upload {}", filename_disk))?;
    info!("uploaded file {}", filename_disk);
    Ok(true)
}
