//! Content extraction
//!
//! Fetches every user collection's records concurrently. The fan-out is
//! unbounded at the call site; the client's shared scheduler throttles the
//! effective outbound rate. Each collection is fault-isolated: one failed
//! fetch never blocks the others.

use anyhow::{Context, Result};
use futures::future::join_all;
use log::info;
use serde_json::Value;

use crate::api::DirectusClient;
use crate::engine::collections::{CollectionInfo, user_collections};
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, RunReport, StageOutcome};
use crate::template::TemplateStore;

pub async fn extract_content(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
    report: &mut RunReport,
) {
    let collections = match store.read_entities(EntityKind::Collections) {
        Ok(Some(collections)) => collections,
        Ok(None) => {
            report.record(
                "content",
                StageOutcome::Failed("collections.json missing; schema extract failed?".into()),
            );
            return;
        }
        Err(err) => {
            report.record("content", StageOutcome::Failed(format!("{:#}", err)));
            return;
        }
    };

    let targets = user_collections(&collections);
    if targets.is_empty() {
        report.record("content", StageOutcome::Skipped("no user collections".into()));
        return;
    }

    let fetches = targets.iter().map(|info| async move {
        let result = extract_collection(client, store, info).await;
        (info, result)
    });

    for (info, result) in join_all(fetches).await {
        let stage = format!("content:{}", info.name);
        match result {
            Ok(count) => {
                log.write(&format!("extract {}: {} records", stage, count));
                report.record(stage, StageOutcome::Ok);
            }
            Err(err) => {
                log.write(&format!("extract {} failed: {:#}", stage, err));
                report.warn(format!("content extract failed for {}: {}", info.name, err));
                report.record(stage, StageOutcome::Failed(format!("{:#}", err)));
            }
        }
    }
    info!("content extraction settled for {} collections", targets.len());
}

async fn extract_collection(
    client: &DirectusClient,
    store: &TemplateStore,
    info: &CollectionInfo,
) -> Result<usize> {
    let path = format!("/items/{}", urlencoding::encode(&info.name));

    if info.singleton {
        let record = client
            .get(&path)
            .await
            .with_context(|| format!("Failed to fetch singleton {}", info.name))?;
        store.write_content(&info.name, &record)?;
        return Ok(1);
    }

    let data = client
        .get_with_query(&path, &[("limit", "-1")])
        .await
        .with_context(|| format!("Failed to fetch records of {}", info.name))?;

    let records = match data {
        Value::Array(records) => records,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    let count = records.len();
    store.write_content(&info.name, &Value::Array(records))?;
    Ok(count)
}
