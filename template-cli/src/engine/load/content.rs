//! Content loading
//!
//! Records go in two phases so circular references resolve: first a
//! skeleton pass creates every record with only its primary key, then a
//! fill pass patches in the full payloads. All skeletons across all
//! collections land before any fill, so cross-collection references always
//! have a target. Singletons are a single update. The phase sequence is
//! computed as an explicit plan rather than implied by loop order.
//!
//! A collection whose primary key cannot be resolved from the field
//! metadata is fatal for that collection only. Within the fill phase a
//! failed batch is logged and the remaining batches of the collection
//! still go out.

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use serde_json::{Value, json};

use crate::api::DirectusClient;
use crate::engine::collections::{CollectionInfo, primary_key_field, user_collections};
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, RunReport, StageOutcome};
use crate::template::TemplateStore;

/// Records per batch request
const BATCH_SIZE: usize = 50;

/// Audit fields stamped by the destination, not carried over
const AUDIT_FIELDS: &[&str] = &["user_created", "user_updated"];

pub async fn load_content(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
    report: &mut RunReport,
) {
    let (targets, orphans) = match content_targets(store) {
        Ok(found) => found,
        Err(err) => {
            report.record("content", StageOutcome::Failed(format!("{:#}", err)));
            return;
        }
    };
    for name in orphans {
        let stage = format!("content:{}", name);
        report.warn(format!("content file {} has no matching collection", name));
        report.record(stage, StageOutcome::Failed("no matching collection".into()));
    }
    if targets.is_empty() {
        report.record("content", StageOutcome::Skipped("no content files".into()));
        return;
    }

    let mut failed: HashSet<usize> = HashSet::new();
    for step in plan(&targets) {
        match step {
            ContentStep::Skeleton(i) => {
                let target = &targets[i];
                if let Err(err) = load_skeletons(client, target).await {
                    let stage = format!("content:{}", target.info.name);
                    log.write(&format!("apply {} failed: {:#}", stage, err));
                    report.warn(format!(
                        "content load failed for {}: {}",
                        target.info.name, err
                    ));
                    report.record(stage, StageOutcome::Failed(format!("{:#}", err)));
                    failed.insert(i);
                }
            }
            ContentStep::Fill(i) => {
                if failed.contains(&i) {
                    continue;
                }
                let target = &targets[i];
                let stage = format!("content:{}", target.info.name);
                match load_fill(client, log, target).await {
                    Ok(fill) => {
                        log.write(&format!("apply {}: {} records", stage, fill.records));
                        if fill.failed_batches > 0 {
                            report.warn(format!(
                                "content load incomplete for {}: {} of {} batches failed",
                                target.info.name, fill.failed_batches, fill.batches
                            ));
                        }
                        report.record(stage, fill.outcome());
                    }
                    Err(err) => {
                        log.write(&format!("apply {} failed: {:#}", stage, err));
                        report.warn(format!(
                            "content load failed for {}: {}",
                            target.info.name, err
                        ));
                        report.record(stage, StageOutcome::Failed(format!("{:#}", err)));
                    }
                }
            }
            ContentStep::Singleton(i) => {
                let target = &targets[i];
                let stage = format!("content:{}", target.info.name);
                match load_singleton(client, target).await {
                    Ok(count) => {
                        log.write(&format!("apply {}: {} records", stage, count));
                        report.record(stage, StageOutcome::Ok);
                    }
                    Err(err) => {
                        log.write(&format!("apply {} failed: {:#}", stage, err));
                        report.warn(format!(
                            "content load failed for {}: {}",
                            target.info.name, err
                        ));
                        report.record(stage, StageOutcome::Failed(format!("{:#}", err)));
                    }
                }
            }
        }
    }
    info!("content load settled for {} collections", targets.len());
}

struct ContentTarget {
    info: CollectionInfo,
    primary_key: Option<String>,
    records: Vec<Value>,
}

/// One unit of the content pipeline, indexing into the target list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentStep {
    Skeleton(usize),
    Fill(usize),
    Singleton(usize),
}

/// Compute the execution order: every collection's skeleton step precedes
/// any fill or singleton step, so cross-collection references always have
/// a row to land on.
fn plan(targets: &[ContentTarget]) -> Vec<ContentStep> {
    let mut steps = Vec::with_capacity(targets.len() * 2);
    for (i, target) in targets.iter().enumerate() {
        if !target.info.singleton {
            steps.push(ContentStep::Skeleton(i));
        }
    }
    for (i, target) in targets.iter().enumerate() {
        if target.info.singleton {
            steps.push(ContentStep::Singleton(i));
        } else {
            steps.push(ContentStep::Fill(i));
        }
    }
    steps
}

/// Pair every stored content file with its collection metadata and
/// primary key.
fn content_targets(store: &TemplateStore) -> Result<(Vec<ContentTarget>, Vec<String>)> {
    let collections = store
        .read_entities(EntityKind::Collections)?
        .context("collections.json missing; cannot classify content")?;
    let fields = store
        .read_entities(EntityKind::Fields)?
        .context("fields.json missing; cannot resolve primary keys")?;

    let infos = user_collections(&collections);
    let mut targets = Vec::new();
    let mut orphans = Vec::new();
    for name in store.content_collections()? {
        let Some(info) = infos.iter().find(|i| i.name == name) else {
            // Content for a collection the schema does not know about.
            orphans.push(name);
            continue;
        };
        let Some(data) = store.read_content(&name)? else {
            continue;
        };
        let records = match data {
            Value::Array(records) => records,
            other => vec![other],
        };
        targets.push(ContentTarget {
            info: info.clone(),
            primary_key: primary_key_field(&fields, &name),
            records,
        });
    }
    Ok((targets, orphans))
}

async fn load_skeletons(client: &DirectusClient, target: &ContentTarget) -> Result<()> {
    if target.records.is_empty() {
        return Ok(());
    }
    let pk = target
        .primary_key
        .as_deref()
        .ok_or_else(|| anyhow!("no primary key field found for {}", target.info.name))?;

    let path = format!("/items/{}", urlencoding::encode(&target.info.name));
    let mut skeletons = Vec::with_capacity(target.records.len());
    for record in &target.records {
        let key = record
            .get(pk)
            .filter(|k| json_key(k).is_some())
            .ok_or_else(|| anyhow!("record of {} has no {} value", target.info.name, pk))?;
        skeletons.push(json!({ pk: key.clone() }));
    }

    for batch in chunk(&skeletons, BATCH_SIZE) {
        match client.post(&path, &Value::Array(batch.to_vec())).await {
            Ok(_) => {}
            Err(err) if super::is_already_exists(&err) => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to seed records of {}", target.info.name));
            }
        }
    }
    Ok(())
}

/// Fill-phase counters for one collection
#[derive(Debug, Default)]
struct FillStats {
    records: usize,
    batches: usize,
    failed_batches: usize,
}

impl FillStats {
    fn outcome(&self) -> StageOutcome {
        if self.failed_batches == 0 {
            StageOutcome::Ok
        } else {
            StageOutcome::Failed(format!(
                "{} of {} fill batches failed",
                self.failed_batches, self.batches
            ))
        }
    }
}

async fn load_fill(
    client: &DirectusClient,
    log: &RunLog,
    target: &ContentTarget,
) -> Result<FillStats> {
    if target.records.is_empty() {
        return Ok(FillStats::default());
    }
    let pk = target
        .primary_key
        .as_deref()
        .ok_or_else(|| anyhow!("no primary key field found for {}", target.info.name))?;

    let full: Vec<Value> = target
        .records
        .iter()
        .map(|record| strip_audit_fields(record))
        .collect();
    for record in &full {
        if record.get(pk).and_then(json_key).is_none() {
            bail!("record of {} has no {} value", target.info.name, pk);
        }
    }

    // Batch update: an array of full records, each carrying its key. A
    // rejected batch is logged and the rest of the collection continues.
    let path = format!("/items/{}", urlencoding::encode(&target.info.name));
    let mut stats = FillStats::default();
    for batch in chunk(&full, BATCH_SIZE) {
        stats.batches += 1;
        match client.patch(&path, &Value::Array(batch.to_vec())).await {
            Ok(_) => stats.records += batch.len(),
            Err(err) => {
                stats.failed_batches += 1;
                log.write(&format!(
                    "apply content:{}: fill batch failed: {}",
                    target.info.name, err
                ));
                warn!("fill batch of {} failed: {}", target.info.name, err);
            }
        }
    }
    Ok(stats)
}

async fn load_singleton(client: &DirectusClient, target: &ContentTarget) -> Result<usize> {
    let Some(record) = target.records.first() else {
        return Ok(0);
    };
    let path = format!("/items/{}", urlencoding::encode(&target.info.name));
    client
        .patch(&path, &strip_audit_fields(record))
        .await
        .with_context(|| format!("Failed to update singleton {}", target.info.name))?;
    Ok(1)
}

fn strip_audit_fields(record: &Value) -> Value {
    let mut out = record.clone();
    if let Some(map) = out.as_object_mut() {
        for field in AUDIT_FIELDS {
            map.remove(*field);
        }
    }
    out
}

/// Primary key values are strings or integers; render either as a path
/// segment.
fn json_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn chunk<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(name: &str, singleton: bool) -> ContentTarget {
        ContentTarget {
            info: CollectionInfo {
                name: name.to_string(),
                singleton,
            },
            primary_key: Some("id".to_string()),
            records: Vec::new(),
        }
    }

    #[test]
    fn test_all_skeletons_precede_any_fill() {
        let targets = vec![
            target("articles", false),
            target("globals", true),
            target("authors", false),
        ];

        let steps = plan(&targets);
        assert_eq!(
            steps,
            vec![
                ContentStep::Skeleton(0),
                ContentStep::Skeleton(2),
                ContentStep::Fill(0),
                ContentStep::Singleton(1),
                ContentStep::Fill(2),
            ]
        );

        let last_skeleton = steps
            .iter()
            .rposition(|s| matches!(s, ContentStep::Skeleton(_)))
            .unwrap();
        let first_fill = steps
            .iter()
            .position(|s| matches!(s, ContentStep::Fill(_) | ContentStep::Singleton(_)))
            .unwrap();
        assert!(last_skeleton < first_fill);
    }

    #[test]
    fn test_singletons_have_no_skeleton_step() {
        let steps = plan(&[target("globals", true)]);
        assert_eq!(steps, vec![ContentStep::Singleton(0)]);
    }

    #[test]
    fn test_fill_stats_outcome() {
        let clean = FillStats {
            records: 100,
            batches: 2,
            failed_batches: 0,
        };
        assert_eq!(clean.outcome(), StageOutcome::Ok);

        let partial = FillStats {
            records: 50,
            batches: 2,
            failed_batches: 1,
        };
        assert!(matches!(partial.outcome(), StageOutcome::Failed(_)));
    }

    #[test]
    fn test_chunking_splits_at_batch_size() {
        let items: Vec<i32> = (0..125).collect();
        let batches: Vec<&[i32]> = chunk(&items, BATCH_SIZE).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[1].len(), 50);
        assert_eq!(batches[2].len(), 25);
    }

    #[test]
    fn test_audit_fields_stripped() {
        let record = json!({
            "id": 1,
            "title": "hello",
            "user_created": "u1",
            "user_updated": "u2",
            "date_created": "2024-01-01"
        });
        let stripped = strip_audit_fields(&record);
        assert!(stripped.get("user_created").is_none());
        assert!(stripped.get("user_updated").is_none());
        assert_eq!(stripped["date_created"], json!("2024-01-01"));
    }

    #[test]
    fn test_json_key_renders_strings_and_numbers() {
        assert_eq!(json_key(&json!("abc")), Some("abc".to_string()));
        assert_eq!(json_key(&json!(42)), Some("42".to_string()));
        assert_eq!(json_key(&json!(null)), None);
        assert_eq!(json_key(&json!({"x": 1})), None);
    }
}
