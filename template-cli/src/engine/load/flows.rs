//! Flow and operation loading
//!
//! Operations form a linked list per flow through their resolve/reject
//! pointers, so they go in two passes: created first without the pointers,
//! then patched to link them up once every target exists.

use anyhow::Result;
use log::warn;
use serde_json::{Value, json};

use crate::api::{DirectusClient, item_path};
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, StageOutcome};
use crate::template::TemplateStore;

pub async fn load_flows(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(flows) = store.read_entities(EntityKind::Flows)? else {
        return Ok(StageOutcome::Skipped("no flows.json".into()));
    };

    // The operations alias repopulates itself once operations are created.
    let stripped: Vec<Value> = flows
        .iter()
        .map(|flow| {
            let mut record = flow.clone();
            if let Some(map) = record.as_object_mut() {
                map.remove("operations");
            }
            record
        })
        .collect();

    let mut tally = super::create_each(client, log, "/flows", "flows", &stripped).await;

    if let Some(operations) = store.read_entities(EntityKind::Operations)? {
        let op_tally = load_operations(client, log, &operations).await;
        tally.created += op_tally.created;
        tally.skipped += op_tally.skipped;
        tally.failed += op_tally.failed;
    }

    Ok(tally.outcome("flows and operations"))
}

async fn load_operations(
    client: &DirectusClient,
    log: &RunLog,
    operations: &[Value],
) -> super::BatchTally {
    let unlinked: Vec<Value> = operations
        .iter()
        .map(|op| {
            let mut record = op.clone();
            if let Some(map) = record.as_object_mut() {
                map.remove("resolve");
                map.remove("reject");
            }
            record
        })
        .collect();

    let mut tally = super::create_each(client, log, "/operations", "operations", &unlinked).await;

    for op in operations {
        let Some(id) = op.get("id").and_then(|i| i.as_str()) else {
            continue;
        };
        let resolve = op.get("resolve").cloned().unwrap_or(Value::Null);
        let reject = op.get("reject").cloned().unwrap_or(Value::Null);
        if resolve.is_null() && reject.is_null() {
            continue;
        }

        let patch = json!({ "resolve": resolve, "reject": reject });
        if let Err(err) = client.patch(&item_path("/operations", id), &patch).await {
            tally.failed += 1;
            log.write(&format!("apply operations: link {} failed: {}", id, err));
            warn!("operation link {} failed: {}", id, err);
        }
    }
    tally
}
