//! Schema loading
//!
//! Prefers the atomic snapshot route: diff the stored snapshot against the
//! destination and apply the resulting patch in one call. Custom fields on
//! system collections are not covered by the snapshot and are topped up
//! record by record. Templates without a snapshot fall back to creating
//! collections, fields, and relations individually, skipping existing ones.

use anyhow::{Context, Result};
use log::info;
use serde_json::Value;

use crate::api::DirectusClient;
use crate::engine::entity::EntityKind;
use crate::engine::report::StageOutcome;
use crate::template::TemplateStore;

pub async fn load_schema(client: &DirectusClient, store: &TemplateStore) -> Result<StageOutcome> {
    if let Some(snapshot) = store.read_snapshot()? {
        apply_snapshot(client, &snapshot).await?;
        // The snapshot only carries user collections; system-collection
        // customizations still need the fields endpoint.
        load_fields(client, store, true).await?;
        return Ok(StageOutcome::Ok);
    }

    let Some(collections) = store.read_entities(EntityKind::Collections)? else {
        return Ok(StageOutcome::Skipped("no schema files in template".into()));
    };

    for collection in &collections {
        let name = collection
            .get("collection")
            .and_then(|c| c.as_str())
            .unwrap_or("<unnamed>");
        match client.post("/collections", collection).await {
            Ok(_) => info!("created collection {}", name),
            Err(err) if super::is_already_exists(&err) => {}
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to create collection {}", name));
            }
        }
    }

    load_fields(client, store, false).await?;
    load_relations(client, store).await?;
    Ok(StageOutcome::Ok)
}

/// Diff the stored snapshot against the destination schema and apply the
/// patch. `force` skips the version/vendor guard so templates move between
/// differing instances.
async fn apply_snapshot(client: &DirectusClient, snapshot: &Value) -> Result<()> {
    let diff = client
        .post("/schema/diff?force=true", snapshot)
        .await
        .context("Failed to diff schema snapshot")?;

    if diff.is_null() {
        info!("destination schema already matches the snapshot");
        return Ok(());
    }

    client
        .post("/schema/apply", &diff)
        .await
        .context("Failed to apply schema diff")?;
    info!("applied schema snapshot");
    Ok(())
}

async fn load_fields(
    client: &DirectusClient,
    store: &TemplateStore,
    system_only: bool,
) -> Result<()> {
    let Some(fields) = store.read_entities(EntityKind::Fields)? else {
        return Ok(());
    };

    for field in &fields {
        let collection = field
            .get("collection")
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        if system_only && !collection.starts_with("directus_") {
            continue;
        }
        let name = field
            .get("field")
            .and_then(|f| f.as_str())
            .unwrap_or("<unnamed>");
        let path = format!("/fields/{}", urlencoding::encode(collection));
        match client.post(&path, field).await {
            Ok(_) => info!("created field {}.{}", collection, name),
            Err(err) if super::is_already_exists(&err) => {}
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to create field {}.{}", collection, name));
            }
        }
    }
    Ok(())
}

async fn load_relations(client: &DirectusClient, store: &TemplateStore) -> Result<()> {
    let Some(relations) = store.read_entities(EntityKind::Relations)? else {
        return Ok(());
    };

    for relation in &relations {
        let collection = relation
            .get("collection")
            .and_then(|c| c.as_str())
            .unwrap_or("<unnamed>");
        let field = relation
            .get("field")
            .and_then(|f| f.as_str())
            .unwrap_or("<unnamed>");
        match client.post("/relations", relation).await {
            Ok(_) => info!("created relation {}.{}", collection, field),
            Err(err) if super::is_already_exists(&err) => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to create relation {}.{}", collection, field)
                });
            }
        }
    }
    Ok(())
}
