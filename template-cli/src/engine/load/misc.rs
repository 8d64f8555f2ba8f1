//! Dashboards, presets, translations, settings, and extensions loading

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Value, json};

use crate::api::DirectusClient;
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, StageOutcome};
use crate::template::TemplateStore;

pub async fn load_dashboards(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(dashboards) = store.read_entities(EntityKind::Dashboards)? else {
        return Ok(StageOutcome::Skipped("no dashboards.json".into()));
    };

    // Panels reference their dashboard, so the alias on the dashboard side
    // is dropped and panels are created second.
    let stripped: Vec<Value> = dashboards
        .iter()
        .map(|dashboard| {
            let mut record = dashboard.clone();
            if let Some(map) = record.as_object_mut() {
                map.remove("panels");
            }
            record
        })
        .collect();

    let mut tally = super::create_each(client, log, "/dashboards", "dashboards", &stripped).await;

    if let Some(panels) = store.read_entities(EntityKind::Panels)? {
        let panel_tally = super::create_each(client, log, "/panels", "panels", &panels).await;
        tally.created += panel_tally.created;
        tally.skipped += panel_tally.skipped;
        tally.failed += panel_tally.failed;
    }

    Ok(tally.outcome("dashboards and panels"))
}

pub async fn load_presets(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(presets) = store.read_entities(EntityKind::Presets)? else {
        return Ok(StageOutcome::Skipped("no presets.json".into()));
    };

    // Only global presets travel; force the owner off in case a per-user
    // preset slipped into the template.
    let global: Vec<Value> = presets
        .iter()
        .map(|preset| {
            let mut record = preset.clone();
            if let Some(map) = record.as_object_mut() {
                map.insert("user".to_string(), Value::Null);
                map.remove("id");
            }
            record
        })
        .collect();

    let tally = super::create_each(client, log, "/presets", "presets", &global).await;
    Ok(tally.outcome("presets"))
}

pub async fn load_translations(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(translations) = store.read_entities(EntityKind::Translations)? else {
        return Ok(StageOutcome::Skipped("no translations.json".into()));
    };

    let tally =
        super::create_each(client, log, "/translations", "translations", &translations).await;
    Ok(tally.outcome("translations"))
}

/// Settings are a singleton; one update call carries the whole record.
pub async fn load_settings(client: &DirectusClient, store: &TemplateStore) -> Result<StageOutcome> {
    let Some(settings) = store.read_singleton(EntityKind::Settings)? else {
        return Ok(StageOutcome::Skipped("no settings.json".into()));
    };

    client
        .patch("/settings", &settings)
        .await
        .context("Failed to update settings")?;
    info!("updated instance settings");
    Ok(StageOutcome::Ok)
}

/// Registry extensions are installed through the registry endpoint.
/// Bundle members and locally-developed extensions cannot be installed
/// over the API and are reported for manual installation.
pub async fn load_extensions(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(extensions) = store.read_entities(EntityKind::Extensions)? else {
        return Ok(StageOutcome::Skipped("no extensions.json".into()));
    };

    let mut tally = super::BatchTally::default();
    let mut manual: Vec<String> = Vec::new();

    for extension in &extensions {
        let name = extension
            .pointer("/schema/name")
            .or_else(|| extension.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("<unnamed>")
            .to_string();

        if !is_registry_installable(extension) {
            manual.push(name);
            tally.skipped += 1;
            continue;
        }

        let Some(id) = extension.get("id").and_then(|i| i.as_str()) else {
            manual.push(name);
            tally.skipped += 1;
            continue;
        };
        let body = json!({
            "extension": id,
            "version": extension.pointer("/schema/version").cloned().unwrap_or(Value::Null),
        });
        match client.post("/extensions/registry/install", &body).await {
            Ok(_) => {
                info!("installed extension {}", name);
                tally.created += 1;
            }
            Err(err) if super::is_already_exists(&err) => tally.skipped += 1,
            Err(err) => {
                tally.failed += 1;
                log.write(&format!("apply extensions: {} failed: {}", name, err));
                warn!("extension {} failed: {}", name, err);
            }
        }
    }

    if !manual.is_empty() {
        let note = format!("install manually: {}", manual.join(", "));
        log.write(&format!("apply extensions: {}", note));
        warn!("extensions not installable over the API; {}", note);
    }

    Ok(tally.outcome("extensions"))
}

/// Standalone registry extensions only; bundle members install with their
/// bundle and local extensions have no registry source.
fn is_registry_installable(extension: &Value) -> bool {
    let from_registry = extension
        .get("meta")
        .and_then(|m| m.get("source"))
        .or_else(|| extension.pointer("/schema/source"))
        .and_then(|s| s.as_str())
        == Some("registry");
    let in_bundle = extension
        .get("bundle")
        .is_some_and(|b| !b.is_null());
    from_registry && !in_bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_extension_installable() {
        let ext = json!({"id": "e1", "bundle": null, "meta": {"source": "registry"}});
        assert!(is_registry_installable(&ext));
    }

    #[test]
    fn test_bundle_member_not_installable() {
        let ext = json!({"id": "e2", "bundle": "b1", "meta": {"source": "registry"}});
        assert!(!is_registry_installable(&ext));
    }

    #[test]
    fn test_local_extension_not_installable() {
        let ext = json!({"id": "e3", "bundle": null, "meta": {"source": "local"}});
        assert!(!is_registry_installable(&ext));
    }
}
