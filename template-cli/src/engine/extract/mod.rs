//! Extract pipeline
//!
//! Pulls each enabled entity kind from the source instance and writes it
//! into the template directory, in dependency order. Every stage is
//! individually fault-isolated: a failing stage is recorded and the
//! pipeline moves on to the next one.

mod assets;
mod content;

use std::future::Future;

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Value, json};

use crate::api::DirectusClient;
use crate::engine::entity::{self, EntityKind};
use crate::engine::filter::{ROLE_FIELDS, USER_FIELDS, filter_system_fields};
use crate::engine::flags::{EntityCategory, EntitySet};
use crate::engine::report::{RunLog, RunReport, StageOutcome, redact};
use crate::template::TemplateStore;

/// Extracts one source instance into one template directory
pub struct Extractor<'a> {
    client: &'a DirectusClient,
    store: &'a TemplateStore,
    set: &'a EntitySet,
    log: &'a RunLog,
}

impl<'a> Extractor<'a> {
    pub fn new(
        client: &'a DirectusClient,
        store: &'a TemplateStore,
        set: &'a EntitySet,
        log: &'a RunLog,
    ) -> Self {
        Self {
            client,
            store,
            set,
            log,
        }
    }

    /// Run the full extract pipeline and report per-stage outcomes
    pub async fn run(&self, template_name: &str) -> Result<RunReport> {
        let mut report = RunReport::default();

        self.store.prepare()?;
        self.write_package(template_name)?;

        // The schema snapshot is a single atomic call, taken before the
        // per-kind extraction so apply can diff against it.
        if self.set.enabled(EntityCategory::Schema) {
            self.stage(&mut report, "schema-snapshot", self.extract_snapshot())
                .await;
        }

        let kinds: Vec<EntityKind> = EntityKind::ALL
            .iter()
            .copied()
            .filter(|k| self.set.enabled(k.category()))
            .collect();
        let ordered = entity::ordered(&kinds)?;

        for kind in ordered {
            self.stage(&mut report, &kind.to_string(), self.extract_kind(kind))
                .await;
        }

        if self.set.enabled(EntityCategory::Content) {
            content::extract_content(self.client, self.store, self.log, &mut report).await;
        }

        if self.set.enabled(EntityCategory::Files) {
            assets::download_assets(self.client, self.store, self.log, &mut report).await;
        }

        Ok(report)
    }

    /// Run one stage, isolating its failure from the rest of the pipeline
    async fn stage(
        &self,
        report: &mut RunReport,
        name: &str,
        work: impl Future<Output = Result<StageOutcome>>,
    ) {
        match work.await {
            Ok(outcome) => {
                self.log.write(&format!("extract {}: {:?}", name, outcome));
                report.record(name, outcome);
            }
            Err(err) => {
                warn!("extract {} failed: {:#}", name, err);
                self.log.write(&format!("extract {} failed: {:#}", name, err));
                report.warn(format!("extract {} failed: {}", name, err));
                report.record(name, StageOutcome::Failed(format!("{:#}", err)));
            }
        }
    }

    fn write_package(&self, template_name: &str) -> Result<()> {
        let metadata = json!({
            "name": template_name,
            "version": env!("CARGO_PKG_VERSION"),
            "description": format!("Template extracted from {}", self.client.base_url()),
            "directus-template": true,
        });
        self.store.write_package(&metadata)
    }

    async fn extract_snapshot(&self) -> Result<StageOutcome> {
        let snapshot = self
            .client
            .get("/schema/snapshot")
            .await
            .context("Failed to fetch schema snapshot")?;
        self.store.write_snapshot(&snapshot)?;
        Ok(StageOutcome::Ok)
    }

    async fn extract_kind(&self, kind: EntityKind) -> Result<StageOutcome> {
        if kind.is_singleton() {
            let record = self.client.get(kind.api_path()).await?;
            self.store.write_singleton(kind, &record)?;
            info!("extracted {}", kind);
            return Ok(StageOutcome::Ok);
        }

        let mut records = self.fetch_all(kind).await?;

        // Roles and users carry instance-internal fields and, when custom
        // fields were added, relational aliases with stale foreign keys.
        // Reduce both to their portable allow-listed shape.
        let allow_list = match kind {
            EntityKind::Roles => Some(ROLE_FIELDS),
            EntityKind::Users => Some(USER_FIELDS),
            _ => None,
        };
        if let Some(allowed) = allow_list {
            for record in &mut records {
                filter_system_fields(record, allowed);
            }
        }

        self.store.write_entities(kind, &records)?;
        info!("extracted {} {} records", records.len(), kind);
        self.log
            .write(&format!("extract {}: {} records", kind, records.len()));
        Ok(StageOutcome::Ok)
    }

    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<Value>> {
        let query: Vec<(&str, &str)> = match kind {
            // Global presets only; per-user presets are not portable.
            EntityKind::Presets => vec![("limit", "-1"), ("filter[user][_null]", "true")],
            // The extensions endpoint does not page.
            EntityKind::Extensions => vec![],
            _ => vec![("limit", "-1")],
        };

        let data = self
            .client
            .get_with_query(kind.api_path(), &query)
            .await
            .with_context(|| format!("Failed to fetch {}", kind))?;

        match data {
            Value::Array(records) => Ok(records),
            Value::Null => Ok(Vec::new()),
            other => {
                warn!(
                    "unexpected non-array payload for {}: {}",
                    kind,
                    redact(&other)
                );
                Ok(vec![other])
            }
        }
    }
}
