//! Apply pipeline
//!
//! Pushes a template into the destination instance, consumers after
//! producers. Stage failures are isolated (logged, recorded, next stage
//! proceeds); record failures within a stage are isolated the same way.
//! Missing preconditions (no schema files at all) are fatal before any
//! stage begins. Nothing is rolled back on later failure.

mod content;
mod files;
mod flows;
mod misc;
mod roles;
mod schema;
mod users;

use std::future::Future;

use anyhow::Result;
use log::{info, warn};
use serde_json::Value;

use crate::api::{ApiError, DirectusClient};
use crate::engine::flags::{EntityCategory, EntitySet};
use crate::engine::report::{RunLog, RunReport, StageOutcome};
use crate::template::TemplateStore;

/// Loads one template directory into one destination instance
pub struct Loader<'a> {
    client: &'a DirectusClient,
    store: &'a TemplateStore,
    set: &'a EntitySet,
    log: &'a RunLog,
}

impl<'a> Loader<'a> {
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

    /// Run the full apply pipeline and report per-stage outcomes
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();

        self.store.validate_for_apply()?;
        match self.store.read_package()? {
            Some(package) => {
                let name = package
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or("<unnamed>");
                info!("applying template {:?} to {}", name, self.client.base_url());
            }
            None => warn!("template has no package.json; applying anyway"),
        }

        if self.set.enabled(EntityCategory::Schema) {
            self.stage(&mut report, "schema", schema::load_schema(self.client, self.store))
                .await;
        }

        if self.set.enabled(EntityCategory::Permissions) {
            self.stage(&mut report, "roles", roles::load_roles(self.client, self.store, self.log))
                .await;
            self.stage(
                &mut report,
                "policies",
                roles::load_policies(self.client, self.store, self.log),
            )
            .await;
            self.stage(&mut report, "access", roles::load_access(self.client, self.store, self.log))
                .await;
        }

        if self.set.enabled(EntityCategory::Files) {
            self.stage(&mut report, "folders", files::load_folders(self.client, self.store, self.log))
                .await;
            self.stage(&mut report, "files", files::load_files(self.client, self.store, self.log))
                .await;
        }

        if self.set.enabled(EntityCategory::Users) {
            self.stage(&mut report, "users", users::load_users(self.client, self.store, self.log))
                .await;
        }

        if self.set.enabled(EntityCategory::Dashboards) {
            self.stage(
                &mut report,
                "dashboards",
                misc::load_dashboards(self.client, self.store, self.log),
            )
            .await;
        }

        if self.set.enabled(EntityCategory::Content) {
            content::load_content(self.client, self.store, self.log, &mut report).await;
        }

        if self.set.enabled(EntityCategory::Flows) {
            self.stage(&mut report, "flows", flows::load_flows(self.client, self.store, self.log))
                .await;
        }

        if self.set.enabled(EntityCategory::Settings) {
            self.stage(&mut report, "presets", misc::load_presets(self.client, self.store, self.log))
                .await;
            self.stage(
                &mut report,
                "translations",
                misc::load_translations(self.client, self.store, self.log),
            )
            .await;
            self.stage(&mut report, "settings", misc::load_settings(self.client, self.store))
                .await;
        }

        if self.set.enabled(EntityCategory::Permissions) {
            self.stage(
                &mut report,
                "permissions",
                roles::load_permissions(self.client, self.store, self.log),
            )
            .await;
        }

        if self.set.enabled(EntityCategory::Extensions) {
            self.stage(
                &mut report,
                "extensions",
                misc::load_extensions(self.client, self.store, self.log),
            )
            .await;
        }

        Ok(report)
    }

    async fn stage(
        &self,
        report: &mut RunReport,
        name: &str,
        work: impl Future<Output = Result<StageOutcome>>,
    ) {
        match work.await {
            Ok(outcome) => {
                self.log.write(&format!("apply {}: {:?}", name, outcome));
                report.record(name, outcome);
            }
            Err(err) => {
                warn!("apply {} failed: {:#}", name, err);
                self.log.write(&format!("apply {} failed: {:#}", name, err));
                report.warn(format!("apply {} failed: {}", name, err));
                report.record(name, StageOutcome::Failed(format!("{:#}", err)));
            }
        }
    }
}

/// Whether an API error means the record already exists at the
/// destination. Treated as success-by-skip to keep re-runs safe.
pub(crate) fn is_already_exists(err: &ApiError) -> bool {
    err.has_code("RECORD_NOT_UNIQUE") || err.status() == Some(409)
}

/// Outcome counters for a per-record creation loop
#[derive(Debug, Default)]
pub(crate) struct BatchTally {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn outcome(&self, what: &str) -> StageOutcome {
        if self.failed > 0 {
            StageOutcome::Failed(format!(
                "{}: {} created, {} skipped, {} failed",
                what, self.created, self.skipped, self.failed
            ))
        } else if self.created == 0 && self.skipped == 0 {
            StageOutcome::Skipped(format!("no {} in template", what))
        } else {
            StageOutcome::Ok
        }
    }
}

/// Create each record at `path`, skipping already-existing ones and
/// isolating per-record failures.
pub(crate) async fn create_each(
    client: &DirectusClient,
    log: &RunLog,
    path: &str,
    what: &str,
    records: &[Value],
) -> BatchTally {
    let mut tally = BatchTally::default();
    for record in records {
        match client.post(path, record).await {
            Ok(_) => tally.created += 1,
            Err(err) if is_already_exists(&err) => tally.skipped += 1,
            Err(err) => {
                tally.failed += 1;
                log.write(&format!("apply {}: record failed: {}", what, err));
                warn!("apply {}: record failed: {}", what, err);
            }
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_already_exists_detection() {
        let conflict = ApiError::from_body(
            400,
            &json!({"errors": [{"message": "dup", "extensions": {"code": "RECORD_NOT_UNIQUE"}}]}),
        );
        assert!(is_already_exists(&conflict));

        let http_conflict = ApiError::from_body(409, &json!({}));
        assert!(is_already_exists(&http_conflict));

        let other = ApiError::from_body(403, &json!({}));
        assert!(!is_already_exists(&other));
        assert!(!is_already_exists(&ApiError::Transport("x".into())));
    }

    #[test]
    fn test_tally_outcomes() {
        let ok = BatchTally {
            created: 3,
            skipped: 1,
            failed: 0,
        };
        assert_eq!(ok.outcome("roles"), StageOutcome::Ok);

        let empty = BatchTally::default();
        assert!(matches!(empty.outcome("roles"), StageOutcome::Skipped(_)));

        let failed = BatchTally {
            created: 1,
            skipped: 0,
            failed: 2,
        };
        assert!(matches!(failed.outcome("roles"), StageOutcome::Failed(_)));
    }
}
