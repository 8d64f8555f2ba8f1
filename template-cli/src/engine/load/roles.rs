//! Roles, policies, access, and permissions loading
//!
//! The destination administrator role is never created: the template role
//! named "Administrator" is matched to the destination's by name and
//! updated in place, so the operator's own session keeps working. The
//! built-in public policy ships with every instance and is never created.

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::Value;

use crate::api::{DirectusClient, item_path};
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, StageOutcome};
use crate::template::TemplateStore;

/// Policy ID every instance ships with for unauthenticated access
pub const PUBLIC_POLICY_ID: &str = "abf8a154-5b1c-4a46-ac9c-7300570f4f17";

const ADMIN_ROLE_NAME: &str = "Administrator";

/// Find the administrator role's ID in a set of role records, by name
pub fn admin_role_id(roles: &[Value]) -> Option<String> {
    roles.iter().find_map(|role| {
        if role.get("name").and_then(|n| n.as_str()) == Some(ADMIN_ROLE_NAME) {
            role.get("id").and_then(|i| i.as_str()).map(String::from)
        } else {
            None
        }
    })
}

/// Role payload without its membership aliases. Users attach through
/// their own records, policies through access records, and children
/// through each child's `parent` field; the source arrays reference IDs
/// that do not exist yet at the destination.
fn portable_role(role: &Value, keep_id: bool) -> Value {
    let mut record = role.clone();
    if let Some(map) = record.as_object_mut() {
        map.remove("users");
        map.remove("policies");
        map.remove("children");
        if !keep_id {
            map.remove("id");
        }
    }
    record
}

pub async fn load_roles(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(roles) = store.read_entities(EntityKind::Roles)? else {
        return Ok(StageOutcome::Skipped("no roles.json".into()));
    };

    let existing = client
        .get_with_query("/roles", &[("limit", "-1"), ("fields", "id,name")])
        .await
        .context("Failed to list destination roles")?;
    let existing = existing.as_array().cloned().unwrap_or_default();
    let dest_admin = admin_role_id(&existing);

    let mut tally = super::BatchTally::default();
    for role in &roles {
        let name = role.get("name").and_then(|n| n.as_str()).unwrap_or("");

        if name == ADMIN_ROLE_NAME {
            let Some(dest_id) = dest_admin.as_deref() else {
                warn!("destination has no {} role; skipping", ADMIN_ROLE_NAME);
                tally.skipped += 1;
                continue;
            };
            // The destination keeps its own ID.
            let update = portable_role(role, false);
            match client.patch(&item_path("/roles", dest_id), &update).await {
                Ok(_) => {
                    info!("updated administrator role in place");
                    tally.created += 1;
                }
                Err(err) => {
                    tally.failed += 1;
                    log.write(&format!("apply roles: administrator update failed: {}", err));
                    warn!("administrator role update failed: {}", err);
                }
            }
            continue;
        }

        match client.post("/roles", &portable_role(role, true)).await {
            Ok(_) => tally.created += 1,
            Err(err) if super::is_already_exists(&err) => tally.skipped += 1,
            Err(err) => {
                tally.failed += 1;
                log.write(&format!("apply roles: {} failed: {}", name, err));
                warn!("role {} failed: {}", name, err);
            }
        }
    }

    Ok(tally.outcome("roles"))
}

pub async fn load_policies(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(policies) = store.read_entities(EntityKind::Policies)? else {
        return Ok(StageOutcome::Skipped("no policies.json".into()));
    };

    let mut tally = super::BatchTally::default();
    for policy in &policies {
        let id = policy.get("id").and_then(|i| i.as_str()).unwrap_or("");
        if id == PUBLIC_POLICY_ID {
            tally.skipped += 1;
            continue;
        }

        let mut record = policy.clone();
        if let Some(map) = record.as_object_mut() {
            // Membership joins are carried by the access records.
            map.remove("roles");
            map.remove("users");
            map.remove("permissions");
        }
        match client.post("/policies", &record).await {
            Ok(_) => tally.created += 1,
            Err(err) if super::is_already_exists(&err) => tally.skipped += 1,
            Err(err) => {
                tally.failed += 1;
                log.write(&format!("apply policies: {} failed: {}", id, err));
                warn!("policy {} failed: {}", id, err);
            }
        }
    }

    Ok(tally.outcome("policies"))
}

/// Access records join policies to roles and users
pub async fn load_access(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(access) = store.read_entities(EntityKind::Access)? else {
        return Ok(StageOutcome::Skipped("no access.json".into()));
    };

    let tally = super::create_each(client, log, "/access", "access", &access).await;
    Ok(tally.outcome("access records"))
}

/// Permissions are recreated fresh: IDs are plain integers with no
/// cross-instance meaning, so carrying them over would collide.
pub async fn load_permissions(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(permissions) = store.read_entities(EntityKind::Permissions)? else {
        return Ok(StageOutcome::Skipped("no permissions.json".into()));
    };

    let stripped: Vec<Value> = permissions
        .iter()
        .map(|p| {
            let mut record = p.clone();
            if let Some(map) = record.as_object_mut() {
                map.remove("id");
            }
            record
        })
        .collect();

    let tally = super::create_each(client, log, "/permissions", "permissions", &stripped).await;
    Ok(tally.outcome("permissions"))
}
