//! User loading
//!
//! Users referencing the source administrator role are remapped onto the
//! destination's own administrator role so the instance never ends up with
//! two. Credentials and session residue never travel between instances.

use anyhow::{Context, Result};
use log::warn;
use serde_json::Value;

use crate::api::DirectusClient;
use crate::engine::entity::EntityKind;
use crate::engine::report::{RunLog, StageOutcome};
use crate::template::TemplateStore;

use super::roles::admin_role_id;

/// Fields removed from every user before creation
const STRIPPED_FIELDS: &[&str] = &["password", "token", "last_page", "policies"];

pub async fn load_users(
    client: &DirectusClient,
    store: &TemplateStore,
    log: &RunLog,
) -> Result<StageOutcome> {
    let Some(users) = store.read_entities(EntityKind::Users)? else {
        return Ok(StageOutcome::Skipped("no users.json".into()));
    };

    let source_admin = store
        .read_entities(EntityKind::Roles)?
        .as_deref()
        .and_then(admin_role_id);

    let me = client
        .me()
        .await
        .context("Failed to resolve the destination session")?;
    let dest_admin = me
        .get("role")
        .and_then(|r| r.as_str())
        .context("Session user has no role; cannot remap the administrator role")?
        .to_string();

    let mut tally = super::BatchTally::default();
    for user in &users {
        let mut record = user.clone();
        sanitize_user(&mut record, source_admin.as_deref(), &dest_admin);

        let label = record
            .get("id")
            .and_then(|i| i.as_str())
            .unwrap_or("<no id>")
            .to_string();
        match client.post("/users", &record).await {
            Ok(_) => tally.created += 1,
            Err(err) if super::is_already_exists(&err) => tally.skipped += 1,
            Err(err) => {
                tally.failed += 1;
                log.write(&format!("apply users: {} failed: {}", label, err));
                warn!("user {} failed: {}", label, err);
            }
        }
    }

    Ok(tally.outcome("users"))
}

/// Strip non-portable fields, drop a null email (the endpoint rejects an
/// explicit null), and remap the administrator role reference.
fn sanitize_user(user: &mut Value, source_admin: Option<&str>, dest_admin: &str) {
    let Some(map) = user.as_object_mut() else {
        return;
    };

    for field in STRIPPED_FIELDS {
        map.remove(*field);
    }
    if map.get("email").is_some_and(|e| e.is_null()) {
        map.remove("email");
    }

    let references_source_admin = map
        .get("role")
        .and_then(|r| r.as_str())
        .is_some_and(|role| source_admin == Some(role));
    if references_source_admin {
        map.insert("role".to_string(), Value::String(dest_admin.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_credentials_and_session_residue() {
        let mut user = json!({
            "id": "u1",
            "email": "a@b.c",
            "password": "secret",
            "token": "tok",
            "last_page": "/content",
            "policies": ["p1"],
            "role": "r1"
        });
        sanitize_user(&mut user, None, "dest-admin");

        assert!(user.get("password").is_none());
        assert!(user.get("token").is_none());
        assert!(user.get("last_page").is_none());
        assert!(user.get("policies").is_none());
        assert_eq!(user["email"], json!("a@b.c"));
    }

    #[test]
    fn test_sanitize_drops_null_email() {
        let mut user = json!({"id": "u1", "email": null});
        sanitize_user(&mut user, None, "dest-admin");
        assert!(user.get("email").is_none());
    }

    #[test]
    fn test_admin_role_remapped_others_kept() {
        let mut admin = json!({"id": "u1", "role": "src-admin"});
        sanitize_user(&mut admin, Some("src-admin"), "dest-admin");
        assert_eq!(admin["role"], json!("dest-admin"));

        let mut editor = json!({"id": "u2", "role": "editor"});
        sanitize_user(&mut editor, Some("src-admin"), "dest-admin");
        assert_eq!(editor["role"], json!("editor"));
    }
}
