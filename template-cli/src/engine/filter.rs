//! Field filtering for system-collection payloads
//!
//! Role and user records are reduced to their portable shape at
//! extraction. Fields in the per-kind allow-list survive unchanged.
//! Outside the allow-list, relational aliases (arrays of integer or UUID
//! foreign keys left behind by custom fields on system collections) are
//! nulled, since the referenced rows repopulate them when their own data
//! loads and stale cross-instance IDs would corrupt relationships; every
//! other field is instance-internal state (`last_access` and the like)
//! and is dropped entirely.

use serde_json::Value;
use uuid::Uuid;

/// System fields on role records that survive extraction
pub const ROLE_FIELDS: &[&str] = &[
    "id",
    "name",
    "icon",
    "description",
    "parent",
    "children",
    "policies",
    "users",
];

/// System fields on user records that survive extraction
pub const USER_FIELDS: &[&str] = &[
    "id",
    "first_name",
    "last_name",
    "email",
    "location",
    "title",
    "description",
    "tags",
    "avatar",
    "language",
    "appearance",
    "tfa_secret",
    "status",
    "role",
    "policies",
    "provider",
    "external_identifier",
    "email_notifications",
];

fn is_uuid_string(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| Uuid::parse_str(s).is_ok())
}

/// Whether a value is a non-empty array made up exclusively of integers or
/// exclusively of UUID-formatted strings
fn is_relational_alias(value: &Value) -> bool {
    let Some(items) = value.as_array() else {
        return false;
    };
    if items.is_empty() {
        return false;
    }
    items.iter().all(|v| v.is_i64() || v.is_u64())
        || items.iter().all(is_uuid_string)
}

/// Reduce a record to its portable fields: allow-listed fields are kept,
/// relational aliases outside the allow-list are nulled, and all other
/// non-listed fields are dropped.
pub fn filter_system_fields(record: &mut Value, allowed: &[&str]) {
    let Some(map) = record.as_object_mut() else {
        return;
    };

    map.retain(|key, value| {
        if allowed.contains(&key.as_str()) {
            return true;
        }
        if is_relational_alias(value) {
            *value = Value::Null;
            return true;
        }
        false
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_alias_is_nulled() {
        let mut record = json!({
            "id": "x",
            "title": "hello",
            "related_ids": [1, 2, 3]
        });

        filter_system_fields(&mut record, USER_FIELDS);
        assert_eq!(record["related_ids"], Value::Null);
        assert_eq!(record["title"], json!("hello"));
    }

    #[test]
    fn test_uuid_alias_is_nulled() {
        let mut record = json!({
            "linked": [
                "0193b8ba-ea48-7a9f-87cc-1a1e0b2c4f10",
                "7d2e1c3a-0f4b-4c5d-8e6f-9a0b1c2d3e4f"
            ]
        });

        filter_system_fields(&mut record, USER_FIELDS);
        assert_eq!(record["linked"], Value::Null);
    }

    #[test]
    fn test_allow_listed_field_is_kept() {
        let mut record = json!({
            "policies": [1, 2, 3],
            "children": ["7d2e1c3a-0f4b-4c5d-8e6f-9a0b1c2d3e4f"]
        });

        filter_system_fields(&mut record, ROLE_FIELDS);
        assert_eq!(record["policies"], json!([1, 2, 3]));
        assert_eq!(
            record["children"],
            json!(["7d2e1c3a-0f4b-4c5d-8e6f-9a0b1c2d3e4f"])
        );
    }

    #[test]
    fn test_non_listed_scalar_fields_are_dropped() {
        let mut record = json!({
            "id": "u1",
            "email": "a@b.c",
            "last_access": "2024-01-01T00:00:00Z",
            "theme_dark_overrides": {"accent": "#fff"},
            "auth_data": "opaque"
        });

        filter_system_fields(&mut record, USER_FIELDS);
        assert_eq!(record["id"], json!("u1"));
        assert_eq!(record["email"], json!("a@b.c"));
        assert!(record.get("last_access").is_none());
        assert!(record.get("theme_dark_overrides").is_none());
        assert!(record.get("auth_data").is_none());
    }

    #[test]
    fn test_non_alias_arrays_outside_allow_list_are_dropped() {
        let mut record = json!({
            "mixed": [1, "not-a-uuid"],
            "strings": ["a", "b"],
            "empty": [],
            "nested": [{"id": 1}]
        });

        filter_system_fields(&mut record, USER_FIELDS);
        assert!(record.get("mixed").is_none());
        assert!(record.get("strings").is_none());
        assert!(record.get("empty").is_none());
        assert!(record.get("nested").is_none());
    }

    #[test]
    fn test_non_object_record_is_a_no_op() {
        let mut record = json!([1, 2, 3]);
        filter_system_fields(&mut record, USER_FIELDS);
        assert_eq!(record, json!([1, 2, 3]));
    }
}
