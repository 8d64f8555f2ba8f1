//! Collection classification helpers
//!
//! Shared by content extraction and loading: which collections carry user
//! content, which are singletons, and where each collection's primary key
//! lives in the field metadata.

use serde_json::Value;

/// A user collection eligible for content transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub singleton: bool,
}

/// Whether a collection record is a folder-like pseudo-collection (no
/// database table behind it)
fn is_folder_collection(collection: &Value) -> bool {
    !collection
        .get("schema")
        .is_some_and(|s| s.is_object())
}

fn is_system_collection(name: &str) -> bool {
    name.starts_with("directus_")
}

/// Collections whose records are transferred: non-system, backed by a
/// table. Singletons are flagged so they can be fetched and updated as a
/// single object.
pub fn user_collections(collections: &[Value]) -> Vec<CollectionInfo> {
    collections
        .iter()
        .filter_map(|c| {
            let name = c.get("collection")?.as_str()?;
            if is_system_collection(name) || is_folder_collection(c) {
                return None;
            }
            let singleton = c
                .pointer("/meta/singleton")
                .and_then(|s| s.as_bool())
                .unwrap_or(false);
            Some(CollectionInfo {
                name: name.to_string(),
                singleton,
            })
        })
        .collect()
}

/// Resolve a collection's primary key field from field metadata
pub fn primary_key_field(fields: &[Value], collection: &str) -> Option<String> {
    fields.iter().find_map(|f| {
        if f.get("collection").and_then(|c| c.as_str()) != Some(collection) {
            return None;
        }
        let is_pk = f
            .pointer("/schema/is_primary_key")
            .and_then(|p| p.as_bool())
            .unwrap_or(false);
        if is_pk {
            f.get("field").and_then(|n| n.as_str()).map(String::from)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_collections_skips_system_and_folders() {
        let collections = vec![
            json!({"collection": "articles", "schema": {"name": "articles"}, "meta": {}}),
            json!({"collection": "directus_users", "schema": {"name": "directus_users"}}),
            json!({"collection": "grouping_folder", "schema": null, "meta": {}}),
            json!({"collection": "globals", "schema": {}, "meta": {"singleton": true}}),
        ];

        let result = user_collections(&collections);
        assert_eq!(
            result,
            vec![
                CollectionInfo {
                    name: "articles".to_string(),
                    singleton: false
                },
                CollectionInfo {
                    name: "globals".to_string(),
                    singleton: true
                },
            ]
        );
    }

    #[test]
    fn test_primary_key_field_resolution() {
        let fields = vec![
            json!({"collection": "articles", "field": "title", "schema": {"is_primary_key": false}}),
            json!({"collection": "articles", "field": "id", "schema": {"is_primary_key": true}}),
            json!({"collection": "authors", "field": "uuid", "schema": {"is_primary_key": true}}),
        ];

        assert_eq!(
            primary_key_field(&fields, "articles"),
            Some("id".to_string())
        );
        assert_eq!(
            primary_key_field(&fields, "authors"),
            Some("uuid".to_string())
        );
        assert_eq!(primary_key_field(&fields, "missing"), None);
    }

    #[test]
    fn test_alias_fields_have_no_schema() {
        let fields = vec![
            json!({"collection": "articles", "field": "related", "schema": null}),
        ];
        assert_eq!(primary_key_field(&fields, "articles"), None);
    }
}
