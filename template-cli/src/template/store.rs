//! On-disk template store
//!
//! A template is a directory: one JSON file per entity kind at the root,
//! `content/<collection>.json` per user collection, binary files under
//! `assets/`, the full schema snapshot under `schema/snapshot.json`, and a
//! `package.json` with template metadata.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::engine::entity::EntityKind;

const CONTENT_DIR: &str = "content";
const ASSETS_DIR: &str = "assets";
const SCHEMA_DIR: &str = "schema";
const SNAPSHOT_FILE: &str = "snapshot.json";
const PACKAGE_FILE: &str = "package.json";

/// Reads and writes one template directory
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory skeleton for extraction
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.root.join(CONTENT_DIR),
            self.root.join(ASSETS_DIR),
            self.root.join(SCHEMA_DIR),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Fatal-precondition check before apply: a template without schema
    /// files cannot seed anything else.
    pub fn validate_for_apply(&self) -> Result<()> {
        let snapshot = self.root.join(SCHEMA_DIR).join(SNAPSHOT_FILE);
        let collections = self.root.join(EntityKind::Collections.file_name());
        if !snapshot.exists() && !collections.exists() {
            bail!(
                "Template at {} has no schema snapshot and no collections.json; not a usable template",
                self.root.display()
            );
        }
        Ok(())
    }

    pub fn write_entities(&self, kind: EntityKind, records: &[Value]) -> Result<()> {
        self.write_json(&self.root.join(kind.file_name()), &Value::Array(records.to_vec()))
    }

    /// Read an entity file. `None` means the file is absent from the
    /// template (distinct from an empty list).
    pub fn read_entities(&self, kind: EntityKind) -> Result<Option<Vec<Value>>> {
        match self.read_json(&self.root.join(kind.file_name()))? {
            None => Ok(None),
            Some(Value::Array(records)) => Ok(Some(records)),
            Some(other) => {
                // A singleton entity written as a single object.
                Ok(Some(vec![other]))
            }
        }
    }

    pub fn write_singleton(&self, kind: EntityKind, record: &Value) -> Result<()> {
        self.write_json(&self.root.join(kind.file_name()), record)
    }

    pub fn read_singleton(&self, kind: EntityKind) -> Result<Option<Value>> {
        self.read_json(&self.root.join(kind.file_name()))
    }

    pub fn write_snapshot(&self, snapshot: &Value) -> Result<()> {
        self.write_json(&self.root.join(SCHEMA_DIR).join(SNAPSHOT_FILE), snapshot)
    }

    pub fn read_snapshot(&self) -> Result<Option<Value>> {
        self.read_json(&self.root.join(SCHEMA_DIR).join(SNAPSHOT_FILE))
    }

    pub fn write_package(&self, metadata: &Value) -> Result<()> {
        self.write_json(&self.root.join(PACKAGE_FILE), metadata)
    }

    pub fn read_package(&self) -> Result<Option<Value>> {
        self.read_json(&self.root.join(PACKAGE_FILE))
    }

    /// Write one collection's records (array, or object for singletons)
    pub fn write_content(&self, collection: &str, records: &Value) -> Result<()> {
        let path = self.content_path(collection)?;
        self.write_json(&path, records)
    }

    pub fn read_content(&self, collection: &str) -> Result<Option<Value>> {
        let path = self.content_path(collection)?;
        self.read_json(&path)
    }

    /// Collections with a content file, sorted by name
    pub fn content_collections(&self) -> Result<Vec<String>> {
        let dir = self.root.join(CONTENT_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut collections = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(collection) = name.strip_suffix(".json") {
                collections.push(collection.to_string());
            }
        }
        collections.sort();
        Ok(collections)
    }

    pub fn write_asset(&self, filename_disk: &str, bytes: &[u8]) -> Result<()> {
        let path = self.asset_path(filename_disk)?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write asset {}", path.display()))
    }

    pub fn read_asset(&self, filename_disk: &str) -> Result<Option<Vec<u8>>> {
        let path = self.asset_path(filename_disk)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read asset {}", path.display()))?;
        Ok(Some(bytes))
    }

    pub fn has_asset(&self, filename_disk: &str) -> bool {
        self.asset_path(filename_disk)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    fn content_path(&self, collection: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(CONTENT_DIR)
            .join(format!("{}.json", safe_name(collection)?)))
    }

    fn asset_path(&self, filename_disk: &str) -> Result<PathBuf> {
        Ok(self.root.join(ASSETS_DIR).join(safe_name(filename_disk)?))
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(value)?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn read_json(&self, path: &Path) -> Result<Option<Value>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        Ok(Some(value))
    }
}

/// Reject names that would escape the template directory
fn safe_name(name: &str) -> Result<&str> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
    {
        bail!("Unsafe file name in template: {:?}", name);
    }
    Ok(name)
}
