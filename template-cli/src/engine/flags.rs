//! Flag resolver
//!
//! Computes the effective entity set for a transfer run from the caller's
//! partial/full selection. Pure: no I/O, deterministic for the same input.

use anyhow::{Result, bail};

/// One of the nine toggleable entity categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Schema,
    Permissions,
    Users,
    Files,
    Content,
    Flows,
    Dashboards,
    Settings,
    Extensions,
}

impl EntityCategory {
    pub const ALL: &'static [EntityCategory] = &[
        EntityCategory::Schema,
        EntityCategory::Permissions,
        EntityCategory::Users,
        EntityCategory::Files,
        EntityCategory::Content,
        EntityCategory::Flows,
        EntityCategory::Dashboards,
        EntityCategory::Settings,
        EntityCategory::Extensions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Permissions => "permissions",
            Self::Users => "users",
            Self::Files => "files",
            Self::Content => "content",
            Self::Flows => "flows",
            Self::Dashboards => "dashboards",
            Self::Settings => "settings",
            Self::Extensions => "extensions",
        }
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Raw category flags as supplied by the caller. `None` means unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFlags {
    pub partial: bool,
    pub schema: Option<bool>,
    pub permissions: Option<bool>,
    pub users: Option<bool>,
    pub files: Option<bool>,
    pub content: Option<bool>,
    pub flows: Option<bool>,
    pub dashboards: Option<bool>,
    pub settings: Option<bool>,
    pub extensions: Option<bool>,
}

impl RawFlags {
    fn get(&self, category: EntityCategory) -> Option<bool> {
        match category {
            EntityCategory::Schema => self.schema,
            EntityCategory::Permissions => self.permissions,
            EntityCategory::Users => self.users,
            EntityCategory::Files => self.files,
            EntityCategory::Content => self.content,
            EntityCategory::Flows => self.flows,
            EntityCategory::Dashboards => self.dashboards,
            EntityCategory::Settings => self.settings,
            EntityCategory::Extensions => self.extensions,
        }
    }
}

/// The resolved, immutable entity set for one transfer run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySet {
    schema: bool,
    permissions: bool,
    users: bool,
    files: bool,
    content: bool,
    flows: bool,
    dashboards: bool,
    settings: bool,
    extensions: bool,
}

impl EntitySet {
    /// Every category enabled (full transfer)
    pub fn full() -> Self {
        Self {
            schema: true,
            permissions: true,
            users: true,
            files: true,
            content: true,
            flows: true,
            dashboards: true,
            settings: true,
            extensions: true,
        }
    }

    pub fn enabled(&self, category: EntityCategory) -> bool {
        match category {
            EntityCategory::Schema => self.schema,
            EntityCategory::Permissions => self.permissions,
            EntityCategory::Users => self.users,
            EntityCategory::Files => self.files,
            EntityCategory::Content => self.content,
            EntityCategory::Flows => self.flows,
            EntityCategory::Dashboards => self.dashboards,
            EntityCategory::Settings => self.settings,
            EntityCategory::Extensions => self.extensions,
        }
    }

    fn set(&mut self, category: EntityCategory, value: bool) {
        match category {
            EntityCategory::Schema => self.schema = value,
            EntityCategory::Permissions => self.permissions = value,
            EntityCategory::Users => self.users = value,
            EntityCategory::Files => self.files = value,
            EntityCategory::Content => self.content = value,
            EntityCategory::Flows => self.flows = value,
            EntityCategory::Dashboards => self.dashboards = value,
            EntityCategory::Settings => self.settings = value,
            EntityCategory::Extensions => self.extensions = value,
        }
    }

    /// Enabled categories, in declaration order
    pub fn enabled_categories(&self) -> Vec<EntityCategory> {
        EntityCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.enabled(*c))
            .collect()
    }

    fn is_empty(&self) -> bool {
        EntityCategory::ALL.iter().all(|c| !self.enabled(*c))
    }
}

/// Result of flag resolution: the set plus dependency-correction warnings
#[derive(Debug, Clone)]
pub struct ResolvedFlags {
    pub set: EntitySet,
    pub warnings: Vec<String>,
}

/// Resolve raw flags into the effective entity set.
///
/// Full transfers enable everything. Partial transfers interpret explicit
/// `true` flags as an allow-list, explicit `false` flags (with no trues)
/// as a deny-list, and no flags at all as a full transfer. Dependency
/// corrections are applied afterwards: content pulls in schema and files,
/// users pulls in permissions.
pub fn resolve(flags: &RawFlags) -> Result<ResolvedFlags> {
    let mut set = EntitySet::full();
    let mut warnings = Vec::new();

    if flags.partial {
        let has_true = EntityCategory::ALL
            .iter()
            .any(|c| flags.get(*c) == Some(true));
        let has_false = EntityCategory::ALL
            .iter()
            .any(|c| flags.get(*c) == Some(false));

        if has_true {
            // Allow-list: only explicitly-enabled categories.
            for &category in EntityCategory::ALL {
                set.set(category, flags.get(category) == Some(true));
            }
        } else if has_false {
            // Deny-list: everything except explicitly-disabled categories.
            for &category in EntityCategory::ALL {
                set.set(category, flags.get(category) != Some(false));
            }
        }
        // No explicit flags at all: fall through to a full transfer.
    }

    // Dependency corrections. Content cannot load into collections,
    // fields, or files that do not exist; users reference roles and
    // policies.
    if set.enabled(EntityCategory::Content) {
        for dep in [EntityCategory::Schema, EntityCategory::Files] {
            if !set.enabled(dep) {
                warnings.push(format!("content requires {}; enabling it", dep));
                set.set(dep, true);
            }
        }
    }
    if set.enabled(EntityCategory::Users) && !set.enabled(EntityCategory::Permissions) {
        warnings.push("users requires permissions; enabling it".to_string());
        set.set(EntityCategory::Permissions, true);
    }

    if set.is_empty() {
        bail!("No entity categories selected; a transfer must do something");
    }

    Ok(ResolvedFlags { set, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(category: EntityCategory) -> RawFlags {
        let mut flags = RawFlags {
            partial: true,
            ..Default::default()
        };
        match category {
            EntityCategory::Schema => flags.schema = Some(true),
            EntityCategory::Permissions => flags.permissions = Some(true),
            EntityCategory::Users => flags.users = Some(true),
            EntityCategory::Files => flags.files = Some(true),
            EntityCategory::Content => flags.content = Some(true),
            EntityCategory::Flows => flags.flows = Some(true),
            EntityCategory::Dashboards => flags.dashboards = Some(true),
            EntityCategory::Settings => flags.settings = Some(true),
            EntityCategory::Extensions => flags.extensions = Some(true),
        }
        flags
    }

    #[test]
    fn test_full_transfer_ignores_individual_flags() {
        let flags = RawFlags {
            partial: false,
            schema: Some(false),
            users: Some(false),
            ..Default::default()
        };

        let resolved = resolve(&flags).unwrap();
        for category in EntityCategory::ALL {
            assert!(resolved.set.enabled(*category), "{} should be enabled", category);
        }
    }

    #[test]
    fn test_partial_with_no_flags_is_full_transfer() {
        let flags = RawFlags {
            partial: true,
            ..Default::default()
        };

        let resolved = resolve(&flags).unwrap();
        assert_eq!(resolved.set, EntitySet::full());
    }

    #[test]
    fn test_allow_list_enables_only_selected() {
        let resolved = resolve(&only(EntityCategory::Flows)).unwrap();

        assert!(resolved.set.enabled(EntityCategory::Flows));
        assert!(!resolved.set.enabled(EntityCategory::Schema));
        assert!(!resolved.set.enabled(EntityCategory::Content));
        assert!(!resolved.set.enabled(EntityCategory::Users));
    }

    #[test]
    fn test_deny_list_disables_only_unselected() {
        let flags = RawFlags {
            partial: true,
            extensions: Some(false),
            dashboards: Some(false),
            ..Default::default()
        };

        let resolved = resolve(&flags).unwrap();
        assert!(!resolved.set.enabled(EntityCategory::Extensions));
        assert!(!resolved.set.enabled(EntityCategory::Dashboards));
        assert!(resolved.set.enabled(EntityCategory::Schema));
        assert!(resolved.set.enabled(EntityCategory::Content));
    }

    #[test]
    fn test_explicit_true_wins_over_explicit_false() {
        // Mixed flags: treated as an allow-list, the false flags are moot.
        let flags = RawFlags {
            partial: true,
            flows: Some(true),
            schema: Some(false),
            ..Default::default()
        };

        let resolved = resolve(&flags).unwrap();
        assert!(resolved.set.enabled(EntityCategory::Flows));
        assert!(!resolved.set.enabled(EntityCategory::Schema));
        assert!(!resolved.set.enabled(EntityCategory::Settings));
    }

    #[test]
    fn test_content_pulls_in_schema_and_files() {
        let resolved = resolve(&only(EntityCategory::Content)).unwrap();

        assert!(resolved.set.enabled(EntityCategory::Content));
        assert!(resolved.set.enabled(EntityCategory::Schema));
        assert!(resolved.set.enabled(EntityCategory::Files));
        assert_eq!(
            resolved.set.enabled_categories(),
            vec![
                EntityCategory::Schema,
                EntityCategory::Files,
                EntityCategory::Content
            ]
        );
        assert_eq!(resolved.warnings.len(), 2);
    }

    #[test]
    fn test_users_pulls_in_permissions() {
        let resolved = resolve(&only(EntityCategory::Users)).unwrap();

        assert!(resolved.set.enabled(EntityCategory::Users));
        assert!(resolved.set.enabled(EntityCategory::Permissions));
        assert!(!resolved.set.enabled(EntityCategory::Schema));
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn test_no_correction_warning_when_already_selected() {
        let mut flags = only(EntityCategory::Content);
        flags.schema = Some(true);
        flags.files = Some(true);

        let resolved = resolve(&flags).unwrap();
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_all_categories_denied_is_an_error() {
        let flags = RawFlags {
            partial: true,
            schema: Some(false),
            permissions: Some(false),
            users: Some(false),
            files: Some(false),
            content: Some(false),
            flows: Some(false),
            dashboards: Some(false),
            settings: Some(false),
            extensions: Some(false),
        };

        assert!(resolve(&flags).is_err());
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let flags = RawFlags {
            partial: true,
            content: Some(true),
            dashboards: Some(false),
            ..Default::default()
        };

        let first = resolve(&flags).unwrap();
        let second = resolve(&flags).unwrap();
        assert_eq!(first.set, second.set);
        assert_eq!(first.warnings, second.warnings);
    }
}
