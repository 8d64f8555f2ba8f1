//! Entity kind table and dependency ordering
//!
//! The transfer engine operates over a closed set of entity kinds. Each
//! kind knows its template file name, its API path, and the category flag
//! that toggles it. Stage ordering is not hand-sequenced: each kind
//! declares its prerequisites and the orchestrators walk a topological
//! order, so the dependency contract is enforceable and testable.

use std::collections::{HashMap, HashSet, VecDeque};

use super::flags::EntityCategory;

/// A concrete API resource moved by the transfer engine.
///
/// Content records are not listed here: they are per-collection and handled
/// by their own pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Collections,
    Fields,
    Relations,
    Folders,
    Files,
    Roles,
    Policies,
    Access,
    Permissions,
    Users,
    Presets,
    Translations,
    Flows,
    Operations,
    Dashboards,
    Panels,
    Settings,
    Extensions,
}

impl EntityKind {
    /// All kinds in extract order (producers before consumers)
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::Collections,
        EntityKind::Fields,
        EntityKind::Relations,
        EntityKind::Folders,
        EntityKind::Files,
        EntityKind::Roles,
        EntityKind::Policies,
        EntityKind::Access,
        EntityKind::Permissions,
        EntityKind::Users,
        EntityKind::Presets,
        EntityKind::Translations,
        EntityKind::Flows,
        EntityKind::Operations,
        EntityKind::Dashboards,
        EntityKind::Panels,
        EntityKind::Settings,
        EntityKind::Extensions,
    ];

    /// File name at the template root holding this kind's records
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Collections => "collections.json",
            Self::Fields => "fields.json",
            Self::Relations => "relations.json",
            Self::Folders => "folders.json",
            Self::Files => "files.json",
            Self::Roles => "roles.json",
            Self::Policies => "policies.json",
            Self::Access => "access.json",
            Self::Permissions => "permissions.json",
            Self::Users => "users.json",
            Self::Presets => "presets.json",
            Self::Translations => "translations.json",
            Self::Flows => "flows.json",
            Self::Operations => "operations.json",
            Self::Dashboards => "dashboards.json",
            Self::Panels => "panels.json",
            Self::Settings => "settings.json",
            Self::Extensions => "extensions.json",
        }
    }

    /// API path serving this kind
    pub fn api_path(&self) -> &'static str {
        match self {
            Self::Collections => "/collections",
            Self::Fields => "/fields",
            Self::Relations => "/relations",
            Self::Folders => "/folders",
            Self::Files => "/files",
            Self::Roles => "/roles",
            Self::Policies => "/policies",
            Self::Access => "/access",
            Self::Permissions => "/permissions",
            Self::Users => "/users",
            Self::Presets => "/presets",
            Self::Translations => "/translations",
            Self::Flows => "/flows",
            Self::Operations => "/operations",
            Self::Dashboards => "/dashboards",
            Self::Panels => "/panels",
            Self::Settings => "/settings",
            Self::Extensions => "/extensions",
        }
    }

    /// Which toggleable category enables this kind
    pub fn category(&self) -> EntityCategory {
        match self {
            Self::Collections | Self::Fields | Self::Relations => EntityCategory::Schema,
            Self::Folders | Self::Files => EntityCategory::Files,
            Self::Roles | Self::Policies | Self::Access | Self::Permissions => {
                EntityCategory::Permissions
            }
            Self::Users => EntityCategory::Users,
            Self::Presets | Self::Translations | Self::Settings => EntityCategory::Settings,
            Self::Flows | Self::Operations => EntityCategory::Flows,
            Self::Dashboards | Self::Panels => EntityCategory::Dashboards,
            Self::Extensions => EntityCategory::Extensions,
        }
    }

    /// Kinds that must be transferred before this one
    pub fn prerequisites(&self) -> &'static [EntityKind] {
        match self {
            Self::Collections => &[],
            Self::Fields => &[EntityKind::Collections],
            Self::Relations => &[EntityKind::Fields],
            Self::Folders => &[],
            Self::Files => &[EntityKind::Folders],
            Self::Roles => &[],
            Self::Policies => &[EntityKind::Roles],
            Self::Access => &[EntityKind::Policies],
            Self::Permissions => &[EntityKind::Policies],
            Self::Users => &[EntityKind::Roles],
            Self::Presets => &[],
            Self::Translations => &[],
            Self::Flows => &[],
            Self::Operations => &[EntityKind::Flows],
            Self::Dashboards => &[],
            Self::Panels => &[EntityKind::Dashboards],
            Self::Settings => &[],
            Self::Extensions => &[],
        }
    }

    /// Whether the API serves this kind as a single object instead of an
    /// array
    pub fn is_singleton(&self) -> bool {
        matches!(self, Self::Settings)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // File name minus the extension doubles as the display name.
        let name = self.file_name().trim_end_matches(".json");
        write!(f, "{}", name)
    }
}

/// Order `candidates` so every kind follows its prerequisites, using
/// Kahn's algorithm. Candidate order is the tie-break, so callers control
/// the ordering among independent kinds. Prerequisites outside
/// `candidates` are ignored; they belong to disabled categories.
pub fn ordered(candidates: &[EntityKind]) -> Result<Vec<EntityKind>, CycleError> {
    let selected: HashSet<EntityKind> = candidates.iter().copied().collect();

    let mut in_degree: HashMap<EntityKind, usize> = HashMap::new();
    let mut dependents: HashMap<EntityKind, Vec<EntityKind>> = HashMap::new();

    for &kind in candidates {
        let deps: Vec<EntityKind> = kind
            .prerequisites()
            .iter()
            .copied()
            .filter(|p| selected.contains(p))
            .collect();
        in_degree.insert(kind, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(kind);
        }
    }

    let mut queue: VecDeque<EntityKind> = candidates
        .iter()
        .copied()
        .filter(|k| in_degree[k] == 0)
        .collect();
    let mut result = Vec::with_capacity(candidates.len());

    while let Some(kind) = queue.pop_front() {
        result.push(kind);
        if let Some(next) = dependents.get(&kind) {
            for &dependent in next {
                let count = in_degree
                    .get_mut(&dependent)
                    .expect("dependent missing from in-degree map");
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if result.len() != candidates.len() {
        let remaining: Vec<EntityKind> = candidates
            .iter()
            .copied()
            .filter(|k| !result.contains(k))
            .collect();
        return Err(CycleError { kinds: remaining });
    }

    Ok(result)
}

/// Error when the prerequisite table contains a cycle
#[derive(Debug, Clone)]
pub struct CycleError {
    pub kinds: Vec<EntityKind>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.kinds.iter().map(|k| k.to_string()).collect();
        write!(
            f,
            "Circular dependency detected involving: {}",
            names.join(", ")
        )
    }
}

impl std::error::Error for CycleError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[EntityKind], kind: EntityKind) -> usize {
        order.iter().position(|&k| k == kind).unwrap()
    }

    #[test]
    fn test_full_order_respects_all_prerequisites() {
        let order = ordered(EntityKind::ALL).unwrap();
        assert_eq!(order.len(), EntityKind::ALL.len());

        for &kind in &order {
            for &prereq in kind.prerequisites() {
                assert!(
                    position(&order, prereq) < position(&order, kind),
                    "{} must come before {}",
                    prereq,
                    kind
                );
            }
        }
    }

    #[test]
    fn test_schema_chain_order() {
        let order = ordered(EntityKind::ALL).unwrap();
        assert!(position(&order, EntityKind::Collections) < position(&order, EntityKind::Fields));
        assert!(position(&order, EntityKind::Fields) < position(&order, EntityKind::Relations));
        assert!(position(&order, EntityKind::Folders) < position(&order, EntityKind::Files));
        assert!(position(&order, EntityKind::Roles) < position(&order, EntityKind::Users));
        assert!(position(&order, EntityKind::Flows) < position(&order, EntityKind::Operations));
    }

    #[test]
    fn test_candidate_order_breaks_ties() {
        let order = ordered(&[EntityKind::Settings, EntityKind::Translations]).unwrap();
        assert_eq!(order, vec![EntityKind::Settings, EntityKind::Translations]);
    }

    #[test]
    fn test_missing_prerequisite_is_ignored() {
        // Files without Folders in the candidate set: the prerequisite
        // belongs to a disabled category and must not block ordering.
        let order = ordered(&[EntityKind::Files]).unwrap();
        assert_eq!(order, vec![EntityKind::Files]);
    }

    #[test]
    fn test_every_kind_has_unique_file_name() {
        let mut seen = HashSet::new();
        for kind in EntityKind::ALL {
            assert!(seen.insert(kind.file_name()), "duplicate {}", kind);
        }
    }
}
