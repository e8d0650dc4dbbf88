//! Initial policies from a KDL seed file.
//!
//! ```kdl
//! module "jlpt" enabled=#false
//!
//! level "n1" module="level" access="restricted" {
//!     roles {
//!         - "user"
//!     }
//!     users {
//!         - "u-42"
//!     }
//! }
//!
//! dashboard locked=#true {
//!     roles {
//!         - "editor"
//!     }
//! }
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use kdl::{KdlDocument, KdlNode};

use crate::access::errors::AccessError;
use crate::access::store::{ConfigStore, PolicyDocument};
use crate::access::types::{
    AccessPolicy, ContentModule, DashboardPolicy, Level, LevelPolicies, ModuleSwitch, PolicyKey,
    Role,
};

/// Policy documents described by a seed file, grouped by storage key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySeed {
    pub modules: BTreeMap<&'static str, (ContentModule, ModuleSwitch)>,
    pub levels: BTreeMap<&'static str, (ContentModule, LevelPolicies)>,
    pub dashboard: Option<DashboardPolicy>,
}

/// Keys written and skipped by `apply_seed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub written: Vec<PolicyKey>,
    pub skipped: Vec<PolicyKey>,
}

pub fn load_seed(path: &Path) -> Result<PolicySeed, AccessError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AccessError::SeedLoad {
        path: path.display().to_string(),
        source,
    })?;
    parse_seed(&contents)
}

pub fn parse_seed(source: &str) -> Result<PolicySeed, AccessError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AccessError::KdlParse(e.to_string()))?;

    let mut seed = PolicySeed::default();

    for node in doc.nodes() {
        match node.name().value() {
            "module" => {
                let module = content_module_arg(node)?;
                let enabled = bool_property(node, "enabled", true, "module")?;
                seed.modules.insert(
                    module.switch_key().as_str(),
                    (module, ModuleSwitch { enabled }),
                );
            }
            "level" => {
                let level: Level = first_string_arg(node)
                    .ok_or_else(|| {
                        AccessError::InvalidPolicy(
                            "level node requires a level id argument (e.g. level \"n1\")".into(),
                        )
                    })?
                    .parse()?;
                let module: ContentModule = node
                    .get("module")
                    .and_then(|v| v.as_string())
                    .ok_or_else(|| {
                        AccessError::InvalidPolicy(format!(
                            "level `{level}` missing `module` property (e.g. module=\"jlpt\")"
                        ))
                    })?
                    .parse()?;
                let policy = level_policy(node, level)?;
                seed.levels
                    .entry(module.levels_key().as_str())
                    .or_insert_with(|| (module, LevelPolicies::new()))
                    .1
                    .insert(level, policy);
            }
            "dashboard" => {
                let default_locked = bool_property(node, "locked", true, "dashboard")?;
                let (allowed_roles, allowed_users) = allowlists(node, "dashboard")?;
                seed.dashboard = Some(DashboardPolicy {
                    default_locked,
                    allowed_roles,
                    allowed_users,
                });
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(seed)
}

/// Write the seed into `store`.
///
/// Level rules are merged per level: seeded levels missing from the stored
/// document are added, levels already there are kept. A switch or dashboard
/// document is only kept when it differs from its default, since reads
/// materialize defaults before any seed runs. `force` overwrites every
/// seeded document and level.
pub fn apply_seed(
    store: &ConfigStore,
    seed: &PolicySeed,
    force: bool,
) -> Result<SeedReport, AccessError> {
    let mut report = SeedReport::default();

    for (module, switch) in seed.modules.values() {
        let key = module.switch_key();
        if !force && holds_edit::<ModuleSwitch>(store, key) {
            report.skipped.push(key);
            continue;
        }
        store.set(key, switch)?;
        report.written.push(key);
    }

    for (module, policies) in seed.levels.values() {
        let key = module.levels_key();
        let mut stored = match store.try_get::<LevelPolicies>(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => LevelPolicies::new(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Replacing unreadable policy from seed");
                LevelPolicies::new()
            }
        };
        let mut changed = false;
        for (level, policy) in policies.iter() {
            if force || !stored.contains(*level) {
                stored.insert(*level, policy.clone());
                changed = true;
            }
        }
        if changed {
            store.set(key, &stored)?;
            report.written.push(key);
        } else {
            report.skipped.push(key);
        }
    }

    if let Some(dashboard) = &seed.dashboard {
        let key = PolicyKey::DashboardAccess;
        if !force && holds_edit::<DashboardPolicy>(store, key) {
            report.skipped.push(key);
        } else {
            store.set(key, dashboard)?;
            report.written.push(key);
        }
    }

    tracing::info!(
        written = report.written.len(),
        skipped = report.skipped.len(),
        force,
        "Applied policy seed"
    );
    for key in &report.skipped {
        tracing::info!(key = %key, "Kept stored policy over seed");
    }

    Ok(report)
}

/// Whether `key` holds a readable document other than the default.
fn holds_edit<P: PolicyDocument + PartialEq>(store: &ConfigStore, key: PolicyKey) -> bool {
    matches!(store.try_get::<P>(key), Ok(Some(doc)) if doc != P::default())
}

fn bool_property(
    node: &KdlNode,
    name: &str,
    default: bool,
    context: &str,
) -> Result<bool, AccessError> {
    match node.get(name) {
        None => Ok(default),
        Some(value) => value.as_bool().ok_or_else(|| {
            AccessError::InvalidPolicy(format!(
                "{context} property `{name}` must be #true or #false, got {value:?}"
            ))
        }),
    }
}

fn level_policy(node: &KdlNode, level: Level) -> Result<AccessPolicy, AccessError> {
    let access = node
        .get("access")
        .and_then(|v| v.as_string())
        .unwrap_or("all");
    let context = format!("level `{level}`");
    match access {
        "restricted" => {
            let (allowed_roles, allowed_users) = allowlists(node, &context)?;
            Ok(AccessPolicy::Restricted {
                allowed_roles,
                allowed_users,
            })
        }
        "all" | "none" => {
            if node.children().is_some_and(|c| !c.nodes().is_empty()) {
                return Err(AccessError::InvalidPolicy(format!(
                    "{context} has access=\"{access}\" but lists roles or users (only `restricted` takes allowlists)"
                )));
            }
            Ok(if access == "all" {
                AccessPolicy::All
            } else {
                AccessPolicy::None
            })
        }
        other => Err(AccessError::InvalidPolicy(format!(
            "{context} has unknown access `{other}` (expected `all`, `none` or `restricted`)"
        ))),
    }
}

fn allowlists(
    node: &KdlNode,
    context: &str,
) -> Result<(BTreeSet<Role>, BTreeSet<String>), AccessError> {
    let mut roles = BTreeSet::new();
    let mut users = BTreeSet::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "roles" => {
                    for role in dash_list(child) {
                        roles.insert(role.parse::<Role>()?);
                    }
                }
                "users" => {
                    users.extend(dash_list(child));
                }
                other => {
                    return Err(AccessError::InvalidPolicy(format!(
                        "unexpected child `{other}` in {context} (expected `roles` or `users`)"
                    )));
                }
            }
        }
    }

    Ok((roles, users))
}

fn content_module_arg(node: &KdlNode) -> Result<ContentModule, AccessError> {
    first_string_arg(node)
        .ok_or_else(|| {
            AccessError::InvalidPolicy(
                "module node requires a module argument (e.g. module \"jlpt\")".into(),
            )
        })?
        .parse()
}

fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Nodes named "-" whose first argument is a string.
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
