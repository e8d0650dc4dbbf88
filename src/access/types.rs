use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::access::errors::AccessError;
use crate::access::evaluator::DecisionReason;

/// A gated area of the application: one of the two content modules or the
/// analytics dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Level,
    Jlpt,
    Dashboard,
}

impl Module {
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Level => "level",
            Module::Jlpt => "jlpt",
            Module::Dashboard => "dashboard",
        }
    }

    /// The content module this maps to, `None` for the dashboard.
    pub fn content(self) -> Option<ContentModule> {
        match self {
            Module::Level => Some(ContentModule::Level),
            Module::Jlpt => Some(ContentModule::Jlpt),
            Module::Dashboard => None,
        }
    }
}

impl FromStr for Module {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "level" => Ok(Module::Level),
            "jlpt" => Ok(Module::Jlpt),
            "dashboard" => Ok(Module::Dashboard),
            other => Err(AccessError::UnknownModule(other.to_string())),
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content modules are gated per level and carry a global on/off switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentModule {
    Level,
    Jlpt,
}

impl ContentModule {
    pub const ALL: [ContentModule; 2] = [ContentModule::Level, ContentModule::Jlpt];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentModule::Level => "level",
            ContentModule::Jlpt => "jlpt",
        }
    }

    pub fn switch_key(self) -> PolicyKey {
        match self {
            ContentModule::Level => PolicyKey::LevelModule,
            ContentModule::Jlpt => PolicyKey::JlptModule,
        }
    }

    pub fn levels_key(self) -> PolicyKey {
        match self {
            ContentModule::Level => PolicyKey::LevelAccess,
            ContentModule::Jlpt => PolicyKey::JlptAccess,
        }
    }
}

impl FromStr for ContentModule {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::from_str(s)?
            .content()
            .ok_or_else(|| AccessError::UnknownModule(s.to_string()))
    }
}

impl From<ContentModule> for Module {
    fn from(value: ContentModule) -> Self {
        match value {
            ContentModule::Level => Module::Level,
            ContentModule::Jlpt => Module::Jlpt,
        }
    }
}

/// JLPT proficiency tier. `N5` is the entry level, `N1` the most advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    N1,
    N2,
    N3,
    N4,
    N5,
}

impl Level {
    pub const ALL: [Level; 5] = [Level::N1, Level::N2, Level::N3, Level::N4, Level::N5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::N1 => "n1",
            Level::N2 => "n2",
            Level::N3 => "n3",
            Level::N4 => "n4",
            Level::N5 => "n5",
        }
    }
}

impl FromStr for Level {
    type Err = AccessError;

    /// Case-sensitive: callers normalize before parsing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| AccessError::InvalidLevel(s.to_string()))
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Guest,
    User,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Role::Guest),
            "user" => Ok(Role::User),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(AccessError::InvalidRole(other.to_string())),
        }
    }
}

/// An authenticated principal. Anonymous visitors are represented by the
/// absence of a `User`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Access rule for a single level of a content module.
///
/// Only the `restricted` variant carries allowlists, so an `all` or `none`
/// rule can never hold ignored role or user entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "accessType", rename_all = "lowercase")]
pub enum AccessPolicy {
    #[default]
    All,
    None,
    Restricted {
        #[serde(rename = "allowedRoles", default)]
        allowed_roles: BTreeSet<Role>,
        #[serde(rename = "allowedUsers", default)]
        allowed_users: BTreeSet<String>,
    },
}

impl AccessPolicy {
    pub fn restricted<R, U>(roles: R, users: U) -> Self
    where
        R: IntoIterator<Item = Role>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        AccessPolicy::Restricted {
            allowed_roles: roles.into_iter().collect(),
            allowed_users: users.into_iter().map(Into::into).collect(),
        }
    }
}

/// Global on/off switch of a content module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSwitch {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for ModuleSwitch {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Per-level rules of one content module, keyed by level id.
/// Levels without an entry are open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelPolicies(BTreeMap<Level, AccessPolicy>);

impl LevelPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, level: Level) -> AccessPolicy {
        self.0.get(&level).cloned().unwrap_or_default()
    }

    pub fn contains(&self, level: Level) -> bool {
        self.0.contains_key(&level)
    }

    pub fn insert(&mut self, level: Level, policy: AccessPolicy) {
        self.0.insert(level, policy);
    }

    pub fn remove(&mut self, level: Level) -> Option<AccessPolicy> {
        self.0.remove(&level)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Level, &AccessPolicy)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Dashboard gate. Locked unless configured otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPolicy {
    #[serde(default = "default_locked")]
    pub default_locked: bool,
    #[serde(default)]
    pub allowed_roles: BTreeSet<Role>,
    #[serde(default)]
    pub allowed_users: BTreeSet<String>,
}

fn default_locked() -> bool {
    true
}

impl Default for DashboardPolicy {
    fn default() -> Self {
        Self {
            default_locked: true,
            allowed_roles: BTreeSet::new(),
            allowed_users: BTreeSet::new(),
        }
    }
}

/// Storage keys of the persisted policy documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKey {
    LevelModule,
    JlptModule,
    LevelAccess,
    JlptAccess,
    DashboardAccess,
}

impl PolicyKey {
    pub const ALL: [PolicyKey; 5] = [
        PolicyKey::LevelModule,
        PolicyKey::JlptModule,
        PolicyKey::LevelAccess,
        PolicyKey::JlptAccess,
        PolicyKey::DashboardAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKey::LevelModule => "level-module-policy",
            PolicyKey::JlptModule => "jlpt-module-policy",
            PolicyKey::LevelAccess => "level-access-policy",
            PolicyKey::JlptAccess => "jlpt-access-policy",
            PolicyKey::DashboardAccess => "dashboard-access-policy",
        }
    }
}

impl FromStr for PolicyKey {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| AccessError::UnknownPolicyKey(s.to_string()))
    }
}

impl std::fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- API request/response types ----------

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// e.g. "jlpt"
    pub module: Module,
    /// e.g. "n3"; omitted for the dashboard
    #[serde(default)]
    pub level: Option<Level>,
    /// Omitted for anonymous visitors
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub reason: DecisionReason,
}

#[derive(Debug, Deserialize)]
pub struct LevelsRequest {
    pub module: ContentModule,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Serialize)]
pub struct LevelsResponse {
    pub levels: Vec<Level>,
}
