use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::access::store::ConfigStore;
use crate::access::types::{AccessPolicy, ContentModule, Level, Module, Role, User};

/// Which checks administrators skip.
///
/// Administrators always pass the dashboard check but are held to level
/// rules like everyone else, unless `content` is switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminBypass {
    pub dashboard: bool,
    pub content: bool,
}

impl Default for AdminBypass {
    fn default() -> Self {
        Self {
            dashboard: true,
            content: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AdminBypass,
    ModuleDisabled,
    OpenAccess,
    NoAccess,
    RoleAllowed,
    UserAllowed,
    Anonymous,
    NotAllowed,
}

/// Outcome of an access check, with the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Resolves access decisions against the documents of a `ConfigStore`.
#[derive(Clone)]
pub struct PolicyEvaluator {
    store: ConfigStore,
    bypass: AdminBypass,
}

impl PolicyEvaluator {
    pub fn new(store: ConfigStore, bypass: AdminBypass) -> Self {
        Self { store, bypass }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn bypass(&self) -> AdminBypass {
        self.bypass
    }

    /// Whether `user` (`None` for anonymous) may open `module`, optionally at
    /// a specific `level`. Never fails; unreadable policies fall back to their
    /// defaults.
    pub fn has_access(&self, module: Module, level: Option<Level>, user: Option<&User>) -> bool {
        self.evaluate(module, level, user).allowed
    }

    pub fn evaluate(&self, module: Module, level: Option<Level>, user: Option<&User>) -> Decision {
        let decision = match module.content() {
            Some(content) => self.evaluate_content(content, level, user),
            None => self.evaluate_dashboard(user),
        };
        tracing::debug!(
            module = %module,
            level = level.map(|l| l.as_str()),
            user = user.map(|u| u.id.as_str()),
            allowed = decision.allowed,
            reason = ?decision.reason,
            "Access evaluated"
        );
        decision
    }

    /// Levels of `module` that `user` may open, in `n1`..`n5` order.
    pub fn accessible_levels(&self, module: ContentModule, user: Option<&User>) -> Vec<Level> {
        if !self.store.module_switch(module).enabled {
            return Vec::new();
        }
        let policies = self.store.level_policies(module);
        Level::ALL
            .into_iter()
            .filter(|level| self.evaluate_level_rule(&policies.get(*level), user).allowed)
            .collect()
    }

    fn evaluate_content(
        &self,
        module: ContentModule,
        level: Option<Level>,
        user: Option<&User>,
    ) -> Decision {
        if !self.store.module_switch(module).enabled {
            return Decision::deny(DecisionReason::ModuleDisabled);
        }
        let Some(level) = level else {
            return Decision::allow(DecisionReason::OpenAccess);
        };
        let policy = self.store.level_policies(module).get(level);
        self.evaluate_level_rule(&policy, user)
    }

    fn evaluate_level_rule(&self, policy: &AccessPolicy, user: Option<&User>) -> Decision {
        if self.bypass.content && is_admin(user) {
            return Decision::allow(DecisionReason::AdminBypass);
        }
        match policy {
            AccessPolicy::All => Decision::allow(DecisionReason::OpenAccess),
            AccessPolicy::None => Decision::deny(DecisionReason::NoAccess),
            AccessPolicy::Restricted {
                allowed_roles,
                allowed_users,
            } => match_allowlist(allowed_roles, allowed_users, user),
        }
    }

    fn evaluate_dashboard(&self, user: Option<&User>) -> Decision {
        if self.bypass.dashboard && is_admin(user) {
            return Decision::allow(DecisionReason::AdminBypass);
        }
        let policy = self.store.dashboard_policy();
        if !policy.default_locked {
            return Decision::allow(DecisionReason::OpenAccess);
        }
        match_allowlist(&policy.allowed_roles, &policy.allowed_users, user)
    }
}

fn is_admin(user: Option<&User>) -> bool {
    matches!(user, Some(u) if u.role == Role::Admin)
}

/// Role and user-id matches are unioned; either one grants access.
fn match_allowlist(
    roles: &BTreeSet<Role>,
    users: &BTreeSet<String>,
    user: Option<&User>,
) -> Decision {
    let Some(user) = user else {
        return Decision::deny(DecisionReason::Anonymous);
    };
    if roles.contains(&user.role) {
        Decision::allow(DecisionReason::RoleAllowed)
    } else if users.contains(&user.id) {
        Decision::allow(DecisionReason::UserAllowed)
    } else {
        Decision::deny(DecisionReason::NotAllowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::types::DashboardPolicy;

    fn evaluator() -> PolicyEvaluator {
        PolicyEvaluator::new(ConfigStore::in_memory(), AdminBypass::default())
    }

    fn all_users() -> Vec<Option<User>> {
        vec![
            None,
            Some(User::new("g-1", Role::Guest)),
            Some(User::new("u-1", Role::User)),
            Some(User::new("e-1", Role::Editor)),
            Some(User::new("a-1", Role::Admin)),
        ]
    }

    #[test]
    fn test_empty_store_opens_every_level() {
        let eval = evaluator();
        for user in all_users() {
            for level in Level::ALL {
                assert!(eval.has_access(Module::Level, Some(level), user.as_ref()));
                assert!(eval.has_access(Module::Jlpt, Some(level), user.as_ref()));
            }
        }
    }

    #[test]
    fn test_empty_store_locks_dashboard_to_admins() {
        let eval = evaluator();
        for user in all_users() {
            let expected = matches!(&user, Some(u) if u.role == Role::Admin);
            assert_eq!(
                eval.has_access(Module::Dashboard, None, user.as_ref()),
                expected,
                "{user:?}"
            );
        }
    }

    #[test]
    fn test_none_denies_admin_without_content_bypass() {
        let eval = evaluator();
        eval.store()
            .set_level_policy(ContentModule::Level, Level::N3, AccessPolicy::None)
            .unwrap();
        let admin = User::new("a-1", Role::Admin);
        let decision = eval.evaluate(Module::Level, Some(Level::N3), Some(&admin));
        assert_eq!(decision, Decision::deny(DecisionReason::NoAccess));
        // neighbours stay open
        assert!(eval.has_access(Module::Level, Some(Level::N2), Some(&admin)));
    }

    #[test]
    fn test_content_bypass_lets_admin_through() {
        let bypass = AdminBypass {
            dashboard: true,
            content: true,
        };
        let eval = PolicyEvaluator::new(ConfigStore::in_memory(), bypass);
        eval.store()
            .set_level_policy(ContentModule::Jlpt, Level::N3, AccessPolicy::None)
            .unwrap();
        let admin = User::new("a-1", Role::Admin);
        let editor = User::new("e-1", Role::Editor);
        assert!(eval.has_access(Module::Jlpt, Some(Level::N3), Some(&admin)));
        assert!(!eval.has_access(Module::Jlpt, Some(Level::N3), Some(&editor)));

        // the module switch still wins over the bypass
        eval.store()
            .set_module_enabled(ContentModule::Jlpt, false)
            .unwrap();
        assert!(!eval.has_access(Module::Jlpt, Some(Level::N3), Some(&admin)));
    }

    #[test]
    fn test_dashboard_bypass_can_be_disabled() {
        let bypass = AdminBypass {
            dashboard: false,
            content: false,
        };
        let eval = PolicyEvaluator::new(ConfigStore::in_memory(), bypass);
        let admin = User::new("a-1", Role::Admin);
        assert!(!eval.has_access(Module::Dashboard, None, Some(&admin)));

        eval.store()
            .set_dashboard_policy(&DashboardPolicy {
                default_locked: true,
                allowed_roles: [Role::Admin].into(),
                allowed_users: Default::default(),
            })
            .unwrap();
        assert_eq!(
            eval.evaluate(Module::Dashboard, None, Some(&admin)),
            Decision::allow(DecisionReason::RoleAllowed)
        );
    }

    #[test]
    fn test_restricted_by_role() {
        let eval = evaluator();
        eval.store()
            .set_level_policy(
                ContentModule::Level,
                Level::N2,
                AccessPolicy::restricted([Role::Editor], Vec::<String>::new()),
            )
            .unwrap();
        let user = User::new("u-1", Role::User);
        let editor = User::new("e-1", Role::Editor);
        assert!(!eval.has_access(Module::Level, Some(Level::N2), Some(&user)));
        assert!(eval.has_access(Module::Level, Some(Level::N2), Some(&editor)));
    }

    #[test]
    fn test_restricted_role_or_user_id() {
        let eval = evaluator();
        eval.store()
            .set_level_policy(
                ContentModule::Jlpt,
                Level::N1,
                AccessPolicy::restricted([Role::Editor], ["u-vip"]),
            )
            .unwrap();
        let vip = User::new("u-vip", Role::User);
        let other = User::new("u-2", Role::User);
        assert_eq!(
            eval.evaluate(Module::Jlpt, Some(Level::N1), Some(&vip)),
            Decision::allow(DecisionReason::UserAllowed)
        );
        assert!(!eval.has_access(Module::Jlpt, Some(Level::N1), Some(&other)));
        assert_eq!(
            eval.evaluate(Module::Jlpt, Some(Level::N1), None),
            Decision::deny(DecisionReason::Anonymous)
        );
    }

    #[test]
    fn test_module_switch_overrides_level_policy() {
        let eval = evaluator();
        eval.store()
            .set_level_policy(ContentModule::Jlpt, Level::N5, AccessPolicy::All)
            .unwrap();
        eval.store()
            .set_module_enabled(ContentModule::Jlpt, false)
            .unwrap();
        for user in all_users() {
            for level in Level::ALL {
                assert!(!eval.has_access(Module::Jlpt, Some(level), user.as_ref()));
            }
            assert!(!eval.has_access(Module::Jlpt, None, user.as_ref()));
            // the level module is independent
            assert!(eval.has_access(Module::Level, Some(Level::N5), user.as_ref()));
        }
    }

    #[test]
    fn test_missing_level_uses_module_switch() {
        let eval = evaluator();
        assert_eq!(
            eval.evaluate(Module::Level, None, None),
            Decision::allow(DecisionReason::OpenAccess)
        );
    }

    #[test]
    fn test_unlocked_dashboard_admits_everyone() {
        let eval = evaluator();
        eval.store()
            .set_dashboard_policy(&DashboardPolicy {
                default_locked: false,
                ..Default::default()
            })
            .unwrap();
        for user in all_users() {
            assert!(eval.has_access(Module::Dashboard, None, user.as_ref()));
        }
    }

    #[test]
    fn test_locked_dashboard_allowlists() {
        let eval = evaluator();
        eval.store()
            .set_dashboard_policy(&DashboardPolicy {
                default_locked: true,
                allowed_roles: [Role::Editor].into(),
                allowed_users: ["u-analyst".to_string()].into(),
            })
            .unwrap();
        assert!(!eval.has_access(Module::Dashboard, None, None));
        assert!(eval.has_access(Module::Dashboard, None, Some(&User::new("e-9", Role::Editor))));
        assert!(eval.has_access(
            Module::Dashboard,
            None,
            Some(&User::new("u-analyst", Role::User))
        ));
        assert!(!eval.has_access(Module::Dashboard, None, Some(&User::new("u-2", Role::User))));
    }

    #[test]
    fn test_has_access_is_idempotent() {
        let eval = evaluator();
        eval.store()
            .set_level_policy(
                ContentModule::Level,
                Level::N4,
                AccessPolicy::restricted([Role::User], Vec::<String>::new()),
            )
            .unwrap();
        let user = User::new("u-1", Role::User);
        let first = eval.has_access(Module::Level, Some(Level::N4), Some(&user));
        for _ in 0..5 {
            assert_eq!(eval.has_access(Module::Level, Some(Level::N4), Some(&user)), first);
        }
    }

    #[test]
    fn test_restricted_level_scenario() {
        let eval = evaluator();
        assert!(eval.has_access(Module::Level, Some(Level::N1), None));

        eval.store()
            .set_level_policy(
                ContentModule::Level,
                Level::N1,
                AccessPolicy::restricted([Role::User], Vec::<String>::new()),
            )
            .unwrap();

        assert!(!eval.has_access(Module::Level, Some(Level::N1), None));
        assert!(eval.has_access(Module::Level, Some(Level::N1), Some(&User::new("u-1", Role::User))));
        assert!(!eval.has_access(
            Module::Level,
            Some(Level::N1),
            Some(&User::new("e-1", Role::Editor))
        ));
    }

    #[test]
    fn test_accessible_levels() {
        let eval = evaluator();
        eval.store()
            .set_level_policy(ContentModule::Level, Level::N1, AccessPolicy::None)
            .unwrap();
        eval.store()
            .set_level_policy(
                ContentModule::Level,
                Level::N2,
                AccessPolicy::restricted([Role::Editor], Vec::<String>::new()),
            )
            .unwrap();

        let editor = User::new("e-1", Role::Editor);
        assert_eq!(
            eval.accessible_levels(ContentModule::Level, None),
            vec![Level::N3, Level::N4, Level::N5]
        );
        assert_eq!(
            eval.accessible_levels(ContentModule::Level, Some(&editor)),
            vec![Level::N2, Level::N3, Level::N4, Level::N5]
        );

        eval.store()
            .set_module_enabled(ContentModule::Level, false)
            .unwrap();
        assert!(eval
            .accessible_levels(ContentModule::Level, Some(&editor))
            .is_empty());
    }
}
