use std::sync::Arc;

use levelgate::access::types::PolicyKey;
use levelgate::access::{
    AccessError, AdminBypass, ConfigStore, ContentModule, KeyValueStore, Level, Module,
    PolicyEvaluator, Role, User,
};
use wasm_bindgen::prelude::*;

/// Check if `window.localStorage` is usable in the current browser
#[wasm_bindgen(js_name = supportsLocalStorage)]
pub fn supports_local_storage() -> bool {
    local_storage("levelgate").is_ok()
}

/// `window.localStorage`, looked up on every call so the backend stays `Send + Sync`.
struct LocalStorage;

fn local_storage(key: &str) -> Result<web_sys::Storage, AccessError> {
    web_sys::window()
        .and_then(|w| w.local_storage().ok().flatten())
        .ok_or_else(|| AccessError::Storage {
            key: key.to_string(),
            source: std::io::Error::other("localStorage is unavailable"),
        })
}

fn js_error(key: &str, err: JsValue) -> AccessError {
    AccessError::Storage {
        key: key.to_string(),
        source: std::io::Error::other(format!("{err:?}")),
    }
}

impl KeyValueStore for LocalStorage {
    fn read(&self, key: &str) -> Result<Option<String>, AccessError> {
        local_storage(key)?
            .get_item(key)
            .map_err(|e| js_error(key, e))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AccessError> {
        local_storage(key)?
            .set_item(key, value)
            .map_err(|e| js_error(key, e))
    }

    fn remove(&self, key: &str) -> Result<(), AccessError> {
        local_storage(key)?
            .remove_item(key)
            .map_err(|e| js_error(key, e))
    }
}

fn to_js(err: AccessError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Build the checked user from the loose values a page has at hand.
/// No id means an anonymous visitor.
fn parse_user(user_id: Option<String>, role: Option<String>) -> Result<Option<User>, AccessError> {
    let Some(id) = user_id.filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    let role = match role.as_deref() {
        Some(r) => r.parse::<Role>()?,
        None => Role::User,
    };
    Ok(Some(User::new(id, role)))
}

/// Arguments of `hasAccess`, parsed strictly.
fn parse_check_args(
    module: &str,
    level: Option<&str>,
    user_id: Option<String>,
    role: Option<String>,
) -> Result<(Module, Option<Level>, Option<User>), AccessError> {
    let module: Module = module.parse()?;
    let level = level.map(str::parse::<Level>).transpose()?;
    let user = parse_user(user_id, role)?;
    Ok((module, level, user))
}

/// Arguments of `accessibleLevels`; only content modules have levels.
fn parse_levels_args(
    module: &str,
    user_id: Option<String>,
    role: Option<String>,
) -> Result<(ContentModule, Option<User>), AccessError> {
    let module: ContentModule = module.parse()?;
    let user = parse_user(user_id, role)?;
    Ok((module, user))
}

/// Synchronous route guard for pages.
///
/// Level ids and role names must already be lowercase (`n3`, `editor`).
#[wasm_bindgen]
pub struct AccessGuard {
    evaluator: PolicyEvaluator,
}

#[wasm_bindgen]
impl AccessGuard {
    #[wasm_bindgen(constructor)]
    pub fn new(admin_bypass_content: bool) -> AccessGuard {
        let bypass = AdminBypass {
            dashboard: true,
            content: admin_bypass_content,
        };
        AccessGuard::with_store(ConfigStore::new(Arc::new(LocalStorage)), bypass)
    }

    /// Throws only on malformed arguments; storage faults fall back to defaults.
    #[wasm_bindgen(js_name = hasAccess)]
    pub fn has_access(
        &self,
        module: &str,
        level: Option<String>,
        user_id: Option<String>,
        role: Option<String>,
    ) -> Result<bool, JsValue> {
        let (module, level, user) =
            parse_check_args(module, level.as_deref(), user_id, role).map_err(to_js)?;
        Ok(self.evaluator.has_access(module, level, user.as_ref()))
    }

    #[wasm_bindgen(js_name = accessibleLevels)]
    pub fn accessible_levels(
        &self,
        module: &str,
        user_id: Option<String>,
        role: Option<String>,
    ) -> Result<Vec<String>, JsValue> {
        let (module, user) = parse_levels_args(module, user_id, role).map_err(to_js)?;
        Ok(self
            .evaluator
            .accessible_levels(module, user.as_ref())
            .into_iter()
            .map(|level| level.as_str().to_string())
            .collect())
    }

    /// The stored document under `key` as a JSON string.
    #[wasm_bindgen(js_name = getPolicy)]
    pub fn get_policy(&self, key: &str) -> Result<String, JsValue> {
        let key: PolicyKey = key.parse().map_err(to_js)?;
        serde_json::to_string(&self.evaluator.store().get_value(key))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    #[wasm_bindgen(js_name = setPolicy)]
    pub fn set_policy(&self, key: &str, json: &str) -> Result<(), JsValue> {
        let key: PolicyKey = key.parse().map_err(to_js)?;
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse policy JSON: {}", e)))?;
        self.evaluator.store().set_value(key, value).map_err(to_js)
    }

    #[wasm_bindgen(js_name = resetPolicy)]
    pub fn reset_policy(&self, key: &str) -> Result<(), JsValue> {
        let key: PolicyKey = key.parse().map_err(to_js)?;
        self.evaluator.store().reset(key).map_err(to_js)
    }
}

impl AccessGuard {
    fn with_store(store: ConfigStore, bypass: AdminBypass) -> AccessGuard {
        AccessGuard {
            evaluator: PolicyEvaluator::new(store, bypass),
        }
    }
}
