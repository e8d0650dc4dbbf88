use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    #[error("Failed to access policy storage for `{key}`")]
    #[diagnostic(
        code(levelgate::access::storage),
        help("Check that the policy directory exists and is writable")
    )]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored policy `{key}` is not valid JSON for its shape")]
    #[diagnostic(
        code(levelgate::access::corrupt),
        help("Reset the key to restore the default policy")
    )]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Policy storage lock is poisoned")]
    #[diagnostic(code(levelgate::access::poisoned))]
    Poisoned,

    #[error("Unknown module `{0}`")]
    #[diagnostic(
        code(levelgate::access::unknown_module),
        help("Modules are `level`, `jlpt` and `dashboard` (lowercase)")
    )]
    UnknownModule(String),

    #[error("Unknown policy key `{0}`")]
    #[diagnostic(
        code(levelgate::access::unknown_key),
        help("Keys are `level-module-policy`, `jlpt-module-policy`, `level-access-policy`, `jlpt-access-policy` and `dashboard-access-policy`")
    )]
    UnknownPolicyKey(String),

    #[error("Invalid level id `{0}`")]
    #[diagnostic(
        code(levelgate::access::invalid_level),
        help("Level ids are `n1` through `n5` (lowercase)")
    )]
    InvalidLevel(String),

    #[error("Invalid role `{0}`")]
    #[diagnostic(
        code(levelgate::access::invalid_role),
        help("Roles are `guest`, `user`, `editor` and `admin` (lowercase)")
    )]
    InvalidRole(String),

    #[error("Invalid policy document: {0}")]
    #[diagnostic(code(levelgate::access::invalid_policy))]
    InvalidPolicy(String),

    #[error("Failed to load seed file `{path}`")]
    #[diagnostic(
        code(levelgate::access::seed_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    SeedLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(levelgate::access::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),
}

#[cfg(feature = "server")]
mod response {
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use serde_json::json;

    use super::AccessError;

    impl IntoResponse for AccessError {
        fn into_response(self) -> Response {
            let status = match &self {
                AccessError::UnknownModule(_)
                | AccessError::UnknownPolicyKey(_)
                | AccessError::InvalidLevel(_)
                | AccessError::InvalidRole(_)
                | AccessError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = json!({ "error": self.to_string() });
            (status, Json(body)).into_response()
        }
    }
}
