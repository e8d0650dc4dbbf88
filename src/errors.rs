use miette::Diagnostic;
use thiserror::Error;

use crate::access::AccessError;

#[derive(Debug, Error, Diagnostic)]
pub enum GateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Access(#[from] AccessError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(levelgate::serde))]
    Serde(#[from] serde_json::Error),
}
