//! levelgate - access control resolver for JLPT study content
//!
//! Decides whether a visitor may open a content module (`level`, `jlpt`) at a
//! given JLPT level and whether they may open the analytics dashboard. Policies
//! live in an injected key-value store; evaluation is synchronous and never
//! fails.

pub mod access;
#[cfg(feature = "server")]
pub mod errors;
#[cfg(feature = "server")]
pub mod settings;
#[cfg(feature = "server")]
pub mod storage;
#[cfg(feature = "server")]
pub mod web;
