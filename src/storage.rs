use std::sync::Arc;

use crate::access::seed::{apply_seed, load_seed};
use crate::access::{AdminBypass, ConfigStore, FileStore, MemoryStore, PolicyEvaluator};
use crate::errors::GateError;
use crate::settings::{Backend, Settings, Store as StoreCfg};

pub fn init(cfg: &StoreCfg) -> Result<ConfigStore, GateError> {
    let store = match cfg.backend {
        Backend::File => {
            let backend = FileStore::open(&cfg.path)?;
            tracing::info!(path = %cfg.path.display(), "Using file policy store");
            ConfigStore::new(Arc::new(backend))
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory policy store; changes are lost on restart");
            ConfigStore::new(Arc::new(MemoryStore::new()))
        }
    };

    if let Some(seed_file) = &cfg.seed_file {
        let seed = load_seed(seed_file)?;
        let report = apply_seed(&store, &seed, false)?;
        tracing::info!(
            seed = %seed_file.display(),
            written = ?report.written,
            skipped = ?report.skipped,
            "Seeded policy store"
        );
    }

    Ok(store)
}

/// Build the evaluator described by `settings`.
pub fn evaluator(settings: &Settings) -> Result<PolicyEvaluator, GateError> {
    let store = init(&settings.store)?;
    let bypass: AdminBypass = settings.access.bypass();
    if bypass.content {
        tracing::info!("Administrators bypass level/jlpt policies");
    }
    Ok(PolicyEvaluator::new(store, bypass))
}
