//! Shared application state, grouped by concern: configuration, durable
//! stores, and process-local bookkeeping each get their own field rather
//! than one flat bag.

use std::path::PathBuf;
use std::sync::Arc;

use wp_domain::Config;
use wp_store::RunIndex;

use crate::registry::RunRegistry;

#[derive(Clone)]
pub struct AppState {
    // ── Configuration ──
    pub config: Arc<Config>,

    // ── Durable stores ──
    pub runs_root: PathBuf,
    pub index: Arc<RunIndex>,

    // ── Process-local bookkeeping ──
    pub registry: Arc<RunRegistry>,
    pub api_token_hash: Option<[u8; 32]>,
}

impl AppState {
    pub fn new(config: Config) -> wp_domain::Result<Self> {
        let runs_root = PathBuf::from(&config.runs.root);
        let index = RunIndex::open(&runs_root)?;
        let api_token_hash = config.server.api_token.as_deref().map(hash_token);
        Ok(Self {
            config: Arc::new(config),
            runs_root,
            index: Arc::new(index),
            registry: Arc::new(RunRegistry::new()),
            api_token_hash,
        })
    }
}

pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(token.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
