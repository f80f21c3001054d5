use std::sync::Arc;

use axum::extract::FromRef;
use stagepass_core::{Gateway, MemoryDatabase, MemoryDirectory};

/// The concrete gateway this server fronts. The storage engine and room
/// directory are external in larger deployments; the in-memory pair covers
/// a single-process one.
pub type ServerGateway = Gateway<MemoryDatabase, MemoryDirectory>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub gateway: Arc<ServerGateway>,
    /// Kept separately so the directory sync endpoint can mutate it
    pub directory: Arc<MemoryDirectory>,
}
