mod access;
mod analytics;
mod codes;
mod config;
mod db;
mod directory;
mod events;
mod hub;
mod util;

use std::sync::Arc;

use chrono::Utc;

pub use access::*;
pub use analytics::*;
pub use codes::*;
pub use config::*;
pub use db::*;
pub use directory::*;
pub use events::*;
pub use hub::*;
pub use util::*;

/// The stagepass gateway, granting short-lived anonymous viewing access to
/// rooms via numeric codes and fanning room-status events out to viewers.
pub struct Gateway<Db, Dir> {
    context: GatewayContext<Db, Dir>,

    pub codes: CodeManager<Db, Dir>,
    pub access: AccessTracker<Db, Dir>,
}

/// A type passed to the gateway's components, to reach storage, the room
/// directory, the viewer counters and the hub.
pub struct GatewayContext<Db, Dir> {
    pub database: Arc<Db>,
    pub directory: Arc<Dir>,
    pub analytics: Arc<Analytics>,
    pub hub: Arc<BroadcastHub>,
    pub config: GatewayConfig,
}

impl<Db, Dir> Gateway<Db, Dir>
where
    Db: Database,
    Dir: RoomDirectory,
{
    pub fn new(database: Db, directory: Dir, config: GatewayConfig) -> Self {
        Self::with_shared(Arc::new(database), Arc::new(directory), config)
    }

    /// Like [Gateway::new], for callers that keep their own handle to the
    /// directory or database.
    pub fn with_shared(database: Arc<Db>, directory: Arc<Dir>, config: GatewayConfig) -> Self {
        let context = GatewayContext {
            database,
            directory,
            analytics: Arc::new(Analytics::new()),
            hub: BroadcastHub::new(),
            config,
        };

        Self {
            codes: CodeManager::new(&context),
            access: AccessTracker::new(&context),
            context,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.context.config
    }

    pub fn hub(&self) -> Arc<BroadcastHub> {
        self.context.hub.clone()
    }

    pub fn analytics(&self) -> Arc<Analytics> {
        self.context.analytics.clone()
    }

    /// Resolves a room through the external directory.
    pub async fn room(
        &self,
        room_id: PrimaryKey,
    ) -> std::result::Result<RoomInfo, DirectoryError> {
        self.context.directory.room(room_id).await
    }

    /// Pushes a room-status change to every viewer of the room.
    pub fn publish_room_status(&self, room_id: PrimaryKey, is_active: bool) {
        self.context
            .hub
            .broadcast(room_id, RoomEvent::status(is_active, Utc::now()));
    }
}

impl<Db, Dir> Clone for GatewayContext<Db, Dir>
where
    Db: Database,
    Dir: RoomDirectory,
{
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            directory: self.directory.clone(),
            analytics: self.analytics.clone(),
            hub: self.hub.clone(),
            config: self.config.clone(),
        }
    }
}
