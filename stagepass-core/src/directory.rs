use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::PrimaryKey;

/// What the gateway needs to know about a room
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub id: PrimaryKey,
    /// The studio that owns the room
    pub studio_id: PrimaryKey,
    /// Whether the room is currently live
    pub is_active: bool,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("room:{0} doesn't exist")]
    RoomNotFound(PrimaryKey),
}

/// The external room/studio directory, at its interface. Stagepass does
/// not own rooms or studios; it only resolves a room to its owning studio
/// and its live flag.
#[async_trait]
pub trait RoomDirectory: Send + Sync + 'static {
    async fn room(&self, room_id: PrimaryKey) -> Result<RoomInfo, DirectoryError>;
}

/// An in-memory [RoomDirectory] for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryDirectory {
    rooms: DashMap<PrimaryKey, RoomInfo>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, room: RoomInfo) {
        self.rooms.insert(room.id, room);
    }

    pub fn set_active(
        &self,
        room_id: PrimaryKey,
        is_active: bool,
    ) -> Result<RoomInfo, DirectoryError> {
        let mut room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(DirectoryError::RoomNotFound(room_id))?;

        room.is_active = is_active;
        Ok(room.value().clone())
    }
}

#[async_trait]
impl RoomDirectory for MemoryDirectory {
    async fn room(&self, room_id: PrimaryKey) -> Result<RoomInfo, DirectoryError> {
        self.rooms
            .get(&room_id)
            .map(|r| r.value().clone())
            .ok_or(DirectoryError::RoomNotFound(room_id))
    }
}
