//! Room registry.
//!
//! Maps room names to shared [`Room`] instances. Creation is atomic with
//! respect to concurrent callers asking for the same new name: the map's
//! write lock covers the check-then-insert, so only one room object ever
//! exists per name. Rooms are never evicted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::room::Room;
use crate::store::UpdateStore;

pub struct RoomRegistry {
    data_dir: PathBuf,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a room by name, creating it on first reference, and warm it
    /// up. Replay failures are logged here; the room is returned usable
    /// either way.
    pub async fn get_or_create(&self, name: &str) -> Arc<Room> {
        let room = {
            let mut rooms = self.rooms.write();
            rooms
                .entry(name.to_string())
                .or_insert_with(|| {
                    tracing::info!(room = %name, "creating room");
                    Arc::new(Room::new(name, UpdateStore::for_room(&self.data_dir, name)))
                })
                .clone()
        };

        if let Err(e) = room.ensure_loaded().await {
            tracing::warn!(room = %name, error = %e, "history replay failed; room starts from live state");
        }

        room
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}
