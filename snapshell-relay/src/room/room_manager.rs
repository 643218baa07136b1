use crate::room::{Room, RoomCommand, RoomSettings};
use crate::signaling::RelayOutput;
use dashmap::DashMap;
use snapshell_core::RoomId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
    output: Arc<dyn RelayOutput>,
    settings: RoomSettings,
}

impl RoomManager {
    pub fn new(output: Arc<dyn RelayOutput>, settings: RoomSettings) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            output,
            settings,
        }
    }

    /// Sender of the live room task, spawning a new one if the room is
    /// unknown or its task has already shut down.
    pub fn get_room_sender(&self, room_id: &RoomId) -> mpsc::Sender<RoomCommand> {
        let mut entry = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| self.spawn_room(room_id));

        if entry.is_closed() {
            *entry = self.spawn_room(room_id);
        }

        entry.clone()
    }

    pub async fn dispatch(&self, room_id: &RoomId, cmd: RoomCommand) {
        let sender = self.get_room_sender(room_id);

        let Err(mpsc::error::SendError(cmd)) = sender.send(cmd).await else {
            return;
        };

        warn!("Room '{}' shut down while dispatching, reopening", room_id);
        self.rooms
            .remove_if(room_id, |_, tx| tx.same_channel(&sender));

        if let Err(e) = self.get_room_sender(room_id).send(cmd).await {
            error!("Room '{}' died: {}", room_id, e);
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.iter().filter(|r| !r.value().is_closed()).count()
    }

    fn spawn_room(&self, room_id: &RoomId) -> mpsc::Sender<RoomCommand> {
        info!("Creating new room: {}", room_id);
        let (tx, rx) = mpsc::channel(100);

        let room = Room::new(
            room_id.clone(),
            rx,
            self.output.clone(),
            self.settings.clone(),
        );
        tokio::spawn(room.run());

        tx
    }
}
