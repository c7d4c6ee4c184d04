use serde::Serialize;
use system::{MemberInfo, RoomId, RoomSummary, SystemError, TurnInfo};
use tokio::sync::oneshot::Sender;

/// Requests from the HTTP handlers. Each carries the channel its answer goes
/// back on.
#[derive(Debug)]
pub enum AdminCommand {
    ListRooms {
        tx: Sender<Vec<RoomDescription>>,
    },
    CreateRoom {
        name: String,
        code: Option<String>,
        tx: Sender<Result<RoomSummary, SystemError>>,
    },
    CloseRoom {
        room_id: RoomId,
        tx: Sender<Result<(), SystemError>>,
    },
    Health {
        tx: Sender<HealthReport>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomDescription {
    #[serde(flatten)]
    pub summary: RoomSummary,
    pub members: Vec<MemberInfo>,
    pub turn: Option<TurnInfo>,
    pub has_snapshot: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub rooms: usize,
    pub connections: usize,
}
