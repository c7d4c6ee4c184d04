use crate::drawing::{DrawingEvent, Point};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ConnectionId = u32;
pub type RoomId = uuid::Uuid;
pub type UserId = String;
pub type CommandId = u16;

pub const MIN_ROOM_CODE_LEN: usize = 2;
pub const MAX_ROOM_CODE_LEN: usize = 12;

/// Errors that are reported back to the connection which caused them.
/// Only `Unauthorized` closes the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum SystemError {
    #[error("room not found")]
    RoomNotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("connection is not authenticated yet")]
    NotAuthenticated,
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("connection isn't in any room")]
    NotInRoom,
    #[error("room code {0} is already taken")]
    RoomCodeTaken(String),
    #[error("invalid room code {0:?}")]
    InvalidRoomCode(String),
    #[error("room still has members")]
    RoomNotEmpty,
    #[error("invalid turn: {0}")]
    InvalidTurn(String),
    #[error("snapshot write failed: {0}")]
    SnapshotWriteFailure(String),
}

impl SystemError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SystemError::Unauthorized)
    }
}

/// A room is addressed either by its id or by its short shareable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomRef {
    Id(RoomId),
    Code(String),
}

/// Uppercases a room code and checks that it is short and alphanumeric.
pub fn normalize_room_code(code: &str) -> Result<String, SystemError> {
    let code = code.trim();
    let valid = (MIN_ROOM_CODE_LEN..=MAX_ROOM_CODE_LEN).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(SystemError::InvalidRoomCode(code.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub member_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub payload: String,
    pub updated_at: DateTime<Utc>,
}

/// When clients are expected to push a full canvas snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    OnStrokeEnd,
    Interval { seconds: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInfo {
    pub member: ConnectionId,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiableCommand {
    pub command_id: CommandId,
    pub command: SystemCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemCommand {
    CreateRoom {
        name: String,
        code: Option<String>,
    },
    JoinRoom {
        room: RoomRef,
    },
    LeaveRoom,
    Draw(DrawingEvent),
    Cursor {
        point: Point,
    },
    PushSnapshot {
        payload: String,
    },
    StartTurn {
        member: ConnectionId,
        duration_seconds: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEvent {
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
        snapshot_policy: SnapshotPolicy,
    },
    JoinedRoom {
        room: RoomSummary,
        members: Vec<MemberInfo>,
        snapshot: Option<Snapshot>,
        turn: Option<TurnInfo>,
    },
    LeftRoom {
        room_id: RoomId,
    },
    TurnStarted(TurnInfo),
    RoomEvent(RoomEvent),
}

/// Events pushed to the members of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomEvent {
    Drawing {
        from: ConnectionId,
        event: DrawingEvent,
    },
    Cursor {
        connection_id: ConnectionId,
        point: Point,
    },
    MembersChanged {
        room_id: RoomId,
        members: Vec<MemberInfo>,
    },
    TurnStarted {
        member: ConnectionId,
        remaining_seconds: u32,
    },
    TurnUpdate {
        member: ConnectionId,
        remaining_seconds: u32,
    },
    TurnEnded {
        member: ConnectionId,
        next: Option<ConnectionId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandResult {
    Event(SystemEvent),
    Error(SystemError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifiableEvent {
    ByMyself {
        command_id: CommandId,
        result: CommandResult,
    },
    BySystem {
        system_event: SystemEvent,
    },
}

impl IdentifiableEvent {
    pub fn room_event(event: RoomEvent) -> Self {
        IdentifiableEvent::BySystem {
            system_event: SystemEvent::RoomEvent(event),
        }
    }
}
