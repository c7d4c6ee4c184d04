use crate::turn::TurnState;
use serde::{Deserialize, Serialize};
use system::chrono::{DateTime, Utc};
use system::{ConnectionId, MemberInfo, RoomId, RoomSummary, TurnInfo, UserId};

/// The part of a room that outlives the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// In join order. Turn rotation follows this order.
    pub members: Vec<MemberInfo>,
    pub turn: Option<TurnState>,
}

impl Room {
    pub fn new(code: String, name: String) -> Self {
        Self {
            id: RoomId::new_v4(),
            code,
            name,
            created_at: Utc::now(),
            members: Vec::new(),
            turn: None,
        }
    }

    pub fn from_record(record: RoomRecord) -> Self {
        Self {
            id: record.id,
            code: record.code,
            name: record.name,
            created_at: record.created_at,
            members: Vec::new(),
            turn: None,
        }
    }

    pub fn record(&self) -> RoomRecord {
        RoomRecord {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            member_count: self.members.len(),
        }
    }

    pub fn position(&self, connection_id: ConnectionId) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.connection_id == connection_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.position(connection_id).is_some()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.connection_id).collect()
    }

    pub fn add_member(&mut self, connection_id: ConnectionId, user_id: UserId) {
        if !self.contains(connection_id) {
            self.members.push(MemberInfo {
                connection_id,
                user_id,
            });
        }
    }

    /// Returns the position the member had in join order.
    pub fn remove_member(&mut self, connection_id: ConnectionId) -> Option<usize> {
        let position = self.position(connection_id)?;
        self.members.remove(position);
        Some(position)
    }

    pub fn turn_info(&self) -> Option<TurnInfo> {
        self.turn.as_ref().map(TurnState::info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_keeps_members_in_join_order_without_duplicates() {
        let mut room = Room::new("ABCD".into(), "doodles".into());
        room.add_member(3, "carol".into());
        room.add_member(1, "alice".into());
        room.add_member(3, "carol".into());
        assert_eq!(room.connection_ids(), vec![3, 1]);
        assert_eq!(room.summary().member_count, 2);

        assert_eq!(room.remove_member(3), Some(0));
        assert_eq!(room.remove_member(3), None);
        assert_eq!(room.connection_ids(), vec![1]);
    }
}
