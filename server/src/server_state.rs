use crate::room::{Room, RoomRecord};
use crate::turn;
use rand::Rng;
use std::collections::HashMap;
use std::num::Wrapping;
use system::{
    normalize_room_code, ConnectionId, MemberInfo, RoomEvent, RoomId, RoomRef, RoomSummary,
    SystemError, UserId,
};

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GENERATED_ROOM_CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated(UserId),
    Joined(UserId, RoomId),
}

/// A connection left `room_id`. `turn_event` is set when a running turn moved
/// to another member because of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub room_id: RoomId,
    pub turn_event: Option<RoomEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    pub already_joined: bool,
    pub departure: Option<Departure>,
}

/// Single source of truth for which connection is in which room.
/// A connection is a member of at most one room.
pub struct RoomRegistry {
    connection_id_source: Wrapping<ConnectionId>,
    connection_states: HashMap<ConnectionId, ConnectionState>,

    rooms: HashMap<RoomId, Room>,
    room_codes: HashMap<String, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            connection_states: HashMap::new(),

            rooms: HashMap::new(),
            room_codes: HashMap::new(),
        }
    }

    pub fn create_connection(&mut self) -> ConnectionId {
        let connection_id = self.new_connection_id();
        self.connection_states
            .insert(connection_id, ConnectionState::Connecting);
        connection_id
    }

    pub fn authenticate(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
    ) -> Result<(), SystemError> {
        match self.connection_states.get_mut(&connection_id) {
            Some(state) if *state == ConnectionState::Connecting => {
                *state = ConnectionState::Authenticated(user_id);
                Ok(())
            }
            _ => Err(SystemError::NotAuthenticated),
        }
    }

    pub fn connection_state(&self, connection_id: ConnectionId) -> Option<&ConnectionState> {
        self.connection_states.get(&connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }

    /// Leaves the current room, if any, and forgets the connection.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<Departure> {
        let departure = self.leave(connection_id);
        self.connection_states.remove(&connection_id);
        departure
    }

    pub fn create_room(
        &mut self,
        name: &str,
        code: Option<&str>,
    ) -> Result<RoomSummary, SystemError> {
        let code = match code {
            Some(code) => {
                let code = normalize_room_code(code)?;
                if self.room_codes.contains_key(&code) {
                    return Err(SystemError::RoomCodeTaken(code));
                }
                code
            }
            None => self.generate_room_code(),
        };
        let name = match name.trim() {
            "" => code.clone(),
            name => name.to_string(),
        };
        let room = Room::new(code.clone(), name);
        let summary = room.summary();
        log::info!("Room {} created with code {}", room.id, code);
        self.room_codes.insert(code, room.id);
        self.rooms.insert(room.id, room);
        Ok(summary)
    }

    /// Brings back a room persisted by an earlier run, with no members.
    pub fn restore_room(&mut self, record: RoomRecord) -> Result<RoomSummary, SystemError> {
        let code = normalize_room_code(&record.code)?;
        if self.room_codes.contains_key(&code) {
            return Err(SystemError::RoomCodeTaken(code));
        }
        let room = Room::from_record(RoomRecord { code, ..record });
        let summary = room.summary();
        self.room_codes.insert(room.code.clone(), room.id);
        self.rooms.insert(room.id, room);
        Ok(summary)
    }

    /// Removes an empty room.
    pub fn close_room(&mut self, room_id: &RoomId) -> Result<(), SystemError> {
        let room = self.rooms.get(room_id).ok_or(SystemError::RoomNotFound)?;
        if !room.members.is_empty() {
            return Err(SystemError::RoomNotEmpty);
        }
        if let Some(room) = self.rooms.remove(room_id) {
            self.room_codes.remove(&room.code);
            log::info!("Room {} closed", room_id);
        }
        Ok(())
    }

    pub fn resolve(&self, room_ref: &RoomRef) -> Option<RoomId> {
        match room_ref {
            RoomRef::Id(room_id) => self.rooms.contains_key(room_id).then(|| *room_id),
            RoomRef::Code(code) => normalize_room_code(code)
                .ok()
                .and_then(|code| self.room_codes.get(&code).copied()),
        }
    }

    /// Joins `room_ref`, leaving the previous room first. Joining the room the
    /// connection is already in changes nothing. A failed join keeps the
    /// previous membership.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        room_ref: &RoomRef,
    ) -> Result<JoinOutcome, SystemError> {
        let room_id = self.resolve(room_ref).ok_or(SystemError::RoomNotFound)?;
        let user_id = match self.connection_states.get(&connection_id) {
            Some(ConnectionState::Joined(_, current)) if *current == room_id => {
                return Ok(JoinOutcome {
                    room_id,
                    already_joined: true,
                    departure: None,
                });
            }
            Some(ConnectionState::Joined(user_id, _)) | Some(ConnectionState::Authenticated(user_id)) => {
                user_id.clone()
            }
            _ => return Err(SystemError::NotAuthenticated),
        };

        let departure = self.leave(connection_id);
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(SystemError::RoomNotFound)?;
        room.add_member(connection_id, user_id.clone());
        self.connection_states
            .insert(connection_id, ConnectionState::Joined(user_id, room_id));
        log::info!("Connection {} joined room {}", connection_id, room_id);

        Ok(JoinOutcome {
            room_id,
            already_joined: false,
            departure,
        })
    }

    /// No-op for connections that aren't in a room.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Option<Departure> {
        let state = self.connection_states.get_mut(&connection_id)?;
        let (user_id, room_id) = match state {
            ConnectionState::Joined(user_id, room_id) => (user_id.clone(), *room_id),
            _ => return None,
        };
        *state = ConnectionState::Authenticated(user_id);

        let room = self.rooms.get_mut(&room_id)?;
        let turn_event = room
            .remove_member(connection_id)
            .and_then(|position| turn::member_left(room, connection_id, position));
        log::info!("Connection {} left room {}", connection_id, room_id);
        Some(Departure {
            room_id,
            turn_event,
        })
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<RoomId> {
        match self.connection_states.get(&connection_id) {
            Some(ConnectionState::Joined(_, room_id)) => Some(*room_id),
            _ => None,
        }
    }

    pub fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(Room::connection_ids)
            .unwrap_or_default()
    }

    pub fn member_infos(&self, room_id: &RoomId) -> Vec<MemberInfo> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn rooms_mut(&mut self) -> impl Iterator<Item = &mut Room> {
        self.rooms.values_mut()
    }

    fn generate_room_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..GENERATED_ROOM_CODE_LEN)
                .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
                .collect();
            if !self.room_codes.contains_key(&code) {
                return code;
            }
        }
    }

    fn new_connection_id(&mut self) -> ConnectionId {
        loop {
            self.connection_id_source += Wrapping(1);
            let candidate = self.connection_id_source.0;
            if !self.connection_states.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
