use crate::room::Room;
use system::{ConnectionId, RoomEvent, SystemError, TurnInfo};

/// What happens when a turn's countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TurnRotation {
    /// The next member in join order (wrapping) gets a fresh turn.
    RoundRobin,
    /// Turns stop until someone starts a new one.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnState {
    pub member: ConnectionId,
    pub remaining_seconds: u32,
    pub duration_seconds: u32,
}

impl TurnState {
    pub fn info(&self) -> TurnInfo {
        TurnInfo {
            member: self.member,
            remaining_seconds: self.remaining_seconds,
        }
    }

    fn started_event(&self) -> RoomEvent {
        RoomEvent::TurnStarted {
            member: self.member,
            remaining_seconds: self.remaining_seconds,
        }
    }
}

/// Starts a turn for `member` on behalf of `by`. While a turn runs, only its
/// holder may start the next one.
pub fn start_turn(
    room: &mut Room,
    by: ConnectionId,
    member: ConnectionId,
    duration_seconds: u32,
) -> Result<RoomEvent, SystemError> {
    if duration_seconds == 0 {
        return Err(SystemError::InvalidTurn(
            "duration must be at least one second".into(),
        ));
    }
    if !room.contains(member) {
        return Err(SystemError::InvalidTurn(format!(
            "connection {} is not a member of this room",
            member
        )));
    }
    if let Some(running) = &room.turn {
        if running.member != by {
            return Err(SystemError::InvalidTurn(format!(
                "connection {} holds the turn for {} more seconds",
                running.member, running.remaining_seconds
            )));
        }
    }
    let turn = TurnState {
        member,
        remaining_seconds: duration_seconds,
        duration_seconds,
    };
    let event = turn.started_event();
    room.turn = Some(turn);
    Ok(event)
}

/// Advances the countdown by one second. Returns the events to broadcast to
/// the whole room, in order.
pub fn tick(room: &mut Room, rotation: TurnRotation) -> Vec<RoomEvent> {
    let turn = match room.turn.as_mut() {
        Some(turn) => turn,
        None => return Vec::new(),
    };

    turn.remaining_seconds = turn.remaining_seconds.saturating_sub(1);
    let mut events = vec![RoomEvent::TurnUpdate {
        member: turn.member,
        remaining_seconds: turn.remaining_seconds,
    }];
    if turn.remaining_seconds > 0 {
        return events;
    }

    let ended = turn.member;
    let duration_seconds = turn.duration_seconds;
    let next = match rotation {
        TurnRotation::RoundRobin => next_member(room, ended),
        TurnRotation::Stop => None,
    };
    events.push(RoomEvent::TurnEnded {
        member: ended,
        next,
    });

    room.turn = next.map(|member| TurnState {
        member,
        remaining_seconds: duration_seconds,
        duration_seconds,
    });
    if let Some(turn) = &room.turn {
        events.push(turn.started_event());
    }
    events
}

/// Called after `left` was removed from `room.members` at `position`.
/// Hands a running turn to whoever followed the leaver.
pub fn member_left(room: &mut Room, left: ConnectionId, position: usize) -> Option<RoomEvent> {
    let duration_seconds = match &room.turn {
        Some(turn) if turn.member == left => turn.duration_seconds,
        _ => return None,
    };
    if room.members.is_empty() {
        room.turn = None;
        return None;
    }
    let member = room.members[position % room.members.len()].connection_id;
    let turn = TurnState {
        member,
        remaining_seconds: duration_seconds,
        duration_seconds,
    };
    let event = turn.started_event();
    room.turn = Some(turn);
    Some(event)
}

fn next_member(room: &Room, current: ConnectionId) -> Option<ConnectionId> {
    if room.members.is_empty() {
        return None;
    }
    let next = room
        .position(current)
        .map(|position| (position + 1) % room.members.len())
        .unwrap_or(0);
    Some(room.members[next].connection_id)
}
