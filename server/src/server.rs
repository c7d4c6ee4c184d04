use std::time::Duration;
use tokio::sync::mpsc::{channel, Sender};
use tokio::sync::oneshot;

use system::{
    validate_point, CommandId, CommandResult, ConnectionId, DrawingEvent, IdentifiableCommand,
    IdentifiableEvent, Point, RoomEvent, RoomId, RoomRef, RoomSummary, SnapshotPolicy,
    SystemCommand, SystemError, SystemEvent, TurnInfo,
};

use super::connection::{ConnectionCommand, ConnectionEvent};
use crate::admin::{AdminCommand, HealthReport, RoomDescription};
use crate::auth::Authenticator;
use crate::connection_tx_storage::{ConnectionTx, ConnectionTxStorage};
use crate::room::Room;
use crate::server_state::{ConnectionState, Departure, RoomRegistry};
use crate::snapshot_store::SnapshotStore;
use crate::turn::{self, TurnRotation};

pub type ServerTx = Sender<ServerCommand>;

#[derive(Debug)]
pub enum ServerCommand {
    Connection(ConnectionCommand),
    Admin(AdminCommand),
    Tick,
}

impl From<ConnectionCommand> for ServerCommand {
    fn from(command: ConnectionCommand) -> Self {
        ServerCommand::Connection(command)
    }
}

impl From<AdminCommand> for ServerCommand {
    fn from(command: AdminCommand) -> Self {
        ServerCommand::Admin(command)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub turn_rotation: TurnRotation,
    /// Drop drawing events from everyone but the active member while a turn runs.
    pub enforce_turns: bool,
    pub snapshot_policy: SnapshotPolicy,
    /// `None` disables the turn countdown driver.
    pub tick_interval: Option<Duration>,
    pub command_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            turn_rotation: TurnRotation::RoundRobin,
            enforce_turns: false,
            snapshot_policy: SnapshotPolicy::OnStrokeEnd,
            tick_interval: Some(Duration::from_secs(1)),
            command_buffer: 256,
        }
    }
}

/// Owns every room, membership and snapshot. Runs as a single task, so all
/// mutations are serialized.
struct Server {
    registry: RoomRegistry,
    snapshots: SnapshotStore,
    connections: ConnectionTxStorage,
    authenticator: Box<dyn Authenticator>,
    config: ServerConfig,
}

impl Server {
    fn new(
        config: ServerConfig,
        authenticator: Box<dyn Authenticator>,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            registry: RoomRegistry::new(),
            snapshots,
            connections: ConnectionTxStorage::new(),
            authenticator,
            config,
        }
    }

    /// Brings back the rooms persisted by earlier runs.
    async fn restore(&mut self) {
        for record in self.snapshots.open().await {
            let room_id = record.id;
            match self.registry.restore_room(record) {
                Ok(summary) => log::info!("Room {} restored with code {}", room_id, summary.code),
                Err(e) => log::warn!("Room {} not restored: {}", room_id, e),
            }
        }
    }

    fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connection(command) => self.handle_connection_command(command),
            ServerCommand::Admin(command) => self.handle_admin_command(command),
            ServerCommand::Tick => self.tick(),
        }
    }

    fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx, credential } => self.connect(tx, credential),
            ConnectionCommand::Disconnect { from } => {
                if let Some(departure) = self.registry.disconnect(from) {
                    self.announce_departure(departure);
                }
                if self.connections.remove(&from).is_some() {
                    log::info!("Connection {} disconnected", from);
                }
            }
            ConnectionCommand::IdentifiableCommand {
                from,
                command:
                    IdentifiableCommand {
                        command_id,
                        command,
                    },
            } => match self.handle_system_command(from, command_id, command) {
                Ok(Some(system_event)) => {
                    self.reply(from, command_id, CommandResult::Event(system_event))
                }
                Ok(None) => {}
                Err(system_error) if system_error.is_fatal() => {
                    log::warn!(
                        "Disconnecting connection {} due to fatal error: {}",
                        from,
                        system_error
                    );
                    self.disconnect(from, system_error);
                }
                Err(system_error) => {
                    log::debug!("Command from connection {} failed: {}", from, system_error);
                    self.reply(from, command_id, CommandResult::Error(system_error));
                }
            },
        }
    }

    fn connect(&mut self, tx: ConnectionTx, credential: Option<String>) {
        let connection_id = self.registry.create_connection();
        self.connections.insert(connection_id, tx);

        let user_id = match self.authenticator.authenticate(credential.as_deref()) {
            Ok(user_id) => user_id,
            Err(e) => {
                log::warn!("Connection {} failed to authenticate: {}", connection_id, e);
                self.disconnect(connection_id, SystemError::Unauthorized);
                return;
            }
        };
        if let Err(e) = self.registry.authenticate(connection_id, user_id.clone()) {
            log::error!("Connection {} in unexpected state: {}", connection_id, e);
            self.disconnect(connection_id, e);
            return;
        }

        log::info!("Connection {} authenticated as {}", connection_id, user_id);
        self.connections
            .send(&connection_id, ConnectionEvent::Connected { connection_id });
        self.connections.send(
            &connection_id,
            ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                system_event: SystemEvent::Connected {
                    connection_id,
                    user_id,
                    snapshot_policy: self.config.snapshot_policy,
                },
            }),
        );
    }

    fn handle_system_command(
        &mut self,
        from: ConnectionId,
        command_id: CommandId,
        command: SystemCommand,
    ) -> Result<Option<SystemEvent>, SystemError> {
        match self.registry.connection_state(from) {
            Some(ConnectionState::Authenticated(_)) | Some(ConnectionState::Joined(..)) => {}
            _ => return Err(SystemError::NotAuthenticated),
        }

        match command {
            SystemCommand::CreateRoom { name, code } => {
                let summary = self.create_room(&name, code.as_deref())?;
                self.join_room(from, &RoomRef::Id(summary.id)).map(Some)
            }
            SystemCommand::JoinRoom { room } => self.join_room(from, &room).map(Some),
            SystemCommand::LeaveRoom => Ok(self
                .leave_room(from)
                .map(|room_id| SystemEvent::LeftRoom { room_id })),
            SystemCommand::Draw(event) => self.relay(from, event).map(|_| None),
            SystemCommand::Cursor { point } => self.relay_cursor(from, point).map(|_| None),
            SystemCommand::PushSnapshot { payload } => {
                self.push_snapshot(from, command_id, payload).map(|_| None)
            }
            SystemCommand::StartTurn {
                member,
                duration_seconds,
            } => self
                .start_turn(from, member, duration_seconds)
                .map(|info| Some(SystemEvent::TurnStarted(info))),
        }
    }

    fn create_room(&mut self, name: &str, code: Option<&str>) -> Result<RoomSummary, SystemError> {
        let summary = self.registry.create_room(name, code)?;
        if let Some(record) = self.registry.room(&summary.id).map(Room::record) {
            self.snapshots.track_room(record);
        }
        Ok(summary)
    }

    /// Registers the membership and catches the joiner up with the room's
    /// latest snapshot. Only the joiner receives the snapshot.
    fn join_room(
        &mut self,
        from: ConnectionId,
        room_ref: &RoomRef,
    ) -> Result<SystemEvent, SystemError> {
        let outcome = self.registry.join(from, room_ref)?;
        if let Some(departure) = outcome.departure {
            self.announce_departure(departure);
        }
        if !outcome.already_joined {
            self.broadcast_members(&outcome.room_id, Some(from));
        }

        let room = self
            .registry
            .room(&outcome.room_id)
            .ok_or(SystemError::RoomNotFound)?;
        let summary = room.summary();
        let members = room.members.clone();
        let turn = room.turn_info();
        let snapshot = self.snapshots.get(&outcome.room_id);

        Ok(SystemEvent::JoinedRoom {
            room: summary,
            members,
            snapshot,
            turn,
        })
    }

    fn leave_room(&mut self, from: ConnectionId) -> Option<RoomId> {
        match self.registry.leave(from) {
            Some(departure) => {
                let room_id = departure.room_id;
                self.announce_departure(departure);
                Some(room_id)
            }
            None => {
                log::debug!("Connection {} isn't in any room, nothing to leave", from);
                None
            }
        }
    }

    /// Forwards a drawing event unmodified to every other member of the
    /// sender's room. Events from connections outside any room are dropped.
    fn relay(&mut self, from: ConnectionId, event: DrawingEvent) -> Result<(), SystemError> {
        let room_id = match self.registry.room_of(from) {
            Some(room_id) => room_id,
            None => {
                log::debug!(
                    "Dropping drawing event from connection {} outside of any room",
                    from
                );
                return Ok(());
            }
        };
        if let Err(e) = event.validate() {
            log::warn!("Dropping drawing event from connection {}: {}", from, e);
            return Err(e);
        }
        if !self.may_draw(&room_id, from) {
            log::debug!(
                "Dropping drawing event from connection {}: not their turn",
                from
            );
            return Ok(());
        }

        if event.is_clear() {
            self.snapshots.evict(&room_id);
        }
        self.broadcast_room_event(&room_id, RoomEvent::Drawing { from, event }, Some(from));
        Ok(())
    }

    fn may_draw(&self, room_id: &RoomId, from: ConnectionId) -> bool {
        if !self.config.enforce_turns {
            return true;
        }
        self.registry
            .room(room_id)
            .and_then(|room| room.turn.as_ref())
            .map_or(true, |turn| turn.member == from)
    }

    fn relay_cursor(&mut self, from: ConnectionId, point: Point) -> Result<(), SystemError> {
        let room_id = match self.registry.room_of(from) {
            Some(room_id) => room_id,
            None => return Ok(()),
        };
        validate_point("point", &point)?;
        self.broadcast_room_event(
            &room_id,
            RoomEvent::Cursor {
                connection_id: from,
                point,
            },
            Some(from),
        );
        Ok(())
    }

    /// Stores the snapshot right away. A failed file write is answered later
    /// with an error ack for `command_id`.
    fn push_snapshot(
        &mut self,
        from: ConnectionId,
        command_id: CommandId,
        payload: String,
    ) -> Result<(), SystemError> {
        let room_id = self.registry.room_of(from).ok_or(SystemError::NotInRoom)?;
        let (snapshot, pending) = self.snapshots.put(room_id, payload);
        log::debug!(
            "Room {} snapshot updated by connection {} ({} bytes)",
            room_id,
            from,
            snapshot.payload.len()
        );

        if let (Some(pending), Some(tx)) = (pending, self.connections.get(&from)) {
            tokio::spawn(async move {
                if let Err(e) = pending.finished().await {
                    log::warn!("Failed to persist snapshot of room {}: {}", room_id, e);
                    let result =
                        CommandResult::Error(SystemError::SnapshotWriteFailure(e.to_string()));
                    let event = ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself {
                        command_id,
                        result,
                    });
                    if tx.send(event).await.is_err() {
                        log::debug!("Connection {} closed before its write failure ack", from);
                    }
                }
            });
        }
        Ok(())
    }

    fn start_turn(
        &mut self,
        from: ConnectionId,
        member: ConnectionId,
        duration_seconds: u32,
    ) -> Result<TurnInfo, SystemError> {
        let room_id = self.registry.room_of(from).ok_or(SystemError::NotInRoom)?;
        let room = self
            .registry
            .room_mut(&room_id)
            .ok_or(SystemError::RoomNotFound)?;
        let event = turn::start_turn(room, from, member, duration_seconds)?;
        log::info!(
            "Turn of connection {} started in room {} ({}s)",
            member,
            room_id,
            duration_seconds
        );
        self.broadcast_room_event(&room_id, event, None);
        Ok(TurnInfo {
            member,
            remaining_seconds: duration_seconds,
        })
    }

    fn tick(&mut self) {
        let rotation = self.config.turn_rotation;
        let pending: Vec<(RoomId, Vec<RoomEvent>)> = self
            .registry
            .rooms_mut()
            .filter(|room| room.turn.is_some())
            .map(|room| (room.id, turn::tick(room, rotation)))
            .collect();
        for (room_id, events) in pending {
            for event in events {
                self.broadcast_room_event(&room_id, event, None);
            }
        }
    }

    fn handle_admin_command(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::ListRooms { tx } => respond(tx, self.describe_rooms()),
            AdminCommand::CreateRoom { name, code, tx } => {
                respond(tx, self.create_room(&name, code.as_deref()))
            }
            AdminCommand::CloseRoom { room_id, tx } => {
                let result = self.registry.close_room(&room_id);
                if result.is_ok() {
                    self.snapshots.forget(&room_id);
                }
                respond(tx, result)
            }
            AdminCommand::Health { tx } => respond(
                tx,
                HealthReport {
                    status: "healthy",
                    rooms: self.registry.rooms().count(),
                    connections: self.connections.len(),
                },
            ),
        }
    }

    fn describe_rooms(&self) -> Vec<RoomDescription> {
        let mut rooms: Vec<RoomDescription> = self
            .registry
            .rooms()
            .map(|room| RoomDescription {
                summary: room.summary(),
                members: room.members.clone(),
                turn: room.turn_info(),
                has_snapshot: self.snapshots.has_snapshot(&room.id),
            })
            .collect();
        rooms.sort_by(|a, b| a.summary.created_at.cmp(&b.summary.created_at));
        rooms
    }

    fn announce_departure(&self, departure: Departure) {
        self.broadcast_members(&departure.room_id, None);
        if let Some(event) = departure.turn_event {
            self.broadcast_room_event(&departure.room_id, event, None);
        }
    }

    fn broadcast_members(&self, room_id: &RoomId, without: Option<ConnectionId>) {
        let event = RoomEvent::MembersChanged {
            room_id: *room_id,
            members: self.registry.member_infos(room_id),
        };
        self.broadcast_room_event(room_id, event, without);
    }

    fn broadcast_room_event(
        &self,
        room_id: &RoomId,
        room_event: RoomEvent,
        without: Option<ConnectionId>,
    ) {
        for connection_id in self.registry.members_of(room_id) {
            if Some(connection_id) != without {
                let event = ConnectionEvent::IdentifiableEvent(IdentifiableEvent::room_event(
                    room_event.clone(),
                ));
                self.connections.send(&connection_id, event);
            }
        }
    }

    fn reply(&self, to: ConnectionId, command_id: CommandId, result: CommandResult) {
        self.connections.send(
            &to,
            ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself { command_id, result }),
        );
    }

    fn disconnect(&mut self, connection_id: ConnectionId, reason: SystemError) {
        if let Some(departure) = self.registry.disconnect(connection_id) {
            self.announce_departure(departure);
        }
        self.connections.send(
            &connection_id,
            ConnectionEvent::Disconnected {
                connection_id,
                reason,
            },
        );
        self.connections.remove(&connection_id);
    }
}

fn respond<T>(tx: oneshot::Sender<T>, value: T) {
    if tx.send(value).is_err() {
        log::debug!("Admin requester went away before the answer");
    }
}

pub fn spawn_server(
    config: ServerConfig,
    authenticator: Box<dyn Authenticator>,
    snapshots: SnapshotStore,
) -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ServerCommand>(config.command_buffer);

    if let Some(period) = config.tick_interval {
        spawn_ticker(&srv_tx, period);
    }

    tokio::spawn(async move {
        let mut server = Box::new(Server::new(config, authenticator, snapshots));
        server.restore().await;

        while let Some(command) = srv_rx.recv().await {
            server.handle_command(command);
        }
        log::info!("Server stopped");
    });

    srv_tx
}

/// Drives turn countdowns. Holds only a weak handle so the server can stop
/// once every other sender is gone.
fn spawn_ticker(srv_tx: &ServerTx, period: Duration) {
    let srv_tx = srv_tx.downgrade();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let srv_tx = match srv_tx.upgrade() {
                Some(srv_tx) => srv_tx,
                None => break,
            };
            if srv_tx.send(ServerCommand::Tick).await.is_err() {
                break;
            }
        }
    });
}
