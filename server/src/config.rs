use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use system::SnapshotPolicy;

use crate::auth::{AuthError, Authenticator, OpenAuthenticator, TokenAuthenticator};
use crate::connection::ConnectionSettings;
use crate::server::ServerConfig;
use crate::snapshot_store::{SnapshotFiles, SnapshotStore};
use crate::turn::TurnRotation;

#[derive(Debug, Clone, Parser)]
#[command(name = "doodle-server", version, about = "Realtime doodle board sync server")]
pub struct Config {
    /// Address the HTTP and websocket listener binds to.
    #[arg(long, env = "DOODLE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Origins allowed by CORS.
    #[arg(
        long = "allowed-origin",
        env = "DOODLE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = [
            "http://localhost:5173".to_string(),
            "http://localhost:3000".to_string(),
        ]
    )]
    pub allowed_origins: Vec<String>,

    /// `<token>=<user id>` pairs. Without any, every non-empty credential is
    /// accepted as the user id.
    #[arg(long = "token", env = "DOODLE_TOKENS", value_delimiter = ',')]
    pub tokens: Vec<String>,

    /// Directory snapshots are written to. Snapshots live in memory only when unset.
    #[arg(long, env = "DOODLE_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Seconds clients should wait between snapshot pushes. Clients push on
    /// every stroke end when unset.
    #[arg(long, env = "DOODLE_SNAPSHOT_INTERVAL")]
    pub snapshot_interval: Option<u32>,

    #[arg(long, env = "DOODLE_TURN_ROTATION", value_enum, default_value_t = TurnRotation::RoundRobin)]
    pub turn_rotation: TurnRotation,

    /// Only the member whose turn it is may draw while a turn runs.
    #[arg(long, env = "DOODLE_ENFORCE_TURNS")]
    pub enforce_turns: bool,

    /// Egress buffer per connection, in events.
    #[arg(long, env = "DOODLE_CONNECTION_BUFFER", default_value_t = 64)]
    pub connection_buffer: usize,
}

impl Config {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            turn_rotation: self.turn_rotation,
            enforce_turns: self.enforce_turns,
            snapshot_policy: match self.snapshot_interval {
                Some(seconds) => SnapshotPolicy::Interval { seconds },
                None => SnapshotPolicy::OnStrokeEnd,
            },
            tick_interval: Some(Duration::from_secs(1)),
            ..ServerConfig::default()
        }
    }

    pub fn authenticator(&self) -> Result<Box<dyn Authenticator>, AuthError> {
        if self.tokens.is_empty() {
            log::warn!("No tokens configured, accepting any credential as user id");
            Ok(Box::new(OpenAuthenticator))
        } else {
            Ok(Box::new(TokenAuthenticator::from_entries(&self.tokens)?))
        }
    }

    pub fn snapshot_store(&self) -> SnapshotStore {
        match &self.snapshot_dir {
            Some(dir) => SnapshotStore::with_files(SnapshotFiles::new(dir)),
            None => SnapshotStore::in_memory(),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            buffer: self.connection_buffer,
        }
    }
}
