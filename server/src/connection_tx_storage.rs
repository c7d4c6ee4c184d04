use crate::connection::ConnectionEvent;
use std::collections::HashMap;
use system::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

/// Egress channels of live connections. Sending never waits: a slow
/// connection loses events instead of stalling the server.
pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    pub fn send(&self, to: &ConnectionId, message: ConnectionEvent) {
        if let Some(tx) = self.connection_txs.get(to) {
            match tx.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::warn!("Connection {} is not keeping up, event dropped", to)
                }
                Err(TrySendError::Closed(_)) => {
                    log::debug!("Connection {} is already closed, event dropped", to)
                }
            }
        } else {
            log::warn!("No egress channel for connection {}", to);
        }
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.get(connection_id).cloned()
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connection_txs.len()
    }
}

impl Default for ConnectionTxStorage {
    fn default() -> Self {
        Self::new()
    }
}
