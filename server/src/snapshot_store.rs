use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use system::chrono::Utc;
use system::{RoomId, Snapshot};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};

use crate::room::RoomRecord;

const ROOM_EXTENSION: &str = "room";
const SNAPSHOT_EXTENSION: &str = "snapshot";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("snapshot writer stopped")]
    WriterStopped,
}

/// Room records (`<room id>.room`) and their snapshots (`<room id>.snapshot`),
/// side by side in one directory.
pub struct SnapshotFiles {
    dir: PathBuf,
}

impl SnapshotFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, room_id: &RoomId) -> PathBuf {
        self.path(room_id, SNAPSHOT_EXTENSION)
    }

    pub fn room_path(&self, room_id: &RoomId) -> PathBuf {
        self.path(room_id, ROOM_EXTENSION)
    }

    pub async fn write_snapshot(
        &self,
        room_id: &RoomId,
        snapshot: &Snapshot,
    ) -> Result<(), SnapshotError> {
        self.write_json(room_id, SNAPSHOT_EXTENSION, snapshot).await
    }

    pub async fn read_snapshot(&self, room_id: &RoomId) -> Result<Option<Snapshot>, SnapshotError> {
        read_json(&self.snapshot_path(room_id)).await
    }

    pub async fn remove_snapshot(&self, room_id: &RoomId) -> Result<(), SnapshotError> {
        remove_file(&self.snapshot_path(room_id)).await
    }

    pub async fn write_room(&self, record: &RoomRecord) -> Result<(), SnapshotError> {
        self.write_json(&record.id, ROOM_EXTENSION, record).await
    }

    /// Removes the room record together with its snapshot.
    pub async fn remove_room(&self, room_id: &RoomId) -> Result<(), SnapshotError> {
        remove_file(&self.room_path(room_id)).await?;
        self.remove_snapshot(room_id).await
    }

    /// Every readable room record. A missing directory holds no rooms.
    pub async fn read_rooms(&self) -> Result<Vec<RoomRecord>, SnapshotError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != ROOM_EXTENSION) {
                continue;
            }
            match read_json::<RoomRecord>(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping room record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }

    fn path(&self, room_id: &RoomId, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", room_id, extension))
    }

    /// Writes to a side file first so readers never see a torn file.
    async fn write_json<T: Serialize>(
        &self,
        room_id: &RoomId,
        extension: &str,
        value: &T,
    ) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_vec(value)?;
        let partial = self.dir.join(format!("{}.{}.partial", room_id, extension));
        fs::write(&partial, content).await?;
        fs::rename(&partial, self.path(room_id, extension)).await?;
        Ok(())
    }

    async fn run(&self, job: FileJob) {
        match job {
            FileJob::WriteSnapshot {
                room_id,
                snapshot,
                done,
            } => {
                let result = self.write_snapshot(&room_id, &snapshot).await;
                if let Err(e) = &result {
                    log::warn!("Failed to write snapshot of room {}: {}", room_id, e);
                }
                let _ = done.send(result);
            }
            FileJob::RemoveSnapshot { room_id } => {
                if let Err(e) = self.remove_snapshot(&room_id).await {
                    log::warn!("Failed to remove snapshot of room {}: {}", room_id, e);
                }
            }
            FileJob::WriteRoom(record) => {
                if let Err(e) = self.write_room(&record).await {
                    log::warn!("Failed to write room record {}: {}", record.id, e);
                }
            }
            FileJob::RemoveRoom { room_id } => {
                if let Err(e) = self.remove_room(&room_id).await {
                    log::warn!("Failed to remove room record {}: {}", room_id, e);
                }
            }
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    match fs::read(path).await {
        Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_file(path: &Path) -> Result<(), SnapshotError> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[derive(Debug)]
enum FileJob {
    WriteSnapshot {
        room_id: RoomId,
        snapshot: Snapshot,
        done: oneshot::Sender<Result<(), SnapshotError>>,
    },
    RemoveSnapshot {
        room_id: RoomId,
    },
    WriteRoom(RoomRecord),
    RemoveRoom {
        room_id: RoomId,
    },
}

/// Applies file jobs one at a time, in submission order.
fn spawn_writer(files: SnapshotFiles) -> mpsc::UnboundedSender<FileJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<FileJob>();
    tokio::spawn(async move {
        log::debug!("snapshot writer - started");
        while let Some(job) = rx.recv().await {
            files.run(job).await;
        }
        log::debug!("snapshot writer - terminated");
    });
    tx
}

/// Resolves once a snapshot write reached the disk.
pub struct PendingWrite(oneshot::Receiver<Result<(), SnapshotError>>);

impl PendingWrite {
    pub async fn finished(self) -> Result<(), SnapshotError> {
        self.0.await.unwrap_or(Err(SnapshotError::WriterStopped))
    }
}

/// Single-slot snapshot per room, held in memory. With files, every change is
/// written behind by a background task and everything is loaded back by
/// [`SnapshotStore::open`].
///
/// A slot holding `None` means the room is known to have no snapshot.
pub struct SnapshotStore {
    slots: HashMap<RoomId, Option<Snapshot>>,
    files: Option<SnapshotFiles>,
    writer: Option<mpsc::UnboundedSender<FileJob>>,
}

impl SnapshotStore {
    pub fn in_memory() -> Self {
        Self {
            slots: HashMap::new(),
            files: None,
            writer: None,
        }
    }

    pub fn with_files(files: SnapshotFiles) -> Self {
        Self {
            slots: HashMap::new(),
            files: Some(files),
            writer: None,
        }
    }

    /// Loads every persisted room and its snapshot, then starts writing
    /// behind. Returns the rooms to restore. In-memory stores have none.
    pub async fn open(&mut self) -> Vec<RoomRecord> {
        let files = match self.files.take() {
            Some(files) => files,
            None => return Vec::new(),
        };

        let records = match files.read_rooms().await {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to load persisted rooms: {}", e);
                Vec::new()
            }
        };
        for record in &records {
            let snapshot = match files.read_snapshot(&record.id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    log::warn!("Failed to read snapshot of room {}: {}", record.id, e);
                    None
                }
            };
            self.slots.insert(record.id, snapshot);
        }

        self.writer = Some(spawn_writer(files));
        records
    }

    /// Overwrites the room's snapshot. Readers see it immediately. The handle
    /// reports the outcome of the file write, when files are used.
    pub fn put(&mut self, room_id: RoomId, payload: String) -> (Snapshot, Option<PendingWrite>) {
        let snapshot = Snapshot {
            payload,
            updated_at: Utc::now(),
        };
        self.slots.insert(room_id, Some(snapshot.clone()));

        let pending = self.writer.as_ref().map(|writer| {
            let (done, rx) = oneshot::channel();
            // A stopped writer drops `done`, which fails the handle.
            let _ = writer.send(FileJob::WriteSnapshot {
                room_id,
                snapshot: snapshot.clone(),
                done,
            });
            PendingWrite(rx)
        });
        (snapshot, pending)
    }

    pub fn get(&self, room_id: &RoomId) -> Option<Snapshot> {
        self.slots.get(room_id).cloned().flatten()
    }

    pub fn evict(&mut self, room_id: &RoomId) {
        self.slots.insert(*room_id, None);
        self.submit(FileJob::RemoveSnapshot { room_id: *room_id });
    }

    /// Starts persisting a newly created room.
    pub fn track_room(&mut self, record: RoomRecord) {
        self.slots.entry(record.id).or_insert(None);
        self.submit(FileJob::WriteRoom(record));
    }

    /// Drops every trace of a closed room.
    pub fn forget(&mut self, room_id: &RoomId) {
        self.slots.remove(room_id);
        self.submit(FileJob::RemoveRoom { room_id: *room_id });
    }

    pub fn has_snapshot(&self, room_id: &RoomId) -> bool {
        matches!(self.slots.get(room_id), Some(Some(_)))
    }

    fn submit(&self, job: FileJob) {
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.send(job) {
                log::error!("Snapshot writer stopped, lost {:?}", e.0);
            }
        }
    }
}
