//! Tailing reader for the update log.
//!
//! Polls the file for appended bytes and decodes complete frames as they
//! land. A frame that is only partially on disk is left for the next poll,
//! since the writer may be in the middle of an append. A frame that decodes
//! to garbage is fatal: the watcher reports it and closes the stream.

use super::{FrameError, Record};
use log::{error, info};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Handle to a background task following a log file. Dropping the receiver
/// or calling [`LogWatcher::stop`] ends the task; stop is idempotent.
pub struct LogWatcher {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LogWatcher {
    /// Start following `path` from the beginning of the file. The file does
    /// not have to exist yet; it is picked up once created.
    pub fn start(path: PathBuf) -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Start watching log file({})", path.display());
            let mut cursor: u64 = 0;
            let mut poll = tokio::time::interval(POLL_INTERVAL);

            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        match drain_new_records(&path, cursor) {
                            Ok((records, new_cursor)) => {
                                cursor = new_cursor;
                                for record in records {
                                    if tx.send(record).is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(err) => {
                                error!(
                                    "Stopped watching log file({}): {err}",
                                    path.display()
                                );
                                return;
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        info!("Stopped watching log file({})", path.display());
                        return;
                    }
                }
            }
        });

        (
            LogWatcher {
                stop: stop_tx,
                handle,
            },
            rx,
        )
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub async fn join(self) {
        self.stop();
        let _ = self.handle.await;
    }
}

/// Decode every complete frame appended past `cursor`. Returns the decoded
/// records and the new cursor, which stops right before any incomplete
/// trailing frame.
fn drain_new_records(path: &Path, cursor: u64) -> Result<(Vec<Record>, u64), FrameError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok((Vec::new(), cursor)),
        Err(err) => return Err(FrameError::Io(err)),
    };

    let len = file.metadata()?.len();
    if len <= cursor {
        return Ok((Vec::new(), cursor));
    }

    file.seek(SeekFrom::Start(cursor))?;
    let mut buf = Vec::with_capacity((len - cursor) as usize);
    file.take(len - cursor).read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut consumed = 0usize;
    loop {
        let remaining = &buf[consumed..];
        if remaining.len() < 2 {
            break;
        }
        let frame_len = u16::from_be_bytes([remaining[0], remaining[1]]) as usize;
        if remaining.len() < 2 + frame_len {
            break;
        }
        let record = bincode::deserialize(&remaining[2..2 + frame_len])?;
        records.push(record);
        consumed += 2 + frame_len;
    }

    Ok((records, cursor + consumed as u64))
}
