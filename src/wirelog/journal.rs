//! Update log writer.
//!
//! Subscribes to the node's update stream and appends a record per change,
//! plus a fresh topology snapshot shortly after each burst of changes. The
//! file is opened per append so external consumers tailing the file see
//! every write promptly.

use super::{
    write_record, ChangeKind, ChannelChange, Event, FrameError, PaymentRecord, Record,
    SnapshotChannel, StateSnapshot,
};
use crate::client::{ChannelUpdate, LightningClient, NetworkUpdate};
use anyhow::Context;
use log::{debug, info};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Delay between the last observed change and the snapshot that follows it,
/// so a burst of changes produces one snapshot instead of many.
pub const SNAPSHOT_DELAY: Duration = Duration::from_secs(3);

pub struct Journal<C> {
    client: C,
    path: PathBuf,
}

impl<C: LightningClient> Journal<C> {
    pub fn new(client: C, path: PathBuf) -> Self {
        Journal { client, path }
    }

    /// Write the node's current topology as a snapshot record.
    async fn snapshot(&self) -> anyhow::Result<Record> {
        let channels = self.client.channels().await?;

        // The balances can move between these calls; the snapshot is a best
        // effort, the change records are authoritative.
        let free_balance = self.client.free_balance().await?;
        let pending_balance = self.client.pending_balance().await?;

        let channels = channels
            .iter()
            .map(|channel| {
                let (local_balance, remote_balance) = channel.balances();
                SnapshotChannel {
                    channel_id: channel.channel_id.clone(),
                    node_id: channel.node_id.clone(),
                    local_balance,
                    remote_balance,
                    is_pending: channel.is_pending(),
                }
            })
            .collect();

        Ok(Record {
            time: now_nanos(),
            event: Event::State(StateSnapshot {
                channels,
                free_balance,
                pending_balance,
                average_change_duration_ms: 0,
            }),
        })
    }

    fn append(&self, record: &Record) -> Result<(), FrameError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write_record(&mut file, record)
    }

    /// Consume the update stream until it closes or shutdown is signalled.
    /// Any write or snapshot failure stops the journal and is returned.
    pub async fn run(
        &self,
        mut updates: mpsc::UnboundedReceiver<NetworkUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("Start update journal, log path({})", self.path.display());

        let record = self.snapshot().await?;
        self.append(&record)
            .with_context(|| format!("unable to append to {}", self.path.display()))?;

        let mut snapshot_due: Option<Instant> = None;

        loop {
            let due = snapshot_due;
            let wait_snapshot = async move {
                match due {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                maybe_update = updates.recv() => {
                    match maybe_update {
                        Some(update) => {
                            debug!("Update received, logging: {update:?}");
                            let record = record_from_update(update);
                            self.append(&record).with_context(|| {
                                format!("unable to append to {}", self.path.display())
                            })?;

                            if snapshot_due.is_none() {
                                snapshot_due = Some(Instant::now() + SNAPSHOT_DELAY);
                            }
                        }
                        None => {
                            info!("Update stream closed, stopping journal");
                            return Ok(());
                        }
                    }
                }
                _ = wait_snapshot => {
                    debug!("Synchronising node topology into the log");
                    let record = self.snapshot().await?;
                    self.append(&record).with_context(|| {
                        format!("unable to append to {}", self.path.display())
                    })?;
                    snapshot_due = None;
                }
                _ = shutdown.changed() => {
                    info!("Stopped update journal, log path({})", self.path.display());
                    return Ok(());
                }
            }
        }
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

fn change(kind: ChangeKind, update: ChannelUpdate) -> Event {
    Event::ChannelChange(ChannelChange {
        kind,
        channel_id: update.channel_id,
        node_id: update.node_id,
        local_balance: update.local_balance,
        remote_balance: update.remote_balance,
        fee: update.fee,
        duration_ms: update.duration_ms,
    })
}

/// Map a push update to the record that represents it in the log.
pub fn record_from_update(update: NetworkUpdate) -> Record {
    let event = match update {
        NetworkUpdate::ChannelOpening(u) => change(ChangeKind::Opening, u),
        NetworkUpdate::ChannelOpened(u) => change(ChangeKind::Opened, u),
        NetworkUpdate::ChannelClosing(u) => change(ChangeKind::Closing, u),
        NetworkUpdate::ChannelClosed(u) => change(ChangeKind::Closed, u),
        NetworkUpdate::ChannelUpdating(u) => change(ChangeKind::Updating, u),
        NetworkUpdate::ChannelUpdated(u) => change(ChangeKind::Updated, u),
        NetworkUpdate::Payment(u) => Event::Payment(PaymentRecord {
            payment_id: u.payment_id,
            status: u.status,
            sender: u.sender,
            receiver: u.receiver,
            amount: u.amount,
            earned: u.earned,
        }),
    };

    Record {
        time: now_nanos(),
        event,
    }
}
