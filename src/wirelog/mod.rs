//! Append-only binary update log.
//!
//! Every record is framed as a 2-byte big-endian payload length followed by
//! the payload itself, so the file can be consumed incrementally by an
//! external process tailing it. The payload is a bincode-encoded [`Record`].

pub mod journal;
pub mod replay;
pub mod watch;

use crate::channel::{Amount, ChannelId, NodeId};
use crate::client::PaymentOutcome;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    /// The stream ended in the middle of a frame.
    #[error("log frame truncated mid-record")]
    Truncated,

    /// The encoded record does not fit the 16-bit length prefix.
    #[error("record of {0} bytes exceeds the 16-bit frame limit")]
    Oversize(usize),

    #[error("malformed record payload: {0}")]
    Malformed(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One entry of the update log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unix nanoseconds at which the record was written.
    pub time: i64,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Full snapshot of the node's local topology.
    State(StateSnapshot),
    ChannelChange(ChannelChange),
    Payment(PaymentRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub channels: Vec<SnapshotChannel>,
    pub free_balance: Amount,
    pub pending_balance: Amount,
    /// Average confirmation time of recent channel changes.
    pub average_change_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChannel {
    pub channel_id: ChannelId,
    pub node_id: NodeId,
    pub local_balance: Amount,
    pub remote_balance: Amount,
    pub is_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Opening,
    Opened,
    Closing,
    Closed,
    Updating,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelChange {
    pub kind: ChangeKind,
    pub channel_id: ChannelId,
    pub node_id: NodeId,
    pub local_balance: Amount,
    pub remote_balance: Amount,
    pub fee: Amount,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: String,
    pub status: PaymentOutcome,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub amount: Amount,
    /// Negative when the payment cost us money.
    pub earned: i64,
}

/// Append one framed record to the writer.
pub fn write_record<W: Write>(writer: &mut W, record: &Record) -> Result<(), FrameError> {
    let payload = bincode::serialize(record)?;
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::Oversize(payload.len()))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read the next framed record, or `None` at a clean end of stream. An end
/// of stream inside a frame is reported as [`FrameError::Truncated`].
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<Record>, FrameError> {
    let mut header = [0u8; 2];
    match read_full(reader, &mut header)? {
        0 => return Ok(None),
        2 => {}
        _ => return Err(FrameError::Truncated),
    }

    let len = u16::from_be_bytes(header) as usize;
    let mut payload = vec![0u8; len];
    if let Err(err) = reader.read_exact(&mut payload) {
        return Err(if err.kind() == ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(err)
        });
    }

    Ok(Some(bincode::deserialize(&payload)?))
}

/// Read every record until the end of the stream.
pub fn read_records<R: Read>(reader: &mut R) -> Result<Vec<Record>, FrameError> {
    let mut records = Vec::new();
    while let Some(record) = read_record(reader)? {
        records.push(record);
    }
    Ok(records)
}

// Fills the buffer, returning how many bytes were read before end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
pub(crate) fn sample_records() -> Vec<Record> {
    vec![
        Record {
            time: 1_000,
            event: Event::State(StateSnapshot {
                channels: vec![SnapshotChannel {
                    channel_id: "chan1".into(),
                    node_id: "alpha".into(),
                    local_balance: 90_000,
                    remote_balance: 10_000,
                    is_pending: false,
                }],
                free_balance: 500_000,
                pending_balance: 20_000,
                average_change_duration_ms: 600_000,
            }),
        },
        Record {
            time: 2_000,
            event: Event::ChannelChange(ChannelChange {
                kind: ChangeKind::Opening,
                channel_id: "chan2".into(),
                node_id: "beta".into(),
                local_balance: 40_000,
                remote_balance: 0,
                fee: 150,
                duration_ms: 0,
            }),
        },
        Record {
            time: 3_000,
            event: Event::Payment(PaymentRecord {
                payment_id: "pay1".to_string(),
                status: PaymentOutcome::Success,
                sender: "alpha".into(),
                receiver: "beta".into(),
                amount: 1_000,
                earned: -3,
            }),
        },
    ]
}
