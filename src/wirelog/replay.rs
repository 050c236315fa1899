//! Speed-matched replay of log records.
//!
//! The first record is released immediately and anchors the mapping between
//! record time and wall-clock time. Every later record is held back until
//! the same span has elapsed on the wall clock as separated it from the
//! first record in the log.

use super::Record;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Spawn a reproducer between an input stream of records and a new output
/// stream. The output closes when the input does, or when the consumer
/// drops the receiver.
pub fn spawn(mut input: mpsc::UnboundedReceiver<Record>) -> mpsc::UnboundedReceiver<Record> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut anchor: Option<(Instant, i64)> = None;

        while let Some(record) = input.recv().await {
            match anchor {
                None => {
                    anchor = Some((Instant::now(), record.time));
                }
                Some((started, first_time)) => {
                    let elapsed_ns = record.time.saturating_sub(first_time).max(0);
                    let due = started + Duration::from_nanos(elapsed_ns as u64);
                    tokio::time::sleep_until(due).await;
                }
            }

            if tx.send(record).is_err() {
                return;
            }
        }
    });

    rx
}
