//! Per-counterparty statistics derived from channel and payment history.

pub mod channels;
pub mod payments;
pub mod rank;

pub use channels::{
    channel_fee_report, channel_node_stats, channel_overall_stats, ChannelFeeReport,
    ChannelNodeStats, ChannelsOverallStats,
};
pub use payments::{payment_node_stats, PaymentNodeStats, Period};

use crate::channel::{Channel, ChannelError, NodeId};
use crate::payment::{ForwardPayment, Payment};
use std::collections::HashMap;

/// Combined channel and payment statistics for one counterparty.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStats {
    pub node_id: NodeId,
    pub channels: ChannelNodeStats,
    pub payments: PaymentNodeStats,
}

impl NodeStats {
    /// All-zero statistics, used to backfill counterparties with no
    /// observed activity so that ranking still covers them.
    pub fn empty(node_id: NodeId) -> Self {
        NodeStats {
            node_id,
            channels: ChannelNodeStats::default(),
            payments: PaymentNodeStats::default(),
        }
    }
}

/// Merge channel and payment statistics into one map. A counterparty seen
/// on only one side gets zeroes for the other.
pub fn node_stats(
    period: Period,
    payments: &[Payment],
    forwards: &[ForwardPayment],
    channels: &[Channel],
) -> Result<HashMap<NodeId, NodeStats>, ChannelError> {
    let channel_side = channel_node_stats(channels)?;
    let payment_side = payment_node_stats(period, payments, forwards);

    let mut merged: HashMap<NodeId, NodeStats> = HashMap::new();
    for (node_id, stats) in channel_side {
        merged
            .entry(node_id.clone())
            .or_insert_with(|| NodeStats::empty(node_id))
            .channels = stats;
    }
    for (node_id, stats) in payment_side {
        merged
            .entry(node_id.clone())
            .or_insert_with(|| NodeStats::empty(node_id))
            .payments = stats;
    }
    Ok(merged)
}
