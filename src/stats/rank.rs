//! Ranking functions over per-counterparty statistics.
//!
//! Every function is total: each input counterparty appears exactly once in
//! the output, sorted by rank with the highest first. Ordering between equal
//! ranks is unspecified.

use super::NodeStats;
use crate::channel::NodeId;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A counterparty with its computed rank.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedStat {
    pub rank: f64,
    pub stats: NodeStats,
}

fn ranked_desc<F>(node_stats: &HashMap<NodeId, NodeStats>, rank_of: F) -> Vec<RankedStat>
where
    F: Fn(&NodeStats) -> f64,
{
    let mut ranked: Vec<RankedStat> = node_stats
        .values()
        .map(|stats| RankedStat {
            rank: rank_of(stats),
            stats: stats.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| b.rank.partial_cmp(&a.rank).unwrap_or(Ordering::Equal));
    ranked
}

/// Rank by the number of completed payments sent to the counterparty.
pub fn rank_by_payment_sent_num(node_stats: &HashMap<NodeId, NodeStats>) -> Vec<RankedStat> {
    ranked_desc(node_stats, |stats| stats.payments.num_sent_payments as f64)
}

/// Rank by the average funds sent directly to the counterparty per day.
pub fn rank_by_average_payment_sent_flow(
    node_stats: &HashMap<NodeId, NodeStats>,
) -> Vec<RankedStat> {
    ranked_desc(node_stats, |stats| stats.payments.average_sent as f64)
}

/// Rank by payment volume through the counterparty. Received-forward flow
/// is weighted twice, matching the historical ranking output.
pub fn rank_by_payment_volume(node_stats: &HashMap<NodeId, NodeStats>) -> Vec<RankedStat> {
    ranked_desc(node_stats, |stats| {
        (stats.payments.average_sent + 2 * stats.payments.average_received_forward) as f64
    })
}

/// Rank by idleness of funds locked with the counterparty: the ratio of
/// overall locked funds to overall daily flow. The most idle node comes
/// first. With zero flow the divisor clamps to one and the rank equals the
/// raw locked sum.
pub fn rank_by_idle_funds(node_stats: &HashMap<NodeId, NodeStats>) -> Vec<RankedStat> {
    ranked_desc(node_stats, |stats| {
        let mut overall_flow = stats.payments.average_sent
            + stats.payments.average_sent_forward
            + stats.payments.average_received_forward;
        if overall_flow == 0 {
            overall_flow = 1;
        }

        let locked =
            stats.channels.locked_locally_overall + stats.channels.locked_remotely_overall;
        (locked / overall_flow) as f64
    })
}

/// Rank by the funds that must be locked additionally with the counterparty
/// so that outgoing payments do not start failing.
pub fn rank_by_needed_additional_capacity(
    node_stats: &HashMap<NodeId, NodeStats>,
) -> Vec<RankedStat> {
    ranked_desc(node_stats, |stats| {
        let sent_flow = (stats.payments.average_sent + stats.payments.average_sent_forward
            - stats.payments.average_received_forward)
            .max(0);

        let needed = (sent_flow - stats.channels.locked_locally_overall).max(0);
        needed as f64
    })
}
