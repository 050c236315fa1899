//! Channel-derived statistics: locked balances per counterparty, fee
//! spending reports and overall lock-up numbers.

use crate::channel::{Amount, Channel, ChannelError, NodeId, StateName};
use std::collections::HashMap;

/// Channel statistics attached to one counterparty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelNodeStats {
    /// Funds usable right now for sending payments.
    pub locked_locally_active: Amount,

    /// Funds usable right now for receiving payments.
    pub locked_remotely_active: Amount,

    /// Funds locked on our side, including pending channels.
    pub locked_locally_overall: Amount,

    /// Funds locked on the counterparty side, including pending channels.
    pub locked_remotely_overall: Amount,
}

/// Aggregate locked balances per counterparty. Opening channels count
/// towards the overall numbers only; opened channels count towards the
/// active numbers as well when the peer is reachable. Closing and closed
/// channels lock nothing usable and are skipped.
pub fn channel_node_stats(
    channels: &[Channel],
) -> Result<HashMap<NodeId, ChannelNodeStats>, ChannelError> {
    let mut node_stats: HashMap<NodeId, ChannelNodeStats> = HashMap::new();

    for channel in channels {
        let stat = node_stats.entry(channel.node_id.clone()).or_default();

        match channel.current_state() {
            StateName::Opening => {
                let state = channel.opening().ok_or_else(|| ChannelError::StateNotFound {
                    channel: channel.channel_id.clone(),
                    state: StateName::Opening,
                })?;
                stat.locked_locally_overall += state.local_balance;
                stat.locked_remotely_overall += state.remote_balance;
            }
            StateName::Opened => {
                let state = channel.opened().ok_or_else(|| ChannelError::StateNotFound {
                    channel: channel.channel_id.clone(),
                    state: StateName::Opened,
                })?;
                if channel.is_active() {
                    stat.locked_locally_active += state.local_balance;
                    stat.locked_remotely_active += state.remote_balance;
                }
                stat.locked_locally_overall += state.local_balance;
                stat.locked_remotely_overall += state.remote_balance;
            }
            StateName::Closing | StateName::Closed => {}
        }
    }

    Ok(node_stats)
}

/// Fee spending on channel management over a reporting window.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFeeReport {
    /// Half-open window `[start_time, end_time)` in unix seconds.
    pub start_time: i64,
    pub end_time: i64,

    /// Funds spent opening channels inside the window.
    pub open_channel_fee: Amount,

    /// Channels whose open fee was counted.
    pub open_channels: Vec<Channel>,

    /// Funds spent closing channels inside the window.
    pub close_channel_fee: Amount,

    /// Channels whose close fee was counted.
    pub close_channels: Vec<Channel>,

    /// Funds spent sweeping time-locked htlc outputs after closes.
    pub htlc_swipe_fee: Amount,
}

fn in_window(time: i64, start: i64, end: i64) -> bool {
    start <= time && time < end
}

/// Attribute channel management fees to the window in which they left our
/// wallet. Open fees count at the *opening* timestamp, never at
/// confirmation. Close and swipe fees count at the *closing* timestamp and
/// only once the channel reached closing or closed.
pub fn channel_fee_report(
    start_time: i64,
    end_time: i64,
    channels: &[Channel],
) -> Result<ChannelFeeReport, ChannelError> {
    let mut report = ChannelFeeReport {
        start_time,
        end_time,
        open_channel_fee: 0,
        open_channels: Vec::new(),
        close_channel_fee: 0,
        close_channels: Vec::new(),
        htlc_swipe_fee: 0,
    };

    for channel in channels {
        match channel.current_state() {
            StateName::Opening | StateName::Opened => {
                if in_window(channel.opening_time()?, start_time, end_time) {
                    report.open_channel_fee += channel.open_fee()?;
                    report.open_channels.push(channel.clone());
                }
            }
            StateName::Closing | StateName::Closed => {
                if in_window(channel.opening_time()?, start_time, end_time) {
                    report.open_channel_fee += channel.open_fee()?;
                    report.open_channels.push(channel.clone());
                }

                if in_window(channel.closing_time()?, start_time, end_time) {
                    report.close_channel_fee += channel.close_fee()?;
                    report.htlc_swipe_fee += channel.swipe_fee()?;
                    report.close_channels.push(channel.clone());
                }
            }
        }
    }

    Ok(report)
}

/// Current lock-up across all channels, not attached to any counterparty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelsOverallStats {
    /// Estimated funds needed to cooperatively close every channel.
    pub current_commit_fee: Amount,

    /// Funds stuck in limbo by in-flight closes.
    pub current_limbo_balance: Amount,

    /// Funds stuck in pending payments behind inactive peers.
    pub current_stuck_balance: Amount,
}

pub fn channel_overall_stats(
    channels: &[Channel],
) -> Result<ChannelsOverallStats, ChannelError> {
    let mut stats = ChannelsOverallStats::default();

    for channel in channels {
        match channel.current_state() {
            StateName::Opening => {
                stats.current_commit_fee += channel.commit_fee()?;
            }
            StateName::Opened => {
                stats.current_commit_fee += channel.commit_fee()?;
                stats.current_stuck_balance += channel.stuck_balance()?;
            }
            StateName::Closing => {
                stats.current_limbo_balance += channel.limbo_balance()?;
            }
            // Funds came back on-chain already.
            StateName::Closed => {}
        }
    }

    Ok(stats)
}
