//! Channel lifecycle model.
//!
//! A channel moves through opening, opened, closing and closed. Each stage
//! carries its own snapshot of balances and fees, and the snapshot for a past
//! stage is retained so that, for example, the opening time of a channel that
//! has since closed is still available to fee reporting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Amount in satoshis. Signed so that fee deltas and rebalancing losses can
/// go negative.
pub type Amount = i64;

pub const SATOSHIS_PER_BITCOIN: i64 = 100_000_000;

/// Hex-encoded public key of a network node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Funding outpoint (or daemon-native identifier) of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        ChannelId(s.to_string())
    }
}

/// Which side funded the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initiator {
    Local,
    Remote,
}

/// Name of a lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateName {
    Opening,
    Opened,
    Closing,
    Closed,
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateName::Opening => "opening",
            StateName::Opened => "opened",
            StateName::Closing => "closing",
            StateName::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel never recorded the requested lifecycle stage.
    #[error("channel {channel} has no recorded {state} state")]
    StateNotFound { channel: ChannelId, state: StateName },

    /// The requested property is undefined while the channel sits in its
    /// current stage.
    #[error("{property} is not defined for channel {channel} in {state} state")]
    UnhandledState {
        channel: ChannelId,
        state: StateName,
        property: &'static str,
    },
}

/// Funding transaction broadcast, not yet confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningState {
    /// Unix seconds at which the funding transaction was seen.
    pub creation_time: i64,
    /// Fee reserved for the commitment transaction.
    pub commit_fee: Amount,
    /// On-chain fee paid to broadcast the funding transaction.
    pub open_fee: Amount,
    pub local_balance: Amount,
    pub remote_balance: Amount,
    pub initiator: Initiator,
}

/// Funding confirmed, channel usable for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedState {
    pub creation_time: i64,
    pub commit_fee: Amount,
    pub local_balance: Amount,
    pub remote_balance: Amount,
    /// Whether the counterparty is currently reachable.
    pub is_active: bool,
    /// Funds unusable because the peer is offline or the channel is disabled.
    pub stuck_balance: Amount,
}

/// Closing transaction broadcast, funds in limbo until confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingState {
    pub creation_time: i64,
    /// On-chain fee paid by the closing transaction.
    pub close_fee: Amount,
    /// On-chain fee paid to sweep time-locked outputs back to the wallet.
    pub swipe_fee: Amount,
    pub local_balance: Amount,
    pub remote_balance: Amount,
    /// Funds locked on-chain until the closing confirms.
    pub locked_balance: Amount,
}

/// Closing transaction confirmed, channel gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedState {
    pub creation_time: i64,
    pub close_fee: Amount,
    pub local_balance: Amount,
}

/// Stage snapshots accumulated over the channel's life. A stage the channel
/// never passed through (as observed by us) stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSet {
    pub opening: Option<OpeningState>,
    pub opened: Option<OpenedState>,
    pub closing: Option<ClosingState>,
    pub closed: Option<ClosedState>,
}

/// A payment channel to one counterparty, as last observed from the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub node_id: NodeId,
    current: StateName,
    states: StateSet,
}

impl Channel {
    pub fn new_opening(channel_id: ChannelId, node_id: NodeId, opening: OpeningState) -> Self {
        Channel {
            channel_id,
            node_id,
            current: StateName::Opening,
            states: StateSet {
                opening: Some(opening),
                ..StateSet::default()
            },
        }
    }

    /// Rebuild a channel first observed mid-life, e.g. one that was already
    /// closing when we started watching the node.
    pub fn from_observed(
        channel_id: ChannelId,
        node_id: NodeId,
        current: StateName,
        states: StateSet,
    ) -> Self {
        Channel {
            channel_id,
            node_id,
            current,
            states,
        }
    }

    pub fn mark_opened(&mut self, opened: OpenedState) {
        self.current = StateName::Opened;
        self.states.opened = Some(opened);
    }

    pub fn mark_closing(&mut self, closing: ClosingState) {
        self.current = StateName::Closing;
        self.states.closing = Some(closing);
    }

    pub fn mark_closed(&mut self, closed: ClosedState) {
        self.current = StateName::Closed;
        self.states.closed = Some(closed);
    }

    pub fn current_state(&self) -> StateName {
        self.current
    }

    pub fn is_pending(&self) -> bool {
        self.current == StateName::Opening
    }

    pub fn opening(&self) -> Option<&OpeningState> {
        self.states.opening.as_ref()
    }

    pub fn opened(&self) -> Option<&OpenedState> {
        self.states.opened.as_ref()
    }

    pub fn closing(&self) -> Option<&ClosingState> {
        self.states.closing.as_ref()
    }

    pub fn closed(&self) -> Option<&ClosedState> {
        self.states.closed.as_ref()
    }

    fn require_opening(&self) -> Result<&OpeningState, ChannelError> {
        self.opening().ok_or_else(|| ChannelError::StateNotFound {
            channel: self.channel_id.clone(),
            state: StateName::Opening,
        })
    }

    fn require_opened(&self) -> Result<&OpenedState, ChannelError> {
        self.opened().ok_or_else(|| ChannelError::StateNotFound {
            channel: self.channel_id.clone(),
            state: StateName::Opened,
        })
    }

    fn require_closing(&self) -> Result<&ClosingState, ChannelError> {
        self.closing().ok_or_else(|| ChannelError::StateNotFound {
            channel: self.channel_id.clone(),
            state: StateName::Closing,
        })
    }

    /// Unix seconds at which the funding transaction was broadcast. Defined
    /// for any channel whose opening stage was observed, regardless of the
    /// stage it sits in now.
    pub fn opening_time(&self) -> Result<i64, ChannelError> {
        Ok(self.require_opening()?.creation_time)
    }

    /// Unix seconds at which the closing transaction was broadcast.
    pub fn closing_time(&self) -> Result<i64, ChannelError> {
        Ok(self.require_closing()?.creation_time)
    }

    /// On-chain fee paid to open the channel.
    pub fn open_fee(&self) -> Result<Amount, ChannelError> {
        Ok(self.require_opening()?.open_fee)
    }

    /// On-chain fee paid to close the channel.
    pub fn close_fee(&self) -> Result<Amount, ChannelError> {
        Ok(self.require_closing()?.close_fee)
    }

    /// On-chain fee paid to sweep time-locked outputs after a close.
    pub fn swipe_fee(&self) -> Result<Amount, ChannelError> {
        Ok(self.require_closing()?.swipe_fee)
    }

    /// Commitment fee currently reserved. Only meaningful while the channel
    /// is opening or opened.
    pub fn commit_fee(&self) -> Result<Amount, ChannelError> {
        match self.current {
            StateName::Opening => Ok(self.require_opening()?.commit_fee),
            StateName::Opened => Ok(self.require_opened()?.commit_fee),
            state => Err(ChannelError::UnhandledState {
                channel: self.channel_id.clone(),
                state,
                property: "commit fee",
            }),
        }
    }

    /// Funds locked in limbo by an in-flight close.
    pub fn limbo_balance(&self) -> Result<Amount, ChannelError> {
        Ok(self.require_closing()?.locked_balance)
    }

    /// Funds stuck behind an inactive peer. Zero unless the channel is
    /// opened and inactive.
    pub fn stuck_balance(&self) -> Result<Amount, ChannelError> {
        Ok(self.require_opened()?.stuck_balance)
    }

    /// Whether the channel routes right now.
    pub fn is_active(&self) -> bool {
        self.current == StateName::Opened
            && self.opened().map(|s| s.is_active).unwrap_or(false)
    }

    /// Local and remote balances of the current stage. A closed channel
    /// reports its settled local balance and zero remote.
    pub fn balances(&self) -> (Amount, Amount) {
        match self.current {
            StateName::Opening => self
                .opening()
                .map(|s| (s.local_balance, s.remote_balance))
                .unwrap_or((0, 0)),
            StateName::Opened => self
                .opened()
                .map(|s| (s.local_balance, s.remote_balance))
                .unwrap_or((0, 0)),
            StateName::Closing => self
                .closing()
                .map(|s| (s.local_balance, s.remote_balance))
                .unwrap_or((0, 0)),
            StateName::Closed => self.closed().map(|s| (s.local_balance, 0)).unwrap_or((0, 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opening() -> OpeningState {
        OpeningState {
            creation_time: 100,
            commit_fee: 500,
            open_fee: 1000,
            local_balance: 90_000,
            remote_balance: 10_000,
            initiator: Initiator::Local,
        }
    }

    #[test]
    fn test_opening_time_survives_close() {
        let mut channel = Channel::new_opening("chan1".into(), "node1".into(), opening());
        channel.mark_opened(OpenedState {
            creation_time: 200,
            commit_fee: 500,
            local_balance: 90_000,
            remote_balance: 10_000,
            is_active: true,
            stuck_balance: 0,
        });
        channel.mark_closing(ClosingState {
            creation_time: 300,
            close_fee: 700,
            swipe_fee: 50,
            local_balance: 80_000,
            remote_balance: 20_000,
            locked_balance: 80_000,
        });
        channel.mark_closed(ClosedState {
            creation_time: 400,
            close_fee: 700,
            local_balance: 80_000,
        });

        assert_eq!(channel.current_state(), StateName::Closed);
        assert_eq!(channel.opening_time(), Ok(100));
        assert_eq!(channel.closing_time(), Ok(300));
        assert_eq!(channel.open_fee(), Ok(1000));
        assert_eq!(channel.close_fee(), Ok(700));
        assert_eq!(channel.swipe_fee(), Ok(50));
    }

    #[test]
    fn test_commit_fee_undefined_after_close() {
        let mut channel = Channel::new_opening("chan1".into(), "node1".into(), opening());
        channel.mark_closing(ClosingState {
            creation_time: 300,
            close_fee: 700,
            swipe_fee: 0,
            local_balance: 80_000,
            remote_balance: 20_000,
            locked_balance: 80_000,
        });

        assert_eq!(
            channel.commit_fee(),
            Err(ChannelError::UnhandledState {
                channel: "chan1".into(),
                state: StateName::Closing,
                property: "commit fee",
            })
        );
    }

    #[test]
    fn test_missing_state_reported() {
        let channel = Channel::from_observed(
            "chan2".into(),
            "node2".into(),
            StateName::Closing,
            StateSet {
                closing: Some(ClosingState {
                    creation_time: 300,
                    close_fee: 700,
                    swipe_fee: 0,
                    local_balance: 0,
                    remote_balance: 0,
                    locked_balance: 0,
                }),
                ..StateSet::default()
            },
        );

        assert_eq!(
            channel.opening_time(),
            Err(ChannelError::StateNotFound {
                channel: "chan2".into(),
                state: StateName::Opening,
            })
        );
        assert_eq!(channel.closing_time(), Ok(300));
    }

    #[test]
    fn test_active_only_when_opened_and_reachable() {
        let mut channel = Channel::new_opening("chan3".into(), "node3".into(), opening());
        assert!(!channel.is_active());
        assert!(channel.is_pending());

        channel.mark_opened(OpenedState {
            creation_time: 200,
            commit_fee: 500,
            local_balance: 90_000,
            remote_balance: 10_000,
            is_active: false,
            stuck_balance: 90_000,
        });
        assert!(!channel.is_active());
        assert_eq!(channel.stuck_balance(), Ok(90_000));

        channel.mark_opened(OpenedState {
            creation_time: 200,
            commit_fee: 500,
            local_balance: 90_000,
            remote_balance: 10_000,
            is_active: true,
            stuck_balance: 0,
        });
        assert!(channel.is_active());
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_closed_balances() {
        let channel = Channel::from_observed(
            "chan4".into(),
            "node4".into(),
            StateName::Closed,
            StateSet {
                closed: Some(ClosedState {
                    creation_time: 400,
                    close_fee: 100,
                    local_balance: 5_000,
                }),
                ..StateSet::default()
            },
        );
        assert_eq!(channel.balances(), (5_000, 0));
    }
}
