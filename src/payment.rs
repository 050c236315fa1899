//! Payment and forward records as reported by the node.

use crate::channel::{Amount, ChannelId, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Waiting,
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentDirection {
    Incoming,
    Outgoing,
}

/// Whether the payment settled inside the hub or crossed the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentSystem {
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: String,
    /// Counterparty on the receiving end for outgoing payments.
    pub receiver: NodeId,
    /// Unix seconds of the last status change.
    pub updated_at: i64,
    pub status: PaymentStatus,
    pub direction: PaymentDirection,
    pub system: PaymentSystem,
    pub amount: Amount,
    /// Routing fee paid on top of the amount.
    pub media_fee: Amount,
}

/// A payment routed through us between two peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardPayment {
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub from_channel: ChannelId,
    pub to_channel: ChannelId,
    pub incoming_amount: Amount,
    pub outgoing_amount: Amount,
    pub forward_fee: Amount,
    /// Unix seconds at which the forward resolved.
    pub time: i64,
}

/// Criteria for listing payments. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFilter {
    pub asset: Option<String>,
    pub status: Option<PaymentStatus>,
    pub direction: Option<PaymentDirection>,
    pub system: Option<PaymentSystem>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.status.map(|s| s == payment.status).unwrap_or(true)
            && self
                .direction
                .map(|d| d == payment.direction)
                .unwrap_or(true)
            && self.system.map(|s| s == payment.system).unwrap_or(true)
    }
}
