//! Payment-derived statistics, averaged per day over a reporting period.

use crate::channel::{Amount, NodeId};
use crate::payment::{ForwardPayment, Payment, PaymentDirection, PaymentStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Reporting period over which averages are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Day,
    Week,
    Month,
    ThreeMonth,
}

impl Period {
    pub fn days(self) -> i64 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::ThreeMonth => 90,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::ThreeMonth => "three month",
        };
        f.write_str(s)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "three month" => Ok(Period::ThreeMonth),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

/// Payment statistics attached to one counterparty. Averages are satoshis
/// per day over the requested period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentNodeStats {
    /// Completed outgoing payments to this counterparty.
    pub num_sent_payments: u64,

    /// Forwards leaving through this counterparty.
    pub num_sent_forwards: u64,

    /// Forwards arriving from this counterparty.
    pub num_received_forwards: u64,

    /// Average funds sent directly to this counterparty.
    pub average_sent: Amount,

    /// Average funds forwarded out through this counterparty.
    pub average_sent_forward: Amount,

    /// Average funds forwarded in from this counterparty.
    pub average_received_forward: Amount,
}

/// Aggregate payment and forward activity per counterparty. Only completed
/// outgoing payments count towards the sent numbers; a forward contributes
/// its outgoing amount to the node it left through and its incoming amount
/// to the node it came from.
pub fn payment_node_stats(
    period: Period,
    payments: &[Payment],
    forwards: &[ForwardPayment],
) -> HashMap<NodeId, PaymentNodeStats> {
    let days = period.days();

    #[derive(Default)]
    struct Totals {
        num_sent: u64,
        num_sent_forward: u64,
        num_received_forward: u64,
        sent: Amount,
        sent_forward: Amount,
        received_forward: Amount,
    }

    let mut totals: HashMap<NodeId, Totals> = HashMap::new();

    for payment in payments {
        if payment.direction != PaymentDirection::Outgoing
            || payment.status != PaymentStatus::Completed
        {
            continue;
        }
        let t = totals.entry(payment.receiver.clone()).or_default();
        t.num_sent += 1;
        t.sent += payment.amount;
    }

    for forward in forwards {
        let to = totals.entry(forward.to_node.clone()).or_default();
        to.num_sent_forward += 1;
        to.sent_forward += forward.outgoing_amount;

        let from = totals.entry(forward.from_node.clone()).or_default();
        from.num_received_forward += 1;
        from.received_forward += forward.incoming_amount;
    }

    totals
        .into_iter()
        .map(|(node_id, t)| {
            let stats = PaymentNodeStats {
                num_sent_payments: t.num_sent,
                num_sent_forwards: t.num_sent_forward,
                num_received_forwards: t.num_received_forward,
                average_sent: t.sent / days,
                average_sent_forward: t.sent_forward / days,
                average_received_forward: t.received_forward / days,
            };
            (node_id, stats)
        })
        .collect()
}
