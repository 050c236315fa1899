//! Client abstraction over the Lightning node daemon.
//!
//! Everything that talks to the node goes through [`LightningClient`] so the
//! control loop can be driven against a mock in tests. Production callers
//! wrap a concrete client in [`DeadlineClient`] so that a wedged daemon
//! cannot stall a control pass forever.

use crate::channel::{Amount, Channel, ChannelId, NodeId};
use crate::payment::{ForwardPayment, Payment, PaymentFilter};
use async_trait::async_trait;
use log::warn;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default per-call deadline for node RPCs.
pub const DEFAULT_CALL_DEADLINE: Duration = Duration::from_secs(25);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The call did not finish within the configured deadline.
    #[error("call deadline exceeded")]
    Deadline,

    /// Transport-level failure talking to the daemon.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The daemon answered with an error.
    #[error("{0}")]
    Rpc(String),
}

/// Terminal status of a payment attempt, as carried on the update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PaymentOutcome {
    Success,
    InsufficientFunds,
    ExternalFail,
    LocalFail,
}

/// A channel lifecycle change pushed by the daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelUpdate {
    pub channel_id: ChannelId,
    pub node_id: NodeId,
    pub local_balance: Amount,
    pub remote_balance: Amount,
    /// On-chain fee attached to the transition, if any.
    pub fee: Amount,
    /// How long the transition took to confirm, zero while still in flight.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub payment_id: String,
    pub status: PaymentOutcome,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub amount: Amount,
    /// Fee earned by us. Negative when the payment cost us money,
    /// e.g. a circular rebalancing payment.
    pub earned: i64,
}

/// Push notification about the node's local topology or payment activity.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkUpdate {
    ChannelOpening(ChannelUpdate),
    ChannelOpened(ChannelUpdate),
    ChannelClosing(ChannelUpdate),
    ChannelClosed(ChannelUpdate),
    ChannelUpdating(ChannelUpdate),
    ChannelUpdated(ChannelUpdate),
    Payment(PaymentUpdate),
}

/// Surface of the node daemon used by the liquidity manager.
///
/// This enables mock-based integration testing without a live node.
#[async_trait]
pub trait LightningClient: Send + Sync {
    /// All channels the node knows about, including pending and closed ones.
    async fn channels(&self) -> Result<Vec<Channel>, ClientError>;

    /// Ensure a peer connection to the given node exists.
    async fn connect_to_node(&self, node_id: &NodeId) -> Result<(), ClientError>;

    /// Open a channel to the given node with `amount` on our side.
    async fn open_channel(&self, node_id: &NodeId, amount: Amount) -> Result<(), ClientError>;

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, ClientError>;

    async fn list_forward_payments(&self) -> Result<Vec<ForwardPayment>, ClientError>;

    /// Confirmed on-chain funds at the node's disposal.
    async fn free_balance(&self) -> Result<Amount, ClientError>;

    /// On-chain funds awaiting confirmation.
    async fn pending_balance(&self) -> Result<Amount, ClientError>;

    /// Subscribe to topology and payment updates. Each call returns an
    /// independent stream.
    fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<NetworkUpdate>;
}

#[async_trait]
impl<C: LightningClient + ?Sized> LightningClient for Arc<C> {
    async fn channels(&self) -> Result<Vec<Channel>, ClientError> {
        (**self).channels().await
    }

    async fn connect_to_node(&self, node_id: &NodeId) -> Result<(), ClientError> {
        (**self).connect_to_node(node_id).await
    }

    async fn open_channel(&self, node_id: &NodeId, amount: Amount) -> Result<(), ClientError> {
        (**self).open_channel(node_id, amount).await
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, ClientError> {
        (**self).list_payments(filter).await
    }

    async fn list_forward_payments(&self) -> Result<Vec<ForwardPayment>, ClientError> {
        (**self).list_forward_payments().await
    }

    async fn free_balance(&self) -> Result<Amount, ClientError> {
        (**self).free_balance().await
    }

    async fn pending_balance(&self) -> Result<Amount, ClientError> {
        (**self).pending_balance().await
    }

    fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<NetworkUpdate> {
        (**self).subscribe_updates()
    }
}

/// Bounds every async call of the wrapped client with a fixed deadline. On
/// expiry the call fails with [`ClientError::Deadline`] and the caller is
/// expected to abort its current pass and retry on the next tick.
pub struct DeadlineClient<C> {
    inner: C,
    deadline: Duration,
}

impl<C> DeadlineClient<C> {
    pub fn new(inner: C) -> Self {
        Self::with_deadline(inner, DEFAULT_CALL_DEADLINE)
    }

    pub fn with_deadline(inner: C, deadline: Duration) -> Self {
        DeadlineClient { inner, deadline }
    }

    async fn bound<T, F>(&self, name: &str, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Client call {} exceeded its {}s deadline",
                    name,
                    self.deadline.as_secs()
                );
                Err(ClientError::Deadline)
            }
        }
    }
}

#[async_trait]
impl<C: LightningClient> LightningClient for DeadlineClient<C> {
    async fn channels(&self) -> Result<Vec<Channel>, ClientError> {
        self.bound("Channels", self.inner.channels()).await
    }

    async fn connect_to_node(&self, node_id: &NodeId) -> Result<(), ClientError> {
        self.bound("ConnectToNode", self.inner.connect_to_node(node_id))
            .await
    }

    async fn open_channel(&self, node_id: &NodeId, amount: Amount) -> Result<(), ClientError> {
        self.bound("OpenChannel", self.inner.open_channel(node_id, amount))
            .await
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, ClientError> {
        self.bound("ListPayments", self.inner.list_payments(filter))
            .await
    }

    async fn list_forward_payments(&self) -> Result<Vec<ForwardPayment>, ClientError> {
        self.bound("ListForwardPayments", self.inner.list_forward_payments())
            .await
    }

    async fn free_balance(&self) -> Result<Amount, ClientError> {
        self.bound("FreeBalance", self.inner.free_balance()).await
    }

    async fn pending_balance(&self) -> Result<Amount, ClientError> {
        self.bound("PendingBalance", self.inner.pending_balance())
            .await
    }

    fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<NetworkUpdate> {
        self.inner.subscribe_updates()
    }
}

// ---------------------------------------------------------------------------
// Mock client for integration testing
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Mock node client that returns preset responses and records calls.
    #[derive(Default)]
    pub struct MockClient {
        pub channels: Mutex<Vec<Channel>>,
        pub payments: Mutex<Vec<Payment>>,
        pub forwards: Mutex<Vec<ForwardPayment>>,
        pub free_balance: Mutex<Amount>,
        pub pending_balance: Mutex<Amount>,

        /// When set, every open_channel call fails with this error.
        pub fail_open: Mutex<Option<ClientError>>,
        /// Nodes for which connect_to_node fails.
        pub unreachable: Mutex<HashSet<NodeId>>,

        // Call recorders
        pub connect_calls: Arc<Mutex<Vec<NodeId>>>,
        pub open_calls: Arc<Mutex<Vec<(NodeId, Amount)>>>,

        update_senders: Mutex<Vec<mpsc::UnboundedSender<NetworkUpdate>>>,
    }

    impl MockClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_channels(&self, channels: Vec<Channel>) {
            *self.channels.lock().unwrap() = channels;
        }

        pub fn set_payments(&self, payments: Vec<Payment>) {
            *self.payments.lock().unwrap() = payments;
        }

        pub fn set_forwards(&self, forwards: Vec<ForwardPayment>) {
            *self.forwards.lock().unwrap() = forwards;
        }

        /// Push an update to every subscriber.
        pub fn push_update(&self, update: NetworkUpdate) {
            for tx in self.update_senders.lock().unwrap().iter() {
                let _ = tx.send(update.clone());
            }
        }

        pub fn opened(&self) -> Vec<(NodeId, Amount)> {
            self.open_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LightningClient for MockClient {
        async fn channels(&self) -> Result<Vec<Channel>, ClientError> {
            Ok(self.channels.lock().unwrap().clone())
        }

        async fn connect_to_node(&self, node_id: &NodeId) -> Result<(), ClientError> {
            self.connect_calls.lock().unwrap().push(node_id.clone());
            if self.unreachable.lock().unwrap().contains(node_id) {
                return Err(ClientError::Rpc(format!("unable to reach {node_id}")));
            }
            Ok(())
        }

        async fn open_channel(
            &self,
            node_id: &NodeId,
            amount: Amount,
        ) -> Result<(), ClientError> {
            self.open_calls
                .lock()
                .unwrap()
                .push((node_id.clone(), amount));
            if let Some(err) = self.fail_open.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(())
        }

        async fn list_payments(
            &self,
            filter: &PaymentFilter,
        ) -> Result<Vec<Payment>, ClientError> {
            Ok(self
                .payments
                .lock()
                .unwrap()
                .iter()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect())
        }

        async fn list_forward_payments(&self) -> Result<Vec<ForwardPayment>, ClientError> {
            Ok(self.forwards.lock().unwrap().clone())
        }

        async fn free_balance(&self) -> Result<Amount, ClientError> {
            Ok(*self.free_balance.lock().unwrap())
        }

        async fn pending_balance(&self) -> Result<Amount, ClientError> {
            Ok(*self.pending_balance.lock().unwrap())
        }

        fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<NetworkUpdate> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.update_senders.lock().unwrap().push(tx);
            rx
        }
    }

    /// Client whose calls never resolve, for deadline tests.
    pub struct StuckClient;

    #[async_trait]
    impl LightningClient for StuckClient {
        async fn channels(&self) -> Result<Vec<Channel>, ClientError> {
            std::future::pending().await
        }

        async fn connect_to_node(&self, _node_id: &NodeId) -> Result<(), ClientError> {
            std::future::pending().await
        }

        async fn open_channel(
            &self,
            _node_id: &NodeId,
            _amount: Amount,
        ) -> Result<(), ClientError> {
            std::future::pending().await
        }

        async fn list_payments(
            &self,
            _filter: &PaymentFilter,
        ) -> Result<Vec<Payment>, ClientError> {
            std::future::pending().await
        }

        async fn list_forward_payments(&self) -> Result<Vec<ForwardPayment>, ClientError> {
            std::future::pending().await
        }

        async fn free_balance(&self) -> Result<Amount, ClientError> {
            std::future::pending().await
        }

        async fn pending_balance(&self) -> Result<Amount, ClientError> {
            std::future::pending().await
        }

        fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<NetworkUpdate> {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        }
    }
}
