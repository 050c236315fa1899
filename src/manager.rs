//! Node manager: the liquidity control loop.
//!
//! Responsibilities:
//! 1. Keep track of important counterparties and stay connected to them.
//! 2. Keep adequately funded channels to them, opening new capacity when
//!    the observed payment flow outgrows what is locked locally.
//! 3. Report daily fee spending and lock-up against the configured USD
//!    ceilings. Breaches alert, they never trigger corrective action.
//! 4. Suggest where idle capacity could be freed when an open fails for
//!    lack of funds.

use crate::channel::{Amount, NodeId, SATOSHIS_PER_BITCOIN};
use crate::client::{ClientError, LightningClient};
use crate::metrics::{Metric, MetricsBackend, Severity};
use crate::payment::PaymentFilter;
use crate::price::PriceOracle;
use crate::stats::rank::{rank_by_idle_funds, rank_by_needed_additional_capacity};
use crate::stats::{channel_fee_report, channel_overall_stats, node_stats, NodeStats, Period};
use anyhow::{anyhow, Context};
use log::{debug, error, info, trace, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};

/// Pseudonyms handed out for counterparties outside the registry, so their
/// identities never reach display surfaces.
const PSEUDONYMS: &[&str] = &[
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy",
    "mallory", "niaj", "olivia", "peggy", "quentin", "rupert", "sybil", "trent", "victor",
    "wendy",
];

#[derive(Clone)]
pub struct ManagerConfig {
    /// Asset ticker used for metric labels, e.g. "BTC".
    pub asset: String,
    pub our_node_id: NodeId,
    /// Display name used instead of our own node id.
    pub our_name: String,

    /// Channels to important nodes are never opened smaller than this, to
    /// avoid dust channels whose close fees dwarf their usefulness.
    pub min_channel_size_usd: f64,
    /// Hard cap on a single channel open.
    pub max_channel_size_usd: f64,

    // Alerting ceilings for the daily report.
    pub max_close_spending_per_day_usd: f64,
    pub max_open_spending_per_day_usd: f64,
    pub max_commit_fee_usd: f64,
    pub max_limbo_usd: f64,
    pub max_stuck_balance_usd: f64,

    pub check_interval: Duration,
    pub report_interval: Duration,
}

impl ManagerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.asset.is_empty() {
            anyhow::bail!("asset should be specified");
        }
        if self.our_node_id.as_str().is_empty() {
            anyhow::bail!("our node id should be specified");
        }
        if self.our_name.is_empty() {
            anyhow::bail!("our node name should be specified");
        }
        if self.min_channel_size_usd <= 0.0 {
            anyhow::bail!("min channel size should be specified");
        }
        if self.max_channel_size_usd <= 0.0 {
            anyhow::bail!("max channel size should be specified");
        }
        if self.min_channel_size_usd > self.max_channel_size_usd {
            anyhow::bail!("min channel size is above max channel size");
        }
        if self.max_close_spending_per_day_usd <= 0.0 {
            anyhow::bail!("max close spending should be specified");
        }
        if self.max_open_spending_per_day_usd <= 0.0 {
            anyhow::bail!("max open spending should be specified");
        }
        if self.max_commit_fee_usd <= 0.0 {
            anyhow::bail!("max commit fee should be specified");
        }
        if self.max_limbo_usd <= 0.0 {
            anyhow::bail!("max limbo should be specified");
        }
        if self.max_stuck_balance_usd <= 0.0 {
            anyhow::bail!("max stuck balance should be specified");
        }
        if self.check_interval.is_zero() || self.report_interval.is_zero() {
            anyhow::bail!("check and report intervals should be non-zero");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn test_default() -> Self {
        ManagerConfig {
            asset: "BTC".to_string(),
            our_node_id: "our_node".into(),
            our_name: "Hub".to_string(),
            min_channel_size_usd: 50.0,
            max_channel_size_usd: 400.0,
            max_close_spending_per_day_usd: 1.0,
            max_open_spending_per_day_usd: 1.0,
            max_commit_fee_usd: 10.0,
            max_limbo_usd: 300.0,
            max_stuck_balance_usd: 300.0,
            check_interval: Duration::from_secs(25),
            report_interval: Duration::from_secs(86_400),
        }
    }
}

pub struct NodeManager<C> {
    cfg: ManagerConfig,
    client: C,
    oracle: Arc<dyn PriceOracle>,
    metrics: Arc<dyn MetricsBackend>,

    /// Counterparties we always keep funded channels with.
    important_nodes: Mutex<HashMap<NodeId, String>>,
}

impl<C: LightningClient> NodeManager<C> {
    pub fn new(
        cfg: ManagerConfig,
        client: C,
        oracle: Arc<dyn PriceOracle>,
        metrics: Arc<dyn MetricsBackend>,
    ) -> anyhow::Result<Self> {
        cfg.validate()?;
        Ok(NodeManager {
            cfg,
            client,
            oracle,
            metrics,
            important_nodes: Mutex::new(HashMap::new()),
        })
    }

    pub fn add_important_node(&self, node_id: NodeId, name: String) {
        info!("Add important node({name}), pub key({node_id})");
        self.important_nodes.lock().unwrap().insert(node_id, name);
    }

    pub fn is_important(&self, node_id: &NodeId) -> bool {
        self.important_nodes.lock().unwrap().contains_key(node_id)
    }

    /// Display name for a counterparty: our own name for ourselves, the
    /// lowercase registered name for important nodes, a pseudonym for
    /// everyone else so real identities stay out of display surfaces.
    pub fn get_alias(&self, node_id: &NodeId) -> String {
        if *node_id == self.cfg.our_node_id {
            return self.cfg.our_name.clone();
        }
        match self.important_nodes.lock().unwrap().get(node_id) {
            Some(name) => name.to_lowercase(),
            None => pseudonym(node_id).to_string(),
        }
    }

    /// Registered name for a counterparty, empty when unknown.
    pub fn get_domain(&self, node_id: &NodeId) -> String {
        if *node_id == self.cfg.our_node_id {
            return self.cfg.our_name.clone();
        }
        self.important_nodes
            .lock()
            .unwrap()
            .get(node_id)
            .map(|name| name.to_lowercase())
            .unwrap_or_default()
    }

    // Internal-log name: registered name or the raw id.
    fn log_name(&self, node_id: &NodeId) -> String {
        self.important_nodes
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| node_id.to_string())
    }

    /// Statistics node manager uses to make funds management decisions.
    pub async fn node_stats(&self, period: Period) -> anyhow::Result<HashMap<NodeId, NodeStats>> {
        let metric = Metric::new(&*self.metrics, &self.cfg.asset, "node_stats");

        let result = async {
            let payments = self
                .client
                .list_payments(&PaymentFilter::default())
                .await
                .context("unable to fetch payments")?;
            let forwards = self
                .client
                .list_forward_payments()
                .await
                .context("unable to fetch forward payments")?;
            let channels = self
                .client
                .channels()
                .await
                .context("unable to fetch channels")?;

            node_stats(period, &payments, &forwards, &channels)
                .context("unable to calculate node statistics")
        }
        .await;

        if result.is_err() {
            metric.add_error(Severity::High);
        }
        result
    }

    /// One pass of the availability check: connect to every important node,
    /// then open additional capacity where the weekly payment flow exceeds
    /// the funds locked locally.
    pub async fn check_nodes_availability(&self) -> anyhow::Result<()> {
        let metric = Metric::new(&*self.metrics, &self.cfg.asset, "check_nodes_availability");

        let important: Vec<(NodeId, String)> = self
            .important_nodes
            .lock()
            .unwrap()
            .iter()
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect();

        // Connect to all important nodes to ensure the channels are active.
        for (node_id, name) in &important {
            match self.client.connect_to_node(node_id).await {
                Ok(()) => debug!("Node({name}), id({node_id}) is connected"),
                Err(err) => {
                    metric.add_error(Severity::High);
                    warn!("unable to connect to important node({name}), id({node_id}): {err}");
                }
            }
        }

        // Weekly stats give the average daily payment flow.
        let mut stats = match self.node_stats(Period::Week).await {
            Ok(stats) => stats,
            Err(err) => {
                metric.add_error(Severity::High);
                return Err(err);
            }
        };

        // An important node without any trace of previous interaction still
        // has to be ranked, so backfill zeroes for it.
        for (node_id, name) in &important {
            stats.entry(node_id.clone()).or_insert_with(|| {
                warn!(
                    "Important node({name}), ({node_id}) doesn't have any trace of \
                     previous interaction with our node"
                );
                NodeStats::empty(node_id.clone())
            });
        }

        let important: HashMap<NodeId, String> = important.into_iter().collect();

        for ranked in rank_by_needed_additional_capacity(&stats) {
            let node_id = &ranked.stats.node_id;
            let Some(name) = important.get(node_id) else {
                continue;
            };

            // We cannot create a channel with ourselves.
            if *node_id == self.cfg.our_node_id {
                continue;
            }

            let additional_capacity = ranked.rank as Amount;
            if additional_capacity == 0 {
                debug!("Important node({name}) does not require additional capacity");
                continue;
            }

            let bitcoin_price_usd = match self.oracle.bitcoin_price_usd().await {
                Ok(price) => price,
                Err(err) => {
                    metric.add_error(Severity::High);
                    return Err(anyhow!("unable to get bitcoin price: {err}"));
                }
            };

            let min_channel_size_sat = usd_to_sat(self.cfg.min_channel_size_usd, bitcoin_price_usd);
            let max_channel_size_sat = usd_to_sat(self.cfg.max_channel_size_usd, bitcoin_price_usd);
            let average_sent_usd = sat_to_usd(ranked.stats.payments.average_sent, bitcoin_price_usd);

            let channel_size_sat = if additional_capacity < min_channel_size_sat {
                info!(
                    "Node({name}), average sent({average_sent_usd} USD), create channel \
                     with minimal size({min_channel_size_sat})"
                );
                min_channel_size_sat
            } else if additional_capacity > max_channel_size_sat {
                // The sizing algorithm asked for more than we allow per
                // channel, worth surfacing while it is still in beta.
                metric.add_error(Severity::High);
                info!(
                    "Node({name}), average sent({average_sent_usd} USD), create channel \
                     with maximum size({max_channel_size_sat})"
                );
                max_channel_size_sat
            } else {
                info!(
                    "Node({name}), average sent({average_sent_usd} USD), create channel \
                     with size({additional_capacity})"
                );
                additional_capacity
            };

            if let Err(err) = self.client.open_channel(node_id, channel_size_sat).await {
                metric.add_error(Severity::High);

                if err != ClientError::Deadline {
                    if let Err(suggest_err) = self.suggest_idle_nodes(channel_size_sat).await {
                        warn!("unable to give suggestion which nodes are idle: {suggest_err}");
                    }
                }

                return Err(anyhow!(
                    "unable to open channel with node({name}) id({node_id}), \
                     amount({channel_size_sat}): {err}"
                ));
            }
        }

        Ok(())
    }

    /// Suggest counterparties whose locked funds could be released to cover
    /// `amount`. Walks the month-window idleness ranking, skipping important
    /// nodes, until the deficit is covered. Guidance only, nothing is closed.
    pub async fn suggest_idle_nodes(&self, amount: Amount) -> anyhow::Result<()> {
        let metric = Metric::new(&*self.metrics, &self.cfg.asset, "suggest_idle_nodes");

        let stats = match self.node_stats(Period::Month).await {
            Ok(stats) => stats,
            Err(err) => {
                metric.add_error(Severity::High);
                return Err(err);
            }
        };

        let mut remaining = amount;
        for ranked in rank_by_idle_funds(&stats) {
            if self.is_important(&ranked.stats.node_id) {
                continue;
            }

            let payments = &ranked.stats.payments;
            let sent_flow = payments.average_sent_forward + payments.average_sent
                - payments.average_received_forward;

            let funds_to_release =
                (ranked.stats.channels.locked_locally_overall - sent_flow).max(0);

            debug!(
                "Suggest to remove funds({funds_to_release}) from node({})",
                ranked.stats.node_id
            );

            remaining -= funds_to_release;
            if remaining < 0 {
                break;
            }
        }

        Ok(())
    }

    /// Report the trailing 24 hours of fee spending and the current lock-up
    /// against the configured USD ceilings. Breaches warn and raise a
    /// high-severity metric; they never trigger corrective action.
    pub async fn report_daily_stats(&self) -> anyhow::Result<()> {
        let metric = Metric::new(&*self.metrics, &self.cfg.asset, "report_daily_stats");

        let end = chrono::Utc::now().timestamp();
        let start = end - 86_400;

        let channels = match self.client.channels().await {
            Ok(channels) => channels,
            Err(err) => {
                metric.add_error(Severity::High);
                return Err(anyhow!("unable to fetch channels: {err}"));
            }
        };

        let spending = match channel_fee_report(start, end, &channels) {
            Ok(report) => report,
            Err(err) => {
                metric.add_error(Severity::High);
                return Err(anyhow!("unable to calculate channels stats: {err}"));
            }
        };

        let overall = match channel_overall_stats(&channels) {
            Ok(stats) => stats,
            Err(err) => {
                metric.add_error(Severity::High);
                return Err(anyhow!("unable to calculate channels overall stats: {err}"));
            }
        };

        let bitcoin_price_usd = match self.oracle.bitcoin_price_usd().await {
            Ok(price) => price,
            Err(err) => {
                metric.add_error(Severity::High);
                return Err(anyhow!("unable to get bitcoin price: {err}"));
            }
        };

        let close_fee_usd = sat_to_usd(spending.close_channel_fee, bitcoin_price_usd);
        let swipe_fee_usd = sat_to_usd(spending.htlc_swipe_fee, bitcoin_price_usd);
        let open_fee_usd = sat_to_usd(spending.open_channel_fee, bitcoin_price_usd);
        let commit_fee_usd = sat_to_usd(overall.current_commit_fee, bitcoin_price_usd);
        let limbo_usd = sat_to_usd(overall.current_limbo_balance, bitcoin_price_usd);
        let stuck_usd = sat_to_usd(overall.current_stuck_balance, bitcoin_price_usd);

        if close_fee_usd + swipe_fee_usd > self.cfg.max_close_spending_per_day_usd {
            warn!(
                "Too much funds were spent on channel close, max($ {}), current($ {})",
                self.cfg.max_close_spending_per_day_usd,
                close_fee_usd + swipe_fee_usd
            );
            for channel in &spending.close_channels {
                warn!(
                    "  Closed / closing channel node({}), channelID({})",
                    self.log_name(&channel.node_id),
                    channel.channel_id
                );
            }
            metric.add_error(Severity::High);
        } else {
            trace!(
                "Close fee today, max($ {}), current($ {})",
                self.cfg.max_close_spending_per_day_usd,
                close_fee_usd + swipe_fee_usd
            );
        }

        if open_fee_usd > self.cfg.max_open_spending_per_day_usd {
            warn!(
                "Too much funds were spent on channel open, max($ {}), current($ {})",
                self.cfg.max_open_spending_per_day_usd, open_fee_usd
            );
            for channel in &spending.open_channels {
                warn!(
                    "  Opened / opening channel, node({}), channelID({})",
                    self.log_name(&channel.node_id),
                    channel.channel_id
                );
            }
            metric.add_error(Severity::High);
        } else {
            trace!(
                "Open fee, max($ {}), current($ {})",
                self.cfg.max_open_spending_per_day_usd,
                open_fee_usd
            );
        }

        if commit_fee_usd > self.cfg.max_commit_fee_usd {
            warn!(
                "Too high commit fee, max($ {}), current($ {})",
                self.cfg.max_commit_fee_usd, commit_fee_usd
            );
            metric.add_error(Severity::High);
        } else {
            trace!(
                "Commit fee, max($ {}), current($ {})",
                self.cfg.max_commit_fee_usd,
                commit_fee_usd
            );
        }

        if limbo_usd > self.cfg.max_limbo_usd {
            warn!(
                "Too high limbo balance, max($ {}), current($ {})",
                self.cfg.max_limbo_usd, limbo_usd
            );
            metric.add_error(Severity::High);
        } else {
            trace!(
                "Limbo balance, max($ {}), current($ {})",
                self.cfg.max_limbo_usd,
                limbo_usd
            );
        }

        if stuck_usd > self.cfg.max_stuck_balance_usd {
            warn!(
                "Too high stuck balance in pending htlc, max($ {}), current($ {})",
                self.cfg.max_stuck_balance_usd, stuck_usd
            );
            metric.add_error(Severity::High);
        } else {
            trace!(
                "Stuck balance in pending htlc, max($ {}), current($ {})",
                self.cfg.max_stuck_balance_usd,
                stuck_usd
            );
        }

        Ok(())
    }

    /// Bring the overall funds locked locally with `node_id` up to
    /// `target_local_balance` by opening a channel for the deficit. Does
    /// nothing when the target is already met.
    pub async fn update_link(
        &self,
        node_id: &NodeId,
        target_local_balance: Amount,
    ) -> anyhow::Result<()> {
        let channels = self
            .client
            .channels()
            .await
            .map_err(|err| anyhow!("unable to fetch channels: {err}"))?;

        let stats = crate::stats::channel_node_stats(&channels)?;
        let current = stats
            .get(node_id)
            .map(|s| s.locked_locally_overall)
            .unwrap_or(0);

        if current >= target_local_balance {
            info!(
                "Link to node({node_id}) already holds {current} locally, \
                 target({target_local_balance})"
            );
            return Ok(());
        }

        let deficit = target_local_balance - current;
        info!("Open channel of size({deficit}) to node({node_id}) to reach target");
        self.client
            .open_channel(node_id, deficit)
            .await
            .map_err(|err| anyhow!("unable to open channel with node({node_id}): {err}"))?;
        Ok(())
    }

    /// Drive both periodic checks until shutdown flips to true. A failing
    /// pass is logged and the loop carries on with the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!("Started checking connection with important nodes");

        let mut check = interval_at(
            Instant::now() + self.cfg.check_interval,
            self.cfg.check_interval,
        );
        let mut report = interval_at(
            Instant::now() + self.cfg.report_interval,
            self.cfg.report_interval,
        );

        loop {
            tokio::select! {
                _ = check.tick() => {
                    if let Err(err) = self.check_nodes_availability().await {
                        error!("unable to check nodes availability: {err:#}");
                    }
                }
                _ = report.tick() => {
                    if let Err(err) = self.report_daily_stats().await {
                        error!("unable to report daily stats: {err:#}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Stopped checking connection with important nodes");
        Ok(())
    }
}

/// Stable pseudonym for a node id.
fn pseudonym(node_id: &NodeId) -> &'static str {
    let mut hasher = DefaultHasher::new();
    node_id.hash(&mut hasher);
    PSEUDONYMS[(hasher.finish() % PSEUDONYMS.len() as u64) as usize]
}

fn usd_to_sat(usd: f64, bitcoin_price_usd: f64) -> Amount {
    (usd / bitcoin_price_usd * SATOSHIS_PER_BITCOIN as f64) as Amount
}

fn sat_to_usd(amount: Amount, bitcoin_price_usd: f64) -> f64 {
    amount as f64 / SATOSHIS_PER_BITCOIN as f64 * bitcoin_price_usd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, ClosingState, Initiator, OpenedState, OpeningState};
    use crate::client::mock::MockClient;
    use crate::metrics::recording::RecordingMetrics;
    use crate::payment::{Payment, PaymentDirection, PaymentStatus, PaymentSystem};
    use crate::price::fixed::{FailingOracle, FixedPriceOracle};

    // With the price pinned at 100_000 USD per bitcoin one dollar is 1000
    // satoshis, keeping expected sizes easy to read.
    const PRICE: f64 = 100_000.0;

    struct Fixture {
        manager: NodeManager<Arc<MockClient>>,
        client: Arc<MockClient>,
        metrics: Arc<RecordingMetrics>,
    }

    fn fixture() -> Fixture {
        fixture_with(ManagerConfig::test_default(), FixedPriceOracle(PRICE))
    }

    fn fixture_with<O: PriceOracle + 'static>(cfg: ManagerConfig, oracle: O) -> Fixture {
        let client = Arc::new(MockClient::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let manager = NodeManager::new(
            cfg,
            Arc::clone(&client),
            Arc::new(oracle),
            Arc::clone(&metrics) as Arc<dyn MetricsBackend>,
        )
        .unwrap();
        Fixture {
            manager,
            client,
            metrics,
        }
    }

    fn sent_payment(receiver: &str, amount: Amount) -> Payment {
        Payment {
            payment_id: "pay".to_string(),
            receiver: receiver.into(),
            updated_at: 0,
            status: PaymentStatus::Completed,
            direction: PaymentDirection::Outgoing,
            system: PaymentSystem::External,
            amount,
            media_fee: 0,
        }
    }

    fn opened_channel(id: &str, node: &str, local: Amount) -> Channel {
        let mut channel = Channel::new_opening(
            id.into(),
            node.into(),
            OpeningState {
                creation_time: 0,
                commit_fee: 0,
                open_fee: 0,
                local_balance: local,
                remote_balance: 0,
                initiator: Initiator::Local,
            },
        );
        channel.mark_opened(OpenedState {
            creation_time: 1,
            commit_fee: 0,
            local_balance: local,
            remote_balance: 0,
            is_active: true,
            stuck_balance: 0,
        });
        channel
    }

    #[tokio::test]
    async fn test_backfilled_node_without_history_needs_nothing() {
        let f = fixture();
        f.manager
            .add_important_node("fresh".into(), "Fresh".to_string());

        f.manager.check_nodes_availability().await.unwrap();

        // No history at all: backfilled zero stats rank it at zero needed
        // capacity, so no channel should be opened.
        assert!(f.client.opened().is_empty());
        assert_eq!(f.client.connect_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deficit_below_minimum_bumps_to_min_size() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());

        // Sending 7000 sat per week is 1000 sat per day; locked 0, so the
        // needed capacity (1000) is below the 50 USD / 50_000 sat minimum.
        f.client.set_payments(vec![sent_payment("alpha", 7_000)]);

        f.manager.check_nodes_availability().await.unwrap();

        assert_eq!(f.client.opened(), vec![("alpha".into(), 50_000)]);
        assert!(f.metrics.errors_for("check_nodes_availability").is_empty());
    }

    #[tokio::test]
    async fn test_deficit_above_maximum_clamps_and_alerts() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());

        // 7_000_000 sat per day needed, way above the 400 USD / 400_000 sat
        // ceiling.
        f.client
            .set_payments(vec![sent_payment("alpha", 49_000_000)]);

        f.manager.check_nodes_availability().await.unwrap();

        assert_eq!(f.client.opened(), vec![("alpha".into(), 400_000)]);
        assert_eq!(
            f.metrics.errors_for("check_nodes_availability"),
            vec![Severity::High]
        );
    }

    #[tokio::test]
    async fn test_deficit_within_bounds_opens_exact_amount() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());

        // 100_000 sat per day, 30_000 locked: deficit 70_000 sits between
        // the 50_000 minimum and 400_000 maximum.
        f.client.set_payments(vec![sent_payment("alpha", 700_000)]);
        f.client
            .set_channels(vec![opened_channel("chan1", "alpha", 30_000)]);

        f.manager.check_nodes_availability().await.unwrap();

        assert_eq!(f.client.opened(), vec![("alpha".into(), 70_000)]);
    }

    #[tokio::test]
    async fn test_satisfied_node_opens_nothing() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());

        f.client.set_payments(vec![sent_payment("alpha", 7_000)]);
        f.client
            .set_channels(vec![opened_channel("chan1", "alpha", 500_000)]);

        f.manager.check_nodes_availability().await.unwrap();
        assert!(f.client.opened().is_empty());
    }

    #[tokio::test]
    async fn test_unimportant_nodes_are_not_funded() {
        let f = fixture();
        f.client
            .set_payments(vec![sent_payment("stranger", 70_000_000)]);

        f.manager.check_nodes_availability().await.unwrap();
        assert!(f.client.opened().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_aborts_pass_and_suggests() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());
        f.client.set_payments(vec![sent_payment("alpha", 700_000)]);
        *f.client.fail_open.lock().unwrap() =
            Some(ClientError::Rpc("not enough funds".to_string()));

        let err = f.manager.check_nodes_availability().await.unwrap_err();
        assert!(err.to_string().contains("unable to open channel"));

        // The idle-fund suggestion ran: its operation was measured.
        assert!(f
            .metrics
            .measured_operations()
            .contains(&"suggest_idle_nodes".to_string()));
    }

    #[tokio::test]
    async fn test_open_deadline_failure_skips_suggestion() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());
        f.client.set_payments(vec![sent_payment("alpha", 700_000)]);
        *f.client.fail_open.lock().unwrap() = Some(ClientError::Deadline);

        let err = f.manager.check_nodes_availability().await.unwrap_err();
        assert!(err.to_string().contains("unable to open channel"));
        assert!(!f
            .metrics
            .measured_operations()
            .contains(&"suggest_idle_nodes".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_important_node_is_flagged_but_pass_continues() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());
        f.client.unreachable.lock().unwrap().insert("alpha".into());
        f.client.set_payments(vec![sent_payment("alpha", 700_000)]);

        f.manager.check_nodes_availability().await.unwrap();

        assert_eq!(
            f.metrics.errors_for("check_nodes_availability"),
            vec![Severity::High]
        );
        // Funding still happened despite the failed connect.
        assert_eq!(f.client.opened(), vec![("alpha".into(), 70_000)]);
    }

    #[tokio::test]
    async fn test_price_failure_aborts_pass() {
        let f = fixture_with(ManagerConfig::test_default(), FailingOracle);
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());
        f.client.set_payments(vec![sent_payment("alpha", 700_000)]);

        let err = f.manager.check_nodes_availability().await.unwrap_err();
        assert!(err.to_string().contains("bitcoin price"));
        assert!(f.client.opened().is_empty());
    }

    #[tokio::test]
    async fn test_daily_report_flags_breaches() {
        let f = fixture();

        // Close fee of 5000 sat = 5 USD, above the 1 USD/day ceiling.
        let now = chrono::Utc::now().timestamp();
        let mut channel = opened_channel("chan1", "alpha", 10_000);
        channel.mark_closing(ClosingState {
            creation_time: now - 100,
            close_fee: 5_000,
            swipe_fee: 0,
            local_balance: 10_000,
            remote_balance: 0,
            locked_balance: 10_000,
        });
        f.client.set_channels(vec![channel]);

        f.manager.report_daily_stats().await.unwrap();
        assert_eq!(
            f.metrics.errors_for("report_daily_stats"),
            vec![Severity::High]
        );
    }

    #[tokio::test]
    async fn test_daily_report_quiet_when_in_bounds() {
        let f = fixture();
        f.client
            .set_channels(vec![opened_channel("chan1", "alpha", 10_000)]);

        f.manager.report_daily_stats().await.unwrap();
        assert!(f.metrics.errors_for("report_daily_stats").is_empty());
    }

    #[tokio::test]
    async fn test_update_link_opens_deficit_only() {
        let f = fixture();
        f.client
            .set_channels(vec![opened_channel("chan1", "alpha", 30_000)]);

        f.manager.update_link(&"alpha".into(), 100_000).await.unwrap();
        assert_eq!(f.client.opened(), vec![("alpha".into(), 70_000)]);

        f.client.open_calls.lock().unwrap().clear();
        f.manager.update_link(&"alpha".into(), 20_000).await.unwrap();
        assert!(f.client.opened().is_empty());
    }

    #[test]
    fn test_alias_redaction() {
        let f = fixture();
        f.manager
            .add_important_node("alpha".into(), "Alpha".to_string());

        assert_eq!(f.manager.get_alias(&"our_node".into()), "Hub");
        assert_eq!(f.manager.get_alias(&"alpha".into()), "alpha");

        let unknown: NodeId = "02deadbeef".into();
        let first = f.manager.get_alias(&unknown);
        let second = f.manager.get_alias(&unknown);
        assert_eq!(first, second);
        assert!(PSEUDONYMS.contains(&first.as_str()));

        assert_eq!(f.manager.get_domain(&"alpha".into()), "alpha");
        assert_eq!(f.manager.get_domain(&unknown), "");
    }

    #[test]
    fn test_config_validation() {
        assert!(ManagerConfig::test_default().validate().is_ok());

        let mut cfg = ManagerConfig::test_default();
        cfg.min_channel_size_usd = 500.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ManagerConfig::test_default();
        cfg.asset = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = ManagerConfig::test_default();
        cfg.max_limbo_usd = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_shutdown() {
        let f = fixture();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = f.manager;
        let handle = tokio::spawn(async move { manager.run(shutdown_rx).await });

        // Let at least one check tick fire.
        tokio::time::sleep(Duration::from_secs(30)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
