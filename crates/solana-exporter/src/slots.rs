// Numan Thabit 2025
//! Background slot watcher: confirmed slot/epoch gauges and per-leader skip accounting.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    metrics::ExporterMetrics,
    rpc::{Commitment, EpochInfo, RpcError, SolanaRpc},
};

pub const DEFAULT_SLOT_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SLOTS_PER_TICK: u64 = 500;
const WATCH_COMMITMENT: Commitment = Commitment::Finalized;

pub fn spawn_slot_watcher<C>(
    client: Arc<C>,
    metrics: ExporterMetrics,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    C: SolanaRpc + 'static,
{
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "starting slot watcher");
        let mut watcher = SlotWatcher::new(client, metrics);
        let mut ticker = interval_at(Instant::now(), interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("slot watcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = watcher.tick().await {
                        warn!(error = %err, "slot watcher tick failed");
                    }
                }
            }
        }
    })
}

/// Leader for every slot of one epoch, keyed by absolute slot.
struct EpochLeaders {
    epoch: u64,
    by_slot: HashMap<u64, String>,
}

pub struct SlotWatcher<C> {
    client: Arc<C>,
    metrics: ExporterMetrics,
    watermark: Option<u64>,
    leaders: Option<EpochLeaders>,
}

impl<C: SolanaRpc> SlotWatcher<C> {
    pub fn new(client: Arc<C>, metrics: ExporterMetrics) -> Self {
        Self {
            client,
            metrics,
            watermark: None,
            leaders: None,
        }
    }

    pub fn watermark(&self) -> Option<u64> {
        self.watermark
    }

    pub async fn tick(&mut self) -> Result<(), RpcError> {
        let info = self.client.get_epoch_info(WATCH_COMMITMENT).await?;

        if let Some(count) = info.transaction_count {
            self.metrics.set_transactions_total(count);
        }
        self.metrics.set_slot_height(info.absolute_slot);
        self.metrics
            .set_epoch_bounds(info.epoch, info.first_slot(), info.last_slot());

        let Some(watermark) = self.watermark else {
            debug!(slot = info.absolute_slot, "initialised slot watermark");
            self.watermark = Some(info.absolute_slot);
            return Ok(());
        };

        if info.absolute_slot <= watermark {
            return Ok(());
        }

        let first = (watermark + 1).max(info.first_slot());
        if first > watermark + 1 {
            debug!(
                skipped_from = watermark + 1,
                epoch = info.epoch,
                "epoch boundary crossed; previous epoch tail not accounted"
            );
        }
        let last = info
            .absolute_slot
            .min(first.saturating_add(MAX_SLOTS_PER_TICK - 1));

        self.refresh_leaders(&info).await?;
        let produced = self
            .client
            .get_blocks(first, last, WATCH_COMMITMENT)
            .await?;
        self.account_range(first, last, &produced);
        self.watermark = Some(last);
        Ok(())
    }

    async fn refresh_leaders(&mut self, info: &EpochInfo) -> Result<(), RpcError> {
        if matches!(&self.leaders, Some(leaders) if leaders.epoch == info.epoch) {
            return Ok(());
        }

        let schedule = self
            .client
            .get_leader_schedule(Some(info.absolute_slot), WATCH_COMMITMENT)
            .await?
            .unwrap_or_default();
        let first_slot = info.first_slot();
        let by_slot = schedule
            .into_iter()
            .flat_map(|(leader, indexes)| {
                indexes
                    .into_iter()
                    .map(move |index| (first_slot + index, leader.clone()))
            })
            .collect::<HashMap<_, _>>();

        info!(
            epoch = info.epoch,
            slots = by_slot.len(),
            "loaded leader schedule"
        );
        self.leaders = Some(EpochLeaders {
            epoch: info.epoch,
            by_slot,
        });
        Ok(())
    }

    fn account_range(&self, first: u64, last: u64, produced: &[u64]) {
        let Some(leaders) = &self.leaders else {
            return;
        };
        for slot in first..=last {
            match leaders.by_slot.get(&slot) {
                Some(leader) => self
                    .metrics
                    .inc_leader_slot(leader, produced.binary_search(&slot).is_ok()),
                None => debug!(slot, "no leader scheduled for slot"),
            }
        }
    }
}
