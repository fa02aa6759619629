// Numan Thabit 2025
use anyhow::{Context, Result};
use prometheus::{
    opts, proto::MetricFamily, Gauge, Histogram, HistogramOpts, IntCounterVec, IntGauge,
    Registry,
};

/// Exporter self metrics plus the gauges maintained by the slot watcher.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    scrape_duration: Histogram,
    collection_errors: IntCounterVec,
    transactions_total: Gauge,
    slot_height: IntGauge,
    epoch_number: IntGauge,
    epoch_first_slot: IntGauge,
    epoch_last_slot: IntGauge,
    leader_slots: IntCounterVec,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "solana_exporter_scrape_duration_seconds",
                "Time spent running one collection cycle against the node",
            )
            .buckets(vec![
                0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0,
            ]),
        )
        .context("failed to build scrape duration histogram")?;

        let collection_errors = IntCounterVec::new(
            opts!(
                "solana_exporter_collection_errors_total",
                "Metric families that could not be evaluated, by family"
            ),
            &["metric"],
        )
        .context("failed to build collection error counter")?;

        let transactions_total = Gauge::with_opts(opts!(
            "solana_confirmed_transactions_total",
            "Total number of transactions processed since genesis (max confirmation)"
        ))
        .context("failed to build transactions gauge")?;

        let slot_height = IntGauge::with_opts(opts!(
            "solana_confirmed_slot_height",
            "Last confirmed slot height processed by watcher routine (max confirmation)"
        ))
        .context("failed to build slot height gauge")?;

        let epoch_number = IntGauge::with_opts(opts!(
            "solana_confirmed_epoch_number",
            "Current epoch (max confirmation)"
        ))
        .context("failed to build epoch number gauge")?;

        let epoch_first_slot = IntGauge::with_opts(opts!(
            "solana_confirmed_epoch_first_slot",
            "Current epoch's first slot (max confirmation)"
        ))
        .context("failed to build epoch first slot gauge")?;

        let epoch_last_slot = IntGauge::with_opts(opts!(
            "solana_confirmed_epoch_last_slot",
            "Current epoch's last slot (max confirmation)"
        ))
        .context("failed to build epoch last slot gauge")?;

        let leader_slots = IntCounterVec::new(
            opts!(
                "solana_leader_slots_total",
                "Number of leader slots per leader, grouped by skip status (max confirmation)"
            ),
            &["status", "nodekey"],
        )
        .context("failed to build leader slots counter")?;

        registry
            .register(Box::new(scrape_duration.clone()))
            .context("register scrape_duration")?;
        registry
            .register(Box::new(collection_errors.clone()))
            .context("register collection_errors")?;
        registry
            .register(Box::new(transactions_total.clone()))
            .context("register transactions_total")?;
        registry
            .register(Box::new(slot_height.clone()))
            .context("register slot_height")?;
        registry
            .register(Box::new(epoch_number.clone()))
            .context("register epoch_number")?;
        registry
            .register(Box::new(epoch_first_slot.clone()))
            .context("register epoch_first_slot")?;
        registry
            .register(Box::new(epoch_last_slot.clone()))
            .context("register epoch_last_slot")?;
        registry
            .register(Box::new(leader_slots.clone()))
            .context("register leader_slots")?;

        Ok(Self {
            registry,
            scrape_duration,
            collection_errors,
            transactions_total,
            slot_height,
            epoch_number,
            epoch_first_slot,
            epoch_last_slot,
            leader_slots,
        })
    }

    pub fn observe_scrape(&self, seconds: f64) {
        self.scrape_duration.observe(seconds);
    }

    pub fn inc_collection_error(&self, metric: &str) {
        self.collection_errors.with_label_values(&[metric]).inc();
    }

    pub fn collection_errors(&self, metric: &str) -> u64 {
        self.collection_errors.with_label_values(&[metric]).get()
    }

    pub fn set_epoch_bounds(&self, epoch: u64, first_slot: u64, last_slot: u64) {
        self.epoch_number.set(to_i64(epoch));
        self.epoch_first_slot.set(to_i64(first_slot));
        self.epoch_last_slot.set(to_i64(last_slot));
    }

    pub fn set_slot_height(&self, slot: u64) {
        self.slot_height.set(to_i64(slot));
    }

    pub fn set_transactions_total(&self, count: u64) {
        self.transactions_total.set(count as f64);
    }

    pub fn inc_leader_slot(&self, leader: &str, produced: bool) {
        let status = if produced { "valid" } else { "skipped" };
        self.leader_slots
            .with_label_values(&[status, leader])
            .inc();
    }

    pub fn leader_slots(&self, leader: &str, status: &str) -> u64 {
        self.leader_slots.with_label_values(&[status, leader]).get()
    }

    pub fn slot_height(&self) -> i64 {
        self.slot_height.get()
    }

    pub fn epoch_bounds(&self) -> (i64, i64, i64) {
        (
            self.epoch_number.get(),
            self.epoch_first_slot.get(),
            self.epoch_last_slot.get(),
        )
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
