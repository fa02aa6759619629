// Numan Thabit 2025
//! One scrape cycle: query the node, derive per-validator values, emit samples.
//!
//! Every upstream call fails independently. A failed call turns into one
//! [`Emission::Invalid`] per affected family and the cycle keeps going, so a
//! partially broken node still yields every metric that could be computed.

use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    descriptors::{Descriptors, Metric},
    rpc::{
        BlockProductionConfig, Commitment, EpochCredits, EpochInfo, RpcError, SolanaRpc,
        VoteAccount, VoteAccounts, VoteAccountsConfig,
    },
};

pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Behaviour switches for the collector, fixed at construction.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub vote_pubkey: Option<String>,
    pub no_voting: bool,
    pub commitment: Commitment,
    pub timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            vote_pubkey: None,
            no_voting: false,
            commitment: Commitment::Processed,
            timeout: DEFAULT_COLLECT_TIMEOUT,
        }
    }
}

/// A single item produced by a collection cycle.
#[derive(Debug, Clone)]
pub enum Emission {
    Sample {
        metric: Metric,
        labels: Vec<String>,
        value: f64,
    },
    /// `labels` names the subject when the failure concerns a single series.
    Invalid {
        metric: Metric,
        labels: Vec<String>,
        error: Arc<RpcError>,
    },
}

impl Emission {
    pub fn metric(&self) -> Metric {
        match self {
            Emission::Sample { metric, .. } | Emission::Invalid { metric, .. } => *metric,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("vote account {0} not found in current or delinquent set")]
    NotFound(String),
    #[error("vote account {0} matched more than one record")]
    Ambiguous(String),
}

/// Credits earned in the current epoch: the last row's delta, not last minus first.
pub fn epoch_credits(history: &[EpochCredits]) -> Option<u64> {
    history
        .last()
        .map(|row| row.credits().saturating_sub(row.previous_credits()))
}

pub fn total_credits(history: &[EpochCredits]) -> Option<u64> {
    history.last().map(EpochCredits::credits)
}

/// `None` when no slot of the epoch has elapsed yet.
pub fn voting_percentage(credits: u64, slot_index: u64) -> Option<f64> {
    if slot_index == 0 {
        return None;
    }
    Some(credits as f64 / slot_index as f64 * 100.0)
}

/// Find the single record carrying `vote_pubkey`, preferring the current set.
pub fn resolve_vote_account<'a>(
    accounts: &'a VoteAccounts,
    vote_pubkey: &str,
) -> Result<&'a VoteAccount, ResolveError> {
    let mut ambiguous = false;
    for group in [&accounts.current, &accounts.delinquent] {
        let mut matches = group.iter().filter(|acc| acc.vote_pubkey == vote_pubkey);
        match (matches.next(), matches.next()) {
            (Some(account), None) => return Ok(account),
            (Some(_), Some(_)) => ambiguous = true,
            _ => {}
        }
    }
    if ambiguous {
        Err(ResolveError::Ambiguous(vote_pubkey.to_string()))
    } else {
        Err(ResolveError::NotFound(vote_pubkey.to_string()))
    }
}

pub struct SolanaCollector<C> {
    client: C,
    config: CollectorConfig,
    descriptors: Descriptors,
}

impl<C: SolanaRpc> SolanaCollector<C> {
    pub fn new(client: C, config: CollectorConfig) -> Self {
        Self {
            client,
            config,
            descriptors: Descriptors::new(),
        }
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one collection cycle under a single shared deadline.
    pub async fn collect(&self) -> Vec<Emission> {
        let deadline = Instant::now() + self.config.timeout;
        let mut out = Emissions::default();
        let commitment = self.config.commitment;

        let (epoch, version, identity, health) = tokio::join!(
            bounded(deadline, "getEpochInfo", self.client.get_epoch_info(commitment)),
            bounded(deadline, "getVersion", self.client.get_version()),
            bounded(deadline, "getIdentity", self.client.get_identity()),
            bounded(deadline, "getHealth", self.client.get_health()),
        );

        let epoch = match epoch {
            Ok(info) => {
                out.sample(
                    Metric::CurrentEpoch,
                    vec![info.epoch.to_string()],
                    info.epoch as f64,
                );
                Some(info)
            }
            Err(err) => {
                info!(error = %err, "failed to fetch epoch info");
                out.invalid(Metric::CurrentEpoch, Arc::new(err));
                None
            }
        };

        match version {
            Ok(version) => out.sample(Metric::NodeVersion, vec![version], 1.0),
            Err(err) => {
                debug!(error = %err, "failed to fetch node version");
                out.invalid(Metric::NodeVersion, Arc::new(err));
            }
        }

        match identity.and_then(|identity| health.map(|healthy| (identity, healthy))) {
            Ok((identity, healthy)) => out.sample(
                Metric::HealthCheck,
                vec![identity],
                if healthy { 1.0 } else { 0.0 },
            ),
            Err(err) => {
                debug!(error = %err, "failed to fetch identity or health");
                out.invalid(Metric::HealthCheck, Arc::new(err));
            }
        }

        if self.config.no_voting {
            debug!("no-voting set; skipping vote account metrics");
            return out.into_inner();
        }

        self.collect_vote_metrics(deadline, epoch.as_ref(), &mut out)
            .await;
        out.into_inner()
    }

    async fn collect_vote_metrics(
        &self,
        deadline: Instant,
        epoch: Option<&EpochInfo>,
        out: &mut Emissions,
    ) {
        let commitment = self.config.commitment;
        let vote_filter = VoteAccountsConfig {
            commitment,
            vote_pubkey: self.config.vote_pubkey.clone(),
        };

        let accounts = match bounded(
            deadline,
            "getVoteAccounts",
            self.client.get_vote_accounts(&vote_filter),
        )
        .await
        {
            Ok(accounts) => accounts,
            Err(err) => {
                debug!(error = %err, "failed to fetch vote accounts");
                let err = Arc::new(err);
                for metric in Metric::VOTE_ACCOUNT_FAMILIES {
                    out.invalid(metric, err.clone());
                }
                return;
            }
        };

        emit_vote_accounts(&accounts, epoch, out);

        let target = self.config.vote_pubkey.as_deref().map(|vote_pubkey| {
            resolve_vote_account(&accounts, vote_pubkey).map_err(|err| {
                error!(vote_pubkey, error = %err, "failed to resolve vote account");
                err
            })
        });

        let production_filter = match &target {
            Some(Ok(account)) => BlockProductionConfig::for_identity(&account.node_pubkey),
            Some(Err(_)) => {
                warn!("block production not narrowed to a single identity");
                BlockProductionConfig::with_commitment(commitment)
            }
            None => BlockProductionConfig::with_commitment(commitment),
        };

        match bounded(
            deadline,
            "getBlockProduction",
            self.client.get_block_production(&production_filter),
        )
        .await
        {
            Ok(production) => {
                for account in accounts.iter() {
                    let Some(entry) = production.by_identity.get(&account.node_pubkey) else {
                        continue;
                    };
                    out.sample(
                        Metric::LeaderSlots,
                        validator_labels(account),
                        entry.leader_slots() as f64,
                    );
                    out.sample(
                        Metric::ProducedSlots,
                        validator_labels(account),
                        entry.produced_slots() as f64,
                    );
                }
            }
            Err(err) => {
                debug!(error = %err, "failed to fetch block production");
                let err = Arc::new(err);
                out.invalid(Metric::LeaderSlots, err.clone());
                out.invalid(Metric::ProducedSlots, err);
            }
        }

        if let Some(Ok(account)) = target {
            let (node_balance, vote_balance) = tokio::join!(
                bounded(
                    deadline,
                    "getBalance",
                    self.client.get_balance(&account.node_pubkey, commitment)
                ),
                bounded(
                    deadline,
                    "getBalance",
                    self.client.get_balance(&account.vote_pubkey, commitment)
                ),
            );
            for (kind, result) in [("validator", node_balance), ("vote", vote_balance)] {
                match result {
                    Ok(lamports) => {
                        out.sample(Metric::Balance, vec![kind.to_string()], lamports as f64)
                    }
                    Err(err) => {
                        debug!(account = kind, error = %err, "failed to fetch balance");
                        out.invalid_for(Metric::Balance, vec![kind.to_string()], Arc::new(err));
                    }
                }
            }
        }
    }
}

fn emit_vote_accounts(accounts: &VoteAccounts, epoch: Option<&EpochInfo>, out: &mut Emissions) {
    for account in accounts.iter() {
        let labels = validator_labels(account);
        out.sample(
            Metric::ActivatedStake,
            labels.clone(),
            account.activated_stake as f64,
        );
        out.sample(Metric::LastVote, labels.clone(), account.last_vote as f64);
        out.sample(Metric::RootSlot, labels.clone(), account.root_slot as f64);

        let (Some(credits), Some(total)) = (
            epoch_credits(&account.epoch_credits),
            total_credits(&account.epoch_credits),
        ) else {
            debug!(
                vote_pubkey = %account.vote_pubkey,
                "vote account reported no epoch credits"
            );
            continue;
        };

        out.sample(Metric::EpochCredits, labels.clone(), credits as f64);
        if let Some(pct) = epoch.and_then(|info| voting_percentage(credits, info.slot_index)) {
            out.sample(Metric::VotingPercentage, labels.clone(), pct);
        }
        out.sample(Metric::TotalCredits, labels, total as f64);
    }

    out.sample(
        Metric::ActiveValidators,
        vec!["current".to_string()],
        accounts.current.len() as f64,
    );
    out.sample(
        Metric::ActiveValidators,
        vec!["delinquent".to_string()],
        accounts.delinquent.len() as f64,
    );

    for account in &accounts.current {
        out.sample(Metric::Delinquent, validator_labels(account), 0.0);
    }
    for account in &accounts.delinquent {
        out.sample(Metric::Delinquent, validator_labels(account), 1.0);
    }
}

fn validator_labels(account: &VoteAccount) -> Vec<String> {
    vec![account.vote_pubkey.clone(), account.node_pubkey.clone()]
}

async fn bounded<T, F>(deadline: Instant, method: &'static str, call: F) -> Result<T, RpcError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    timeout_at(deadline, call)
        .await
        .unwrap_or_else(|_| Err(RpcError::DeadlineExceeded(method)))
}

#[derive(Default)]
struct Emissions(Vec<Emission>);

impl Emissions {
    fn sample(&mut self, metric: Metric, labels: Vec<String>, value: f64) {
        self.0.push(Emission::Sample {
            metric,
            labels,
            value,
        });
    }

    fn invalid(&mut self, metric: Metric, error: Arc<RpcError>) {
        self.invalid_for(metric, Vec::new(), error);
    }

    fn invalid_for(&mut self, metric: Metric, labels: Vec<String>, error: Arc<RpcError>) {
        self.0.push(Emission::Invalid {
            metric,
            labels,
            error,
        });
    }

    fn into_inner(self) -> Vec<Emission> {
        self.0
    }
}
