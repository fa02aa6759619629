// Numan Thabit 2025
//! Fixed table of the metric families the collector can emit.

/// Key for every metric family the collector knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    ActiveValidators,
    ActivatedStake,
    LastVote,
    RootSlot,
    Delinquent,
    NodeVersion,
    LeaderSlots,
    ProducedSlots,
    Balance,
    EpochCredits,
    VotingPercentage,
    TotalCredits,
    HealthCheck,
    CurrentEpoch,
}

impl Metric {
    pub const ALL: [Metric; 14] = [
        Metric::ActiveValidators,
        Metric::ActivatedStake,
        Metric::LastVote,
        Metric::RootSlot,
        Metric::Delinquent,
        Metric::NodeVersion,
        Metric::LeaderSlots,
        Metric::ProducedSlots,
        Metric::Balance,
        Metric::EpochCredits,
        Metric::VotingPercentage,
        Metric::TotalCredits,
        Metric::HealthCheck,
        Metric::CurrentEpoch,
    ];

    /// Families invalidated together when the vote account query fails.
    pub const VOTE_ACCOUNT_FAMILIES: [Metric; 8] = [
        Metric::ActiveValidators,
        Metric::ActivatedStake,
        Metric::LastVote,
        Metric::RootSlot,
        Metric::Delinquent,
        Metric::EpochCredits,
        Metric::VotingPercentage,
        Metric::TotalCredits,
    ];

    /// Families self-described regardless of runtime filters.
    pub const DESCRIBED: [Metric; 10] = [
        Metric::ActiveValidators,
        Metric::NodeVersion,
        Metric::LeaderSlots,
        Metric::ProducedSlots,
        Metric::Balance,
        Metric::EpochCredits,
        Metric::VotingPercentage,
        Metric::TotalCredits,
        Metric::HealthCheck,
        Metric::CurrentEpoch,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

const VALIDATOR_LABELS: &[&str] = &["pubkey", "nodekey"];

fn desc_for(metric: Metric) -> MetricDesc {
    let (name, help, labels): (&'static str, &'static str, &'static [&'static str]) = match metric
    {
        Metric::ActiveValidators => (
            "solana_active_validators",
            "Total number of active validators by state",
            &["state"],
        ),
        Metric::ActivatedStake => (
            "solana_validator_activated_stake",
            "Activated stake per validator",
            VALIDATOR_LABELS,
        ),
        Metric::LastVote => (
            "solana_validator_last_vote",
            "Last voted slot per validator",
            VALIDATOR_LABELS,
        ),
        Metric::RootSlot => (
            "solana_validator_root_slot",
            "Root slot per validator",
            VALIDATOR_LABELS,
        ),
        Metric::Delinquent => (
            "solana_validator_delinquent",
            "Whether a validator is delinquent",
            VALIDATOR_LABELS,
        ),
        Metric::NodeVersion => (
            "solana_node_version",
            "Node version of solana",
            &["version"],
        ),
        Metric::LeaderSlots => (
            "leader_slots_in_epoch",
            "The number of leader slots in current epoch",
            VALIDATOR_LABELS,
        ),
        Metric::ProducedSlots => (
            "produced_slots_in_epoch",
            "The number of produced slots in current epoch",
            VALIDATOR_LABELS,
        ),
        Metric::Balance => (
            "solana_validator_balance",
            "The balance of the account of validator identity and vote pubkey",
            &["account"],
        ),
        Metric::EpochCredits => (
            "solana_validator_epoch_credits",
            "How many credits earned by current epoch",
            VALIDATOR_LABELS,
        ),
        Metric::VotingPercentage => (
            "solana_validator_voting_percentage",
            "The percentage of participate voting in current epoch",
            VALIDATOR_LABELS,
        ),
        Metric::TotalCredits => (
            "solana_validator_total_credits",
            "Total credits earned by validator",
            VALIDATOR_LABELS,
        ),
        Metric::HealthCheck => (
            "solana_health_check",
            "Health status of solana node",
            &["nodekey"],
        ),
        Metric::CurrentEpoch => (
            "solana_current_epoch",
            "Current epoch number",
            &["epoch"],
        ),
    };
    MetricDesc { name, help, labels }
}

/// Immutable descriptor registry, built once before any scrape runs.
#[derive(Debug, Clone)]
pub struct Descriptors {
    entries: Vec<MetricDesc>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self {
            entries: Metric::ALL.iter().map(|metric| desc_for(*metric)).collect(),
        }
    }

    pub fn get(&self, metric: Metric) -> &MetricDesc {
        &self.entries[metric.index()]
    }

    pub fn describe(&self) -> impl Iterator<Item = &MetricDesc> + '_ {
        Metric::DESCRIBED.iter().map(move |metric| self.get(*metric))
    }
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn lookup_matches_key() {
        let descriptors = Descriptors::new();
        for metric in Metric::ALL {
            assert_eq!(descriptors.get(metric), &desc_for(metric));
        }
        assert_eq!(descriptors.get(Metric::Balance).labels, &["account"][..]);
    }

    #[test]
    fn names_are_unique() {
        let descriptors = Descriptors::new();
        let names: HashSet<_> = Metric::ALL
            .iter()
            .map(|metric| descriptors.get(*metric).name)
            .collect();
        assert_eq!(names.len(), Metric::ALL.len());
    }

    #[test]
    fn describe_lists_unconditional_families() {
        let descriptors = Descriptors::new();
        let described: Vec<_> = descriptors.describe().map(|desc| desc.name).collect();
        assert_eq!(described.len(), 10);
        assert!(described.contains(&"solana_current_epoch"));
        assert!(!described.contains(&"solana_validator_delinquent"));
    }
}
