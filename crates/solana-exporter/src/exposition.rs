// Numan Thabit 2025
//! Renders a collection cycle into the Prometheus text format.

use std::{collections::BTreeMap, fmt::Write as _};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{
    proto::{Gauge, LabelPair, Metric as ProtoMetric, MetricFamily, MetricType},
    Encoder, TextEncoder,
};
use tracing::warn;

use crate::{
    collector::Emission,
    descriptors::{Descriptors, Metric, MetricDesc},
    metrics::ExporterMetrics,
};

static METRICS_ENCODER: Lazy<TextEncoder> = Lazy::new(TextEncoder::new);

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Group samples into one family per descriptor, in registry order.
pub fn families(descriptors: &Descriptors, emissions: &[Emission]) -> Vec<MetricFamily> {
    let mut grouped: BTreeMap<Metric, Vec<ProtoMetric>> = BTreeMap::new();
    for emission in emissions {
        if let Emission::Sample {
            metric,
            labels,
            value,
        } = emission
        {
            let desc = descriptors.get(*metric);
            grouped
                .entry(*metric)
                .or_default()
                .push(gauge_sample(desc, labels, *value));
        }
    }

    grouped
        .into_iter()
        .map(|(metric, samples)| {
            let desc = descriptors.get(metric);
            let mut family = MetricFamily::default();
            family.set_name(desc.name.to_string());
            family.set_help(desc.help.to_string());
            family.set_field_type(MetricType::GAUGE);
            family.set_metric(samples.into());
            family
        })
        .collect()
}

fn gauge_sample(desc: &MetricDesc, labels: &[String], value: f64) -> ProtoMetric {
    let pairs: Vec<LabelPair> = desc
        .labels
        .iter()
        .zip(labels)
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value.clone());
            pair
        })
        .collect();

    let mut gauge = Gauge::default();
    gauge.set_value(value);

    let mut sample = ProtoMetric::default();
    sample.set_label(pairs.into());
    sample.set_gauge(gauge);
    sample
}

/// Encode a cycle's samples followed by the exporter's own metrics.
///
/// Families that failed this cycle are reported as comment lines so the scrape
/// itself still succeeds.
pub fn render(
    descriptors: &Descriptors,
    emissions: &[Emission],
    metrics: &ExporterMetrics,
) -> Result<String> {
    let mut failures = String::new();
    for emission in emissions {
        if let Emission::Invalid {
            metric,
            labels,
            error,
        } = emission
        {
            let desc = descriptors.get(*metric);
            warn!(
                metric = desc.name,
                labels = ?labels,
                error = %error,
                "metric evaluation failed"
            );
            metrics.inc_collection_error(desc.name);
            // infallible for String
            let _ = writeln!(
                failures,
                "# metric evaluation failed: {}: {}",
                subject(desc, labels),
                single_line(&error.to_string())
            );
        }
    }

    let mut all = families(descriptors, emissions);
    all.extend(metrics.gather());

    let mut buffer = Vec::with_capacity(8192);
    METRICS_ENCODER
        .encode(&all, &mut buffer)
        .context("failed to encode metrics")?;
    let mut body = String::from_utf8(buffer).context("prometheus output is not utf8")?;
    body.push_str(&failures);
    Ok(body)
}

/// `name{label="value",...}` for a tagged failure, the bare name otherwise.
fn subject(desc: &MetricDesc, labels: &[String]) -> String {
    if labels.is_empty() {
        return desc.name.to_string();
    }
    let pairs: Vec<String> = desc
        .labels
        .iter()
        .zip(labels)
        .map(|(name, value)| format!("{name}=\"{}\"", single_line(value).replace('"', "'")))
        .collect();
    format!("{}{{{}}}", desc.name, pairs.join(","))
}

// upstream text must stay inside its comment line
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rpc::RpcError;

    fn sample(metric: Metric, labels: &[&str], value: f64) -> Emission {
        Emission::Sample {
            metric,
            labels: labels.iter().map(|label| label.to_string()).collect(),
            value,
        }
    }

    #[test]
    fn groups_samples_by_family_in_registry_order() {
        let descriptors = Descriptors::new();
        let emissions = vec![
            sample(Metric::CurrentEpoch, &["10"], 10.0),
            sample(Metric::ActivatedStake, &["A", "NA"], 42.0),
            sample(Metric::ActivatedStake, &["B", "NB"], 7.0),
        ];
        let families = families(&descriptors, &emissions);

        assert_eq!(families.len(), 2);
        assert_eq!(families[0].get_name(), "solana_validator_activated_stake");
        assert_eq!(families[0].get_metric().len(), 2);
        let first = &families[0].get_metric()[0];
        assert_eq!(first.get_label()[0].get_name(), "pubkey");
        assert_eq!(first.get_label()[1].get_value(), "NA");
        assert_eq!(first.get_gauge().get_value(), 42.0);
        assert_eq!(families[1].get_name(), "solana_current_epoch");
    }

    #[test]
    fn invalid_families_render_as_comments() {
        let descriptors = Descriptors::new();
        let metrics = ExporterMetrics::new().unwrap();
        let error = Arc::new(RpcError::Rpc {
            code: -32000,
            message: "node down".into(),
        });
        let emissions = vec![
            sample(Metric::NodeVersion, &["1.18.22"], 1.0),
            Emission::Invalid {
                metric: Metric::CurrentEpoch,
                labels: vec![],
                error,
            },
        ];

        let body = render(&descriptors, &emissions, &metrics).unwrap();
        assert!(body.contains("solana_node_version{version=\"1.18.22\"} 1"));
        assert!(body.contains(
            "# metric evaluation failed: solana_current_epoch: rpc error -32000: node down"
        ));
        assert!(!body.contains("solana_current_epoch{"));
        assert_eq!(metrics.collection_errors("solana_current_epoch"), 1);
    }

    #[test]
    fn failed_balances_name_their_account() {
        let descriptors = Descriptors::new();
        let metrics = ExporterMetrics::new().unwrap();
        let error = Arc::new(RpcError::Rpc {
            code: -32000,
            message: "unavailable".into(),
        });
        let emissions: Vec<Emission> = ["validator", "vote"]
            .into_iter()
            .map(|account| Emission::Invalid {
                metric: Metric::Balance,
                labels: vec![account.to_string()],
                error: error.clone(),
            })
            .collect();

        let body = render(&descriptors, &emissions, &metrics).unwrap();
        assert!(body.contains(
            "# metric evaluation failed: solana_validator_balance{account=\"validator\"}: \
             rpc error -32000: unavailable"
        ));
        assert!(body.contains(
            "# metric evaluation failed: solana_validator_balance{account=\"vote\"}: \
             rpc error -32000: unavailable"
        ));
        assert_eq!(metrics.collection_errors("solana_validator_balance"), 2);
    }

    #[test]
    fn multiline_upstream_errors_stay_commented() {
        let descriptors = Descriptors::new();
        let metrics = ExporterMetrics::new().unwrap();
        let emissions = vec![Emission::Invalid {
            metric: Metric::NodeVersion,
            labels: vec![],
            error: Arc::new(RpcError::Rpc {
                code: -32000,
                message: "bad\nsolana_node_version 1\r\nmore".into(),
            }),
        }];

        let body = render(&descriptors, &emissions, &metrics).unwrap();
        assert!(body
            .lines()
            .all(|line| !line.starts_with("solana_node_version")));
        assert!(body.contains(
            "# metric evaluation failed: solana_node_version: \
             rpc error -32000: bad solana_node_version 1  more"
        ));
    }

    #[test]
    fn empty_cycle_still_renders_self_metrics() {
        let descriptors = Descriptors::new();
        let metrics = ExporterMetrics::new().unwrap();
        metrics.observe_scrape(0.2);
        let body = render(&descriptors, &[], &metrics).unwrap();
        assert!(body.contains("solana_exporter_scrape_duration_seconds_count 1"));
    }
}
