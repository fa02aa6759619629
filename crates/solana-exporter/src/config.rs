// Numan Thabit 2025
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::Url;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds, DurationSeconds};
use tracing::info;

use crate::{
    collector::{CollectorConfig, DEFAULT_COLLECT_TIMEOUT},
    rpc::Commitment,
    slots::DEFAULT_SLOT_INTERVAL,
};

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Parser, Debug, Clone, Default)]
#[command(
    author,
    version,
    about = "Prometheus exporter for Solana validator and node metrics",
    rename_all = "kebab-case"
)]
pub struct CliArgs {
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "PATH", env = "SOLANA_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Solana RPC URI (including protocol and path).
    #[arg(long, env = "SOLANA_RPC_URI")]
    pub rpc_uri: Option<Url>,

    /// Listen address for the metrics endpoint.
    #[arg(long)]
    pub addr: Option<SocketAddr>,

    /// Validator vote address; only this account is reported when set.
    #[arg(long = "votepubkey")]
    pub vote_pubkey: Option<String>,

    /// The node is an RPC node without voting.
    #[arg(long, default_value_t = false)]
    pub no_voting: bool,

    /// Commitment level for scrape-time queries.
    #[arg(long)]
    pub commitment: Option<Commitment>,
}

#[serde_as]
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    rpc_uri: Option<Url>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    listen: Option<SocketAddr>,
    #[serde(default)]
    vote_pubkey: Option<String>,
    #[serde(default)]
    no_voting: Option<bool>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    commitment: Option<Commitment>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    collect_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    slot_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub rpc_uri: Url,
    pub listen: SocketAddr,
    pub vote_pubkey: Option<String>,
    pub no_voting: bool,
    pub commitment: Commitment,
    pub collect_timeout: Duration,
    pub slot_interval: Duration,
    pub config_path: Option<PathBuf>,
}

impl ExporterConfig {
    pub fn from_cli(cli: &CliArgs) -> Result<Self> {
        let file_cfg = match cli.config.as_deref() {
            Some(path) => Some((path.to_path_buf(), read_config(path)?)),
            None => None,
        };
        let config = merge(cli, file_cfg)?;
        config.validate()?;
        config.log_summary();
        Ok(config)
    }

    pub fn collector(&self) -> CollectorConfig {
        CollectorConfig {
            vote_pubkey: self.vote_pubkey.clone(),
            no_voting: self.no_voting,
            commitment: self.commitment,
            timeout: self.collect_timeout,
        }
    }

    /// The slot watcher only runs when every validator is being reported.
    pub fn watch_slots(&self) -> bool {
        self.vote_pubkey.is_none()
    }

    fn validate(&self) -> Result<()> {
        match self.rpc_uri.scheme() {
            "http" | "https" => {}
            other => bail!("rpc uri must use http or https, got `{other}`"),
        }
        if self.collect_timeout.is_zero() {
            bail!("collect_timeout must be greater than 0");
        }
        if self.slot_interval.is_zero() {
            bail!("slot_interval must be greater than 0");
        }
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            rpc_uri = %self.rpc_uri,
            listen = %self.listen,
            vote_pubkey = ?self.vote_pubkey,
            no_voting = self.no_voting,
            commitment = %self.commitment,
            collect_timeout_ms = self.collect_timeout.as_millis() as u64,
            slot_interval_ms = self.slot_interval.as_millis() as u64,
            config_path = ?self.config_path,
            "solana-exporter configuration"
        );
    }
}

fn merge(cli: &CliArgs, file_cfg: Option<(PathBuf, FileConfig)>) -> Result<ExporterConfig> {
    let (config_path, file_cfg) = file_cfg.unzip();
    let file_cfg = file_cfg.unwrap_or_default();

    let Some(rpc_uri) = cli.rpc_uri.clone().or(file_cfg.rpc_uri) else {
        bail!("an rpc uri is required; pass --rpc-uri or set rpc_uri in the config file");
    };
    let listen = match cli.addr.or(file_cfg.listen) {
        Some(addr) => addr,
        None => DEFAULT_LISTEN
            .parse::<SocketAddr>()
            .context("invalid default listen address")?,
    };
    let vote_pubkey = cli
        .vote_pubkey
        .clone()
        .or(file_cfg.vote_pubkey)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());
    let no_voting = cli.no_voting || file_cfg.no_voting.unwrap_or(false);
    let commitment = pick(cli.commitment, file_cfg.commitment, Commitment::Processed);
    let collect_timeout = file_cfg.collect_timeout.unwrap_or(DEFAULT_COLLECT_TIMEOUT);
    let slot_interval = file_cfg.slot_interval.unwrap_or(DEFAULT_SLOT_INTERVAL);

    Ok(ExporterConfig {
        rpc_uri,
        listen,
        vote_pubkey,
        no_voting,
        commitment,
        collect_timeout,
        slot_interval,
        config_path,
    })
}

fn pick<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}

fn read_config(path: &Path) -> Result<FileConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&data).with_context(|| format!("failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("solana-exporter").chain(args.iter().copied()))
    }

    #[test]
    fn missing_rpc_uri_is_fatal() {
        let err = merge(&CliArgs::default(), None).unwrap_err();
        assert!(err.to_string().contains("rpc uri is required"));
    }

    #[test]
    fn cli_flags_and_defaults() {
        let args = cli(&[
            "--rpc-uri",
            "http://127.0.0.1:8899",
            "--votepubkey",
            "V1",
            "--no-voting",
        ]);
        let config = merge(&args, None).unwrap();
        assert_eq!(config.rpc_uri.as_str(), "http://127.0.0.1:8899/");
        assert_eq!(config.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.vote_pubkey.as_deref(), Some("V1"));
        assert!(config.no_voting);
        assert!(!config.watch_slots());
        assert_eq!(config.commitment, Commitment::Processed);
        assert_eq!(config.collect_timeout, DEFAULT_COLLECT_TIMEOUT);
    }

    #[test]
    fn cli_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            rpc_uri = "http://file:8899"
            listen = "127.0.0.1:9100"
            vote_pubkey = "FILEKEY"
            commitment = "finalized"
            collect_timeout = 3
            slot_interval = 250
            "#,
        )
        .unwrap();
        let args = cli(&["--rpc-uri", "https://cli:8899", "--commitment", "confirmed"]);
        let config = merge(&args, Some((PathBuf::from("exporter.toml"), file))).unwrap();

        assert_eq!(config.rpc_uri.host_str(), Some("cli"));
        assert_eq!(config.listen, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.vote_pubkey.as_deref(), Some("FILEKEY"));
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.collect_timeout, Duration::from_secs(3));
        assert_eq!(config.slot_interval, Duration::from_millis(250));
        assert_eq!(config.config_path, Some(PathBuf::from("exporter.toml")));
    }

    #[test]
    fn blank_vote_pubkey_means_unset() {
        let args = cli(&["--rpc-uri", "http://127.0.0.1:8899", "--votepubkey", ""]);
        let config = merge(&args, None).unwrap();
        assert_eq!(config.vote_pubkey, None);
        assert!(config.watch_slots());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let args = cli(&["--rpc-uri", "ws://127.0.0.1:8900"]);
        let config = merge(&args, None).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn collector_config_carries_filters() {
        let args = cli(&["--rpc-uri", "http://127.0.0.1:8899", "--votepubkey", "V1"]);
        let collector = merge(&args, None).unwrap().collector();
        assert_eq!(collector.vote_pubkey.as_deref(), Some("V1"));
        assert!(!collector.no_voting);
        assert_eq!(collector.timeout, DEFAULT_COLLECT_TIMEOUT);
    }
}
