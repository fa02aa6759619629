// Numan Thabit 2025
//! Typed JSON-RPC client for the subset of the Solana RPC surface the exporter reads.

use std::{collections::HashMap, fmt, future::Future, str::FromStr, sync::Arc, time::Duration};

use reqwest::{header::CONTENT_TYPE, Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Failure of a single upstream call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rpc endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("{0} response carried neither result nor error")]
    MissingResult(&'static str),
    #[error("deadline exceeded before {0} completed")]
    DeadlineExceeded(&'static str),
}

/// Bank state a query observes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" | "recent" => Ok(Commitment::Processed),
            "confirmed" | "single" => Ok(Commitment::Confirmed),
            "finalized" | "max" | "root" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub absolute_slot: u64,
    #[serde(default)]
    pub block_height: u64,
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    #[serde(default)]
    pub transaction_count: Option<u64>,
}

impl EpochInfo {
    pub fn first_slot(&self) -> u64 {
        self.absolute_slot.saturating_sub(self.slot_index)
    }

    pub fn last_slot(&self) -> u64 {
        (self.first_slot() + self.slots_in_epoch).saturating_sub(1)
    }
}

/// One row of a vote account's credit history: `(epoch, credits, previous_credits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochCredits(pub u64, pub u64, pub u64);

impl EpochCredits {
    pub fn credits(&self) -> u64 {
        self.1
    }

    pub fn previous_credits(&self) -> u64 {
        self.2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccount {
    pub vote_pubkey: String,
    pub node_pubkey: String,
    pub activated_stake: u64,
    #[serde(default)]
    pub epoch_vote_account: bool,
    #[serde(default)]
    pub commission: u8,
    pub last_vote: u64,
    pub root_slot: u64,
    #[serde(default)]
    pub epoch_credits: Vec<EpochCredits>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAccounts {
    pub current: Vec<VoteAccount>,
    pub delinquent: Vec<VoteAccount>,
}

impl VoteAccounts {
    /// Current records first, then delinquent ones.
    pub fn iter(&self) -> impl Iterator<Item = &VoteAccount> {
        self.current.iter().chain(self.delinquent.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccountsConfig {
    pub commitment: Commitment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_pubkey: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProductionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Commitment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl BlockProductionConfig {
    pub fn with_commitment(commitment: Commitment) -> Self {
        Self {
            commitment: Some(commitment),
            identity: None,
        }
    }

    pub fn for_identity(identity: impl Into<String>) -> Self {
        Self {
            commitment: None,
            identity: Some(identity.into()),
        }
    }
}

/// Leader and produced slot counts for one identity in the active epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotProduction(pub u64, pub u64);

impl SlotProduction {
    pub fn leader_slots(&self) -> u64 {
        self.0
    }

    pub fn produced_slots(&self) -> u64 {
        self.1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProduction {
    pub by_identity: HashMap<String, SlotProduction>,
}

/// Leader identity -> slot indexes (relative to the epoch's first slot).
pub type LeaderSchedule = HashMap<String, Vec<u64>>;

/// The upstream node surface consumed by the collector and the slot watcher.
pub trait SolanaRpc: Send + Sync {
    fn get_epoch_info(
        &self,
        commitment: Commitment,
    ) -> impl Future<Output = Result<EpochInfo, RpcError>> + Send;

    fn get_version(&self) -> impl Future<Output = Result<String, RpcError>> + Send;

    fn get_identity(&self) -> impl Future<Output = Result<String, RpcError>> + Send;

    fn get_health(&self) -> impl Future<Output = Result<bool, RpcError>> + Send;

    fn get_vote_accounts(
        &self,
        config: &VoteAccountsConfig,
    ) -> impl Future<Output = Result<VoteAccounts, RpcError>> + Send;

    fn get_block_production(
        &self,
        config: &BlockProductionConfig,
    ) -> impl Future<Output = Result<BlockProduction, RpcError>> + Send;

    fn get_balance(
        &self,
        pubkey: &str,
        commitment: Commitment,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// `None` when the node has no schedule for the epoch containing `slot`.
    fn get_leader_schedule(
        &self,
        slot: Option<u64>,
        commitment: Commitment,
    ) -> impl Future<Output = Result<Option<LeaderSchedule>, RpcError>> + Send;

    fn get_blocks(
        &self,
        start_slot: u64,
        end_slot: u64,
        commitment: Commitment,
    ) -> impl Future<Output = Result<Vec<u64>, RpcError>> + Send;
}

impl<T: SolanaRpc> SolanaRpc for Arc<T> {
    fn get_epoch_info(
        &self,
        commitment: Commitment,
    ) -> impl Future<Output = Result<EpochInfo, RpcError>> + Send {
        (**self).get_epoch_info(commitment)
    }

    fn get_version(&self) -> impl Future<Output = Result<String, RpcError>> + Send {
        (**self).get_version()
    }

    fn get_identity(&self) -> impl Future<Output = Result<String, RpcError>> + Send {
        (**self).get_identity()
    }

    fn get_health(&self) -> impl Future<Output = Result<bool, RpcError>> + Send {
        (**self).get_health()
    }

    fn get_vote_accounts(
        &self,
        config: &VoteAccountsConfig,
    ) -> impl Future<Output = Result<VoteAccounts, RpcError>> + Send {
        (**self).get_vote_accounts(config)
    }

    fn get_block_production(
        &self,
        config: &BlockProductionConfig,
    ) -> impl Future<Output = Result<BlockProduction, RpcError>> + Send {
        (**self).get_block_production(config)
    }

    fn get_balance(
        &self,
        pubkey: &str,
        commitment: Commitment,
    ) -> impl Future<Output = Result<u64, RpcError>> + Send {
        (**self).get_balance(pubkey, commitment)
    }

    fn get_leader_schedule(
        &self,
        slot: Option<u64>,
        commitment: Commitment,
    ) -> impl Future<Output = Result<Option<LeaderSchedule>, RpcError>> + Send {
        (**self).get_leader_schedule(slot, commitment)
    }

    fn get_blocks(
        &self,
        start_slot: u64,
        end_slot: u64,
        commitment: Commitment,
    ) -> impl Future<Output = Result<Vec<u64>, RpcError>> + Send {
        (**self).get_blocks(start_slot, end_slot, commitment)
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "solana-core")]
    solana_core: String,
}

#[derive(Debug, Deserialize)]
struct IdentityInfo {
    identity: String,
}

/// HTTP JSON-RPC client for a single node.
#[derive(Clone, Debug)]
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .tcp_nodelay(true)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { client, url })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RpcError::Status(response.status()));
        }

        let body = response.bytes().await?;
        decode_response(method, &body)
    }
}

fn decode_response<T: DeserializeOwned>(method: &'static str, body: &[u8]) -> Result<T, RpcError> {
    let envelope: JsonRpcResponse =
        serde_json::from_slice(body).map_err(|source| RpcError::Decode { method, source })?;
    if let Some(err) = envelope.error {
        return Err(RpcError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    let result = envelope.result.ok_or(RpcError::MissingResult(method))?;
    serde_json::from_value(result).map_err(|source| RpcError::Decode { method, source })
}

/// Error code a node answers `getHealth` with while it is behind or otherwise unhealthy.
const NODE_UNHEALTHY: i64 = -32005;

fn health_status(response: Result<String, RpcError>) -> Result<bool, RpcError> {
    match response {
        Ok(status) => Ok(status == "ok"),
        Err(RpcError::Rpc {
            code: NODE_UNHEALTHY,
            ..
        }) => Ok(false),
        Err(err) => Err(err),
    }
}

fn commitment_param(commitment: Commitment) -> Value {
    json!({ "commitment": commitment })
}

impl SolanaRpc for RpcClient {
    async fn get_epoch_info(&self, commitment: Commitment) -> Result<EpochInfo, RpcError> {
        self.call("getEpochInfo", json!([commitment_param(commitment)]))
            .await
    }

    async fn get_version(&self) -> Result<String, RpcError> {
        let version: VersionInfo = self.call("getVersion", json!([])).await?;
        Ok(version.solana_core)
    }

    async fn get_identity(&self) -> Result<String, RpcError> {
        let identity: IdentityInfo = self.call("getIdentity", json!([])).await?;
        Ok(identity.identity)
    }

    async fn get_health(&self) -> Result<bool, RpcError> {
        health_status(self.call::<String>("getHealth", json!([])).await)
    }

    async fn get_vote_accounts(
        &self,
        config: &VoteAccountsConfig,
    ) -> Result<VoteAccounts, RpcError> {
        self.call("getVoteAccounts", json!([config])).await
    }

    async fn get_block_production(
        &self,
        config: &BlockProductionConfig,
    ) -> Result<BlockProduction, RpcError> {
        let production: WithContext<BlockProduction> =
            self.call("getBlockProduction", json!([config])).await?;
        Ok(production.value)
    }

    async fn get_balance(&self, pubkey: &str, commitment: Commitment) -> Result<u64, RpcError> {
        let balance: WithContext<u64> = self
            .call("getBalance", json!([pubkey, commitment_param(commitment)]))
            .await?;
        Ok(balance.value)
    }

    async fn get_leader_schedule(
        &self,
        slot: Option<u64>,
        commitment: Commitment,
    ) -> Result<Option<LeaderSchedule>, RpcError> {
        self.call(
            "getLeaderSchedule",
            json!([slot, commitment_param(commitment)]),
        )
        .await
    }

    async fn get_blocks(
        &self,
        start_slot: u64,
        end_slot: u64,
        commitment: Commitment,
    ) -> Result<Vec<u64>, RpcError> {
        self.call(
            "getBlocks",
            json!([start_slot, end_slot, commitment_param(commitment)]),
        )
        .await
    }
}
