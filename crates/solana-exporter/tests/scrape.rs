// Numan Thabit 2025
use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use solana_exporter::{
    collector::{CollectorConfig, SolanaCollector},
    http::router,
    metrics::ExporterMetrics,
    rpc::{
        BlockProduction, BlockProductionConfig, Commitment, EpochCredits, EpochInfo,
        LeaderSchedule, RpcError, SolanaRpc, VoteAccount, VoteAccounts,
        VoteAccountsConfig,
    },
};
use tower::ServiceExt;

/// Node whose vote and balance queries work but whose block production query fails.
struct PartialNode;

fn unavailable() -> RpcError {
    RpcError::Rpc {
        code: -32009,
        message: "block production unavailable".into(),
    }
}

impl SolanaRpc for PartialNode {
    async fn get_epoch_info(&self, _commitment: Commitment) -> Result<EpochInfo, RpcError> {
        Ok(EpochInfo {
            absolute_slot: 4_520,
            block_height: 4_400,
            epoch: 10,
            slot_index: 200,
            slots_in_epoch: 432,
            transaction_count: Some(9_000),
        })
    }

    async fn get_version(&self) -> Result<String, RpcError> {
        Ok("1.18.22".into())
    }

    async fn get_identity(&self) -> Result<String, RpcError> {
        Ok("N1".into())
    }

    async fn get_health(&self) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn get_vote_accounts(
        &self,
        _config: &VoteAccountsConfig,
    ) -> Result<VoteAccounts, RpcError> {
        Ok(VoteAccounts {
            current: vec![VoteAccount {
                vote_pubkey: "V1".into(),
                node_pubkey: "N1".into(),
                activated_stake: 5_000,
                epoch_vote_account: true,
                commission: 7,
                last_vote: 4_519,
                root_slot: 4_488,
                epoch_credits: vec![EpochCredits(9, 400, 300), EpochCredits(10, 500, 400)],
            }],
            delinquent: vec![],
        })
    }

    async fn get_block_production(
        &self,
        _config: &BlockProductionConfig,
    ) -> Result<BlockProduction, RpcError> {
        Err(unavailable())
    }

    async fn get_balance(&self, pubkey: &str, _commitment: Commitment) -> Result<u64, RpcError> {
        match pubkey {
            "N1" => Ok(1_000),
            "V1" => Ok(2_000),
            _ => Err(unavailable()),
        }
    }

    async fn get_leader_schedule(
        &self,
        _slot: Option<u64>,
        _commitment: Commitment,
    ) -> Result<Option<LeaderSchedule>, RpcError> {
        Ok(Some(HashMap::new()))
    }

    async fn get_blocks(
        &self,
        _start_slot: u64,
        _end_slot: u64,
        _commitment: Commitment,
    ) -> Result<Vec<u64>, RpcError> {
        Ok(vec![])
    }
}

async fn scrape(path: &str) -> Result<(StatusCode, String)> {
    let collector = Arc::new(SolanaCollector::new(
        PartialNode,
        CollectorConfig {
            vote_pubkey: Some("V1".into()),
            ..CollectorConfig::default()
        },
    ));
    let app = router(collector, ExporterMetrics::new()?);
    let response = app
        .oneshot(Request::builder().uri(path).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8(body.to_vec())?))
}

#[tokio::test]
async fn partial_failure_still_serves_metrics() -> Result<()> {
    let (status, body) = scrape("/metrics").await?;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("solana_current_epoch{epoch=\"10\"} 10"));
    assert!(body.contains("solana_health_check{nodekey=\"N1\"} 1"));
    assert!(body.contains("solana_validator_epoch_credits{pubkey=\"V1\",nodekey=\"N1\"} 100"));
    assert!(body.contains("solana_validator_voting_percentage{pubkey=\"V1\",nodekey=\"N1\"} 50"));
    assert!(body.contains("solana_validator_total_credits{pubkey=\"V1\",nodekey=\"N1\"} 500"));
    assert!(body.contains("solana_validator_delinquent{pubkey=\"V1\",nodekey=\"N1\"} 0"));
    assert!(body.contains("solana_active_validators{state=\"current\"} 1"));
    assert!(body.contains("solana_validator_balance{account=\"validator\"} 1000"));
    assert!(body.contains("solana_validator_balance{account=\"vote\"} 2000"));
    assert!(body.contains("# metric evaluation failed: leader_slots_in_epoch:"));
    assert!(body.contains("# metric evaluation failed: produced_slots_in_epoch:"));
    assert!(body.contains(
        "solana_exporter_collection_errors_total{metric=\"leader_slots_in_epoch\"} 1"
    ));
    assert!(!body.contains("leader_slots_in_epoch{"));
    Ok(())
}

#[tokio::test]
async fn healthz_answers_ok() -> Result<()> {
    let (status, body) = scrape("/healthz").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
    Ok(())
}
