//! Best-effort credit handling.
//!
//! The balance is checked before every submission; a zero balance triggers
//! one receive attempt. None of this is allowed to fail a generation — the
//! upstream itself is the authority on whether the job may run.

use serde_json::json;

use super::region::{RegionInfo, SessionToken};
use super::upstream::UpstreamClient;
use crate::error::{GatewayError, GatewayResult};

/// Credit balance of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditBalance {
    pub gift: i64,
    pub purchase: i64,
    pub vip: i64,
    pub total: i64,
}

/// Check the balance and, when empty, try to claim the daily grant.
/// Failures are logged and swallowed.
pub async fn ensure_credit(upstream: &UpstreamClient, region: &RegionInfo, token: &SessionToken) {
    match query_credit(upstream, region, token).await {
        Ok(balance) if balance.total <= 0 => {
            tracing::info!("Credit balance empty, attempting to receive daily credit");
            if let Err(e) = receive_credit(upstream, region, token).await {
                tracing::warn!("Credit receive failed (continuing anyway): {}", e);
            }
        }
        Ok(balance) => {
            tracing::debug!(
                "Credit balance: total={} (gift={}, purchase={}, vip={})",
                balance.total,
                balance.gift,
                balance.purchase,
                balance.vip
            );
        }
        Err(e) => {
            tracing::warn!("Credit check failed (continuing anyway): {}", e);
        }
    }
}

/// `POST /token/points` — first entry of the returned list carries the
/// balance breakdown.
pub async fn query_credit(
    upstream: &UpstreamClient,
    region: &RegionInfo,
    token: &SessionToken,
) -> GatewayResult<CreditBalance> {
    let data = upstream
        .api_post(region, token, "/token/points", json!({}), &[])
        .await?;

    let points = data
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("points"))
        .ok_or_else(|| GatewayError::Server("points response carries no entries".to_string()))?;

    let field = |key: &str| points.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
    Ok(CreditBalance {
        gift: field("giftCredit"),
        purchase: field("purchaseCredit"),
        vip: field("vipCredit"),
        total: field("totalCredit"),
    })
}

async fn receive_credit(
    upstream: &UpstreamClient,
    region: &RegionInfo,
    token: &SessionToken,
) -> GatewayResult<()> {
    upstream
        .api_post(
            region,
            token,
            "/commerce/v1/benefits/credit_receive",
            json!({"time_zone": "Asia/Shanghai"}),
            &[],
        )
        .await?;
    Ok(())
}
