//! Bankroll sources.
//!
//! `PolygonWallet` reads the USDC.e balance of the configured wallet with a
//! raw `eth_call` against a Polygon JSON-RPC node. `FixedBankroll` stands in
//! when no wallet is configured.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::types::AugurError;

/// USDC.e (bridged) on Polygon.
pub const USDC_CONTRACT: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

const USDC_DECIMALS: u32 = 6;

/// Anything that can report the spendable USDC bankroll.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn usdc_balance(&self) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// Fixed bankroll
// ---------------------------------------------------------------------------

pub struct FixedBankroll(pub f64);

#[async_trait]
impl BalanceSource for FixedBankroll {
    async fn usdc_balance(&self) -> Result<f64> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// Polygon wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
}

pub struct PolygonWallet {
    http: reqwest::Client,
    rpc_url: String,
    address: String,
}

impl PolygonWallet {
    pub fn new(rpc_url: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if encode_balance_of(&address).is_none() {
            return Err(AugurError::Config(format!("invalid wallet address: {address}")).into());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Polygon RPC HTTP client")?;

        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl BalanceSource for PolygonWallet {
    async fn usdc_balance(&self) -> Result<f64> {
        let data = encode_balance_of(&self.address)
            .ok_or_else(|| AugurError::Config(format!("invalid wallet address: {}", self.address)))?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": USDC_CONTRACT, "data": data }, "latest"],
        });

        let resp: RpcResponse = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("Polygon RPC request failed")?
            .json()
            .await
            .context("Failed to parse Polygon RPC response")?;

        if let Some(err) = resp.error {
            return Err(AugurError::Platform {
                platform: "polygon-rpc".into(),
                message: err.message,
            }
            .into());
        }

        let raw = resp.result.unwrap_or_default();
        let balance = decode_usdc_amount(&raw)
            .ok_or_else(|| AugurError::Parse(format!("unexpected balanceOf result: {raw}")))?;

        debug!(address = %self.address, balance = format!("${balance:.2}"), "USDC balance");
        Ok(balance)
    }
}

/// Call data for `balanceOf(address)`: selector plus the address left-padded
/// to 32 bytes. `None` when the address is not 20 bytes of hex.
fn encode_balance_of(address: &str) -> Option<String> {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{BALANCE_OF_SELECTOR}{:0>64}", hex.to_lowercase()))
}

/// Decode a hex uint256 result into whole USDC.
fn decode_usdc_amount(raw: &str) -> Option<f64> {
    let hex = raw.strip_prefix("0x").unwrap_or(raw).trim_start_matches('0');
    if hex.is_empty() {
        return Some(0.0);
    }
    let units = u128::from_str_radix(hex, 16).ok()?;
    let units = i128::try_from(units).ok()?;
    Decimal::try_from_i128_with_scale(units, USDC_DECIMALS)
        .ok()?
        .to_f64()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
