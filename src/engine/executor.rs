//! Trade executor.
//!
//! Turns a tradeable `SizingDecision` into a priced order for the outcome
//! token and hands it to an `OrderPlacer`. The paper placer is the only
//! placer shipped; orders never leave the process in dry-run mode.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::platforms::{MarketSource, OrderPlacer, OrderRequest, OrderSide};
use crate::strategy::{round_currency, SizingDecision};
use crate::types::{AugurError, Market, TradeReceipt};

// ---------------------------------------------------------------------------
// Paper placer
// ---------------------------------------------------------------------------

/// Fills every order immediately at the requested price.
pub struct PaperPlacer;

#[async_trait]
impl OrderPlacer for PaperPlacer {
    async fn place_order(&self, order: &OrderRequest) -> Result<TradeReceipt> {
        let receipt = TradeReceipt {
            order_id: format!("paper-{}", uuid::Uuid::new_v4()),
            token_id: order.token_id.clone(),
            side: order.side,
            amount: order.amount,
            price: order.price,
            shares: order.shares,
            paper: true,
            timestamp: Utc::now(),
        };
        info!(
            market_id = %order.market_id,
            side = %order.side,
            amount = format!("${:.2}", order.amount),
            price = format!("{:.3}", order.price),
            "[DRY RUN] Paper order filled"
        );
        Ok(receipt)
    }

    fn is_paper(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    prices: Arc<dyn MarketSource>,
    placer: Arc<dyn OrderPlacer>,
    /// Hard per-order cap in USDC, independent of the sizer.
    max_order_size: f64,
}

impl Executor {
    pub fn new(
        prices: Arc<dyn MarketSource>,
        placer: Arc<dyn OrderPlacer>,
        max_order_size: f64,
    ) -> Self {
        Self {
            prices,
            placer,
            max_order_size,
        }
    }

    pub fn is_paper(&self) -> bool {
        self.placer.is_paper()
    }

    /// Buy the decided outcome token for `decision.size()` USDC (capped).
    pub async fn execute(&self, market: &Market, decision: &SizingDecision) -> Result<TradeReceipt> {
        let side = match (decision.should_trade(), decision.side()) {
            (true, Some(side)) => side,
            _ => {
                return Err(AugurError::Execution(format!(
                    "decision for {} is not tradeable: {}",
                    market.id,
                    decision.reason()
                ))
                .into())
            }
        };

        let token_id = market.token_for(side).ok_or_else(|| {
            AugurError::Execution(format!("market {} has no {side} token id", market.id))
        })?;

        let mut amount = decision.size();
        if amount > self.max_order_size {
            warn!(
                market_id = %market.id,
                requested = format!("${amount:.2}"),
                cap = format!("${:.2}", self.max_order_size),
                "Order size clamped to safety cap"
            );
            amount = self.max_order_size;
        }
        let amount = round_currency(amount);
        if amount <= 0.0 {
            return Err(AugurError::Execution(format!("order size for {} is zero", market.id)).into());
        }

        let price = match self.prices.best_price(token_id, OrderSide::Buy).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!(market_id = %market.id, "Empty order book, using quoted price");
                market.price_for(side)
            }
            Err(e) => {
                warn!(market_id = %market.id, error = %e, "Order book unavailable, using quoted price");
                market.price_for(side)
            }
        };

        if !(price > 0.0 && price < 1.0) {
            return Err(AugurError::Execution(format!(
                "no usable {side} price for {} (got {price})",
                market.id
            ))
            .into());
        }

        let order = OrderRequest {
            market_id: market.id.clone(),
            token_id: token_id.to_string(),
            side,
            amount,
            price,
            shares: amount / price,
        };

        let receipt = self.placer.place_order(&order).await?;

        info!(
            market_id = %market.id,
            order_id = %receipt.order_id,
            side = %side,
            amount = format!("${:.2}", receipt.amount),
            price = format!("{:.3}", receipt.price),
            shares = format!("{:.2}", receipt.shares),
            paper = receipt.paper,
            "Order placed"
        );

        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::{MockMarketSource, MockOrderPlacer};
    use crate::strategy::kelly::{ConfidenceKelly, SizingStrategy};
    use crate::strategy::Rejection;
    use crate::types::Side;

    fn market() -> Market {
        Market {
            id: "m1".into(),
            condition_id: "0xm1".into(),
            question: "Will it happen?".into(),
            description: String::new(),
            end_date: None,
            volume: 1e5,
            liquidity: 1e4,
            yes_price: 0.40,
            no_price: 0.60,
            token_ids: vec!["yes-token".into(), "no-token".into()],
        }
    }

    fn yes_decision(size_edge: f64) -> SizingDecision {
        ConfidenceKelly::default().size(Side::Yes, size_edge, 8.0, 100.0)
    }

    fn paper_executor(prices: MockMarketSource) -> Executor {
        Executor::new(Arc::new(prices), Arc::new(PaperPlacer), 10.0)
    }

    #[tokio::test]
    async fn test_executes_at_book_price() {
        let mut prices = MockMarketSource::new();
        prices
            .expect_best_price()
            .withf(|token, side| token == "yes-token" && *side == OrderSide::Buy)
            .returning(|_, _| Ok(Some(0.5)));

        let decision = yes_decision(0.10); // 0.1 * 0.8 * 0.5 * 100 = $4
        let receipt = paper_executor(prices).execute(&market(), &decision).await.unwrap();
        assert!(receipt.paper);
        assert!(receipt.order_id.starts_with("paper-"));
        assert_eq!(receipt.token_id, "yes-token");
        assert!((receipt.amount - 4.0).abs() < 1e-9);
        assert!((receipt.shares - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_side_uses_second_token_and_falls_back_to_quote() {
        let mut prices = MockMarketSource::new();
        prices
            .expect_best_price()
            .withf(|token, _| token == "no-token")
            .returning(|_, _| Ok(None));

        let decision = ConfidenceKelly::default().size(Side::No, -0.2, 6.0, 50.0);
        let receipt = paper_executor(prices).execute(&market(), &decision).await.unwrap();
        assert_eq!(receipt.side, Side::No);
        assert!((receipt.price - 0.60).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_order_clamped_to_cap() {
        let mut prices = MockMarketSource::new();
        prices.expect_best_price().returning(|_, _| Ok(Some(0.4)));

        // Sizer allows up to $50 here, executor caps at $10.
        let wide = ConfidenceKelly { max_bet_size: 50.0, min_bet_size: 1.0 };
        let decision = wide.size(Side::Yes, 0.5, 10.0, 1000.0);
        assert!(decision.size() > 10.0);
        let receipt = paper_executor(prices).execute(&market(), &decision).await.unwrap();
        assert!((receipt.amount - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_decision_not_placed() {
        let prices = MockMarketSource::new();
        let mut placer = MockOrderPlacer::new();
        placer.expect_place_order().times(0);

        let executor = Executor::new(Arc::new(prices), Arc::new(placer), 10.0);
        let decision =
            SizingDecision::reject(Rejection::ZeroSize, SizingStrategy::ConfidenceKelly, 0.0);
        let err = executor.execute(&market(), &decision).await.unwrap_err();
        assert!(err.to_string().contains("not tradeable"));
    }

    #[tokio::test]
    async fn test_missing_token_is_error() {
        let prices = MockMarketSource::new();
        let mut m = market();
        m.token_ids.clear();
        let err = paper_executor(prices)
            .execute(&m, &yes_decision(0.1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no YES token"));
    }

    #[tokio::test]
    async fn test_placer_error_propagates() {
        let mut prices = MockMarketSource::new();
        prices.expect_best_price().returning(|_, _| Ok(Some(0.5)));
        let mut placer = MockOrderPlacer::new();
        placer
            .expect_place_order()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("exchange down")));

        let executor = Executor::new(Arc::new(prices), Arc::new(placer), 10.0);
        let err = executor.execute(&market(), &yes_decision(0.1)).await.unwrap_err();
        assert!(err.to_string().contains("exchange down"));
    }
}
