//! 订单合成（Merge/Synthesis）
//!
//! 将信号与放行的风控决策合成为一份可执行订单：
//! 绝对价位转换为相对入场价的百分比偏移，交给执行协作方。
//! 本步骤不做任何 I/O。

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app_config::settings::RiskParams;
use crate::trading::error::PipelineError;
use crate::trading::risk::{AccountSnapshot, RiskDecision};
use crate::trading::signal::{Direction, TradeSignal};

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// 可执行订单 - 由执行协作方消费一次
///
/// 百分比偏移以入场价为基准并按方向归一：
/// 无论多空，止损偏移恒为负、止盈偏移恒为正。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub instrument: String,
    pub side: OrderSide,
    /// 名义价值（美元）
    pub size: f64,
    /// 止损偏移（恒 < 0）
    pub stop_loss_pct: f64,
    /// 止盈偏移（恒 > 0）
    pub take_profit_pct: f64,
    pub leverage: u32,
}

/// 合成订单
///
/// 入场价取信号限价提示，缺失时取传入的最新市场价。
/// 若换算出的止损偏移落在盈利一侧，说明上游价格顺序有缺陷，
/// 返回不变量错误并终止本周期。
pub fn synthesize_order(
    signal: &TradeSignal,
    decision: &RiskDecision,
    account: &AccountSnapshot,
    market_price: f64,
    params: &RiskParams,
) -> Result<OrderSpec, PipelineError> {
    if !decision.approved {
        return Err(PipelineError::invariant(
            "cannot synthesize an order from a rejected decision",
        ));
    }

    let entry = signal.entry_hint.unwrap_or(market_price);
    if entry <= 0.0 || !entry.is_finite() {
        return Err(PipelineError::invariant(format!(
            "entry price {} is not positive",
            entry
        )));
    }

    let dir = signal.direction.sign();
    let stop_loss_pct = dir * (decision.stop_loss_price - entry) / entry;
    let take_profit_pct = dir * (decision.take_profit_price - entry) / entry;

    if stop_loss_pct >= 0.0 {
        return Err(PipelineError::invariant(format!(
            "stop loss {} lands on the profitable side of entry {} ({})",
            decision.stop_loss_price,
            entry,
            signal.direction.as_str()
        )));
    }
    if take_profit_pct <= 0.0 {
        return Err(PipelineError::invariant(format!(
            "take profit {} lands on the losing side of entry {} ({})",
            decision.take_profit_price,
            entry,
            signal.direction.as_str()
        )));
    }

    let side = match signal.direction {
        Direction::Long => OrderSide::Buy,
        Direction::Short => OrderSide::Sell,
        Direction::Flat => {
            return Err(PipelineError::invariant("flat signal has no order side"))
        }
    };

    // 名义价值 = 权益 × 仓位比例 × 杠杆，低于交易所下限时抬到下限
    let mut size = account.equity * decision.position_size_fraction * decision.max_leverage as f64;
    if size < params.min_order_notional_usd {
        warn!(
            "order notional {:.2} below exchange minimum {:.2}, bumping",
            size, params.min_order_notional_usd
        );
        size = params.min_order_notional_usd;
    }

    Ok(OrderSpec {
        instrument: signal.instrument.clone(),
        side,
        size,
        stop_loss_pct,
        take_profit_pct,
        leverage: decision.max_leverage,
    })
}

/// 订单执行接口（外部协作方）
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// 下单，附带止盈止损
    async fn place_order(&self, order: &OrderSpec) -> Result<()>;

    /// 平掉某产品的全部仓位
    async fn close_all(&self, instrument: &str) -> Result<()>;
}

/// 纸面执行器：只记录，不触达交易所
pub struct PaperExecutor;

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn place_order(&self, order: &OrderSpec) -> Result<()> {
        info!(
            "paper order: {} {} size={:.2} lev={} sl={:.4} tp={:.4}",
            order.instrument,
            order.side.as_str(),
            order.size,
            order.leverage,
            order.stop_loss_pct,
            order.take_profit_pct
        );
        Ok(())
    }

    async fn close_all(&self, instrument: &str) -> Result<()> {
        info!("paper close all: {}", instrument);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::market::TrendClass;

    fn approved(sl: f64, tp: f64) -> RiskDecision {
        RiskDecision {
            approved: true,
            max_leverage: 10,
            position_size_fraction: 0.5,
            stop_loss_price: sl,
            take_profit_price: tp,
            rejection_reason: None,
        }
    }

    fn signal(direction: Direction, entry: f64) -> TradeSignal {
        TradeSignal {
            instrument: "ETH-USDT-SWAP".to_string(),
            direction,
            confidence: 0.7,
            entry_hint: Some(entry),
            stop_loss: None,
            take_profit: None,
            reasoning: "test".to_string(),
            timestamp: 0,
        }
    }

    fn account() -> AccountSnapshot {
        AccountSnapshot {
            equity: 1_000.0,
            open_exposure_usd: 0.0,
            trend: TrendClass::Range,
        }
    }

    #[test]
    fn test_short_offsets_are_sign_normalized() {
        // 空头：止损在入场价上方，止盈在下方，偏移仍是负/正
        let spec = synthesize_order(
            &signal(Direction::Short, 3_000.0),
            &approved(3_060.0, 2_850.0),
            &account(),
            3_000.0,
            &RiskParams::default(),
        )
        .unwrap();
        assert_eq!(spec.side, OrderSide::Sell);
        assert!((spec.stop_loss_pct - (-0.02)).abs() < 1e-12);
        assert!((spec.take_profit_pct - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_stop_on_profitable_side_is_invariant_error() {
        let err = synthesize_order(
            &signal(Direction::Long, 3_000.0),
            &approved(3_060.0, 3_150.0),
            &account(),
            3_000.0,
            &RiskParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Invariant { .. }));
    }
}
