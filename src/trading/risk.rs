//! 风控与仓位计算引擎
//!
//! 输入规范化信号和账户快照，输出一份有界的风控决策：
//! 放行/拒绝、杠杆、仓位比例、止损止盈价。
//! 引擎是纯函数，不修改任何账户状态；拒绝是一等决策结果而非错误。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_config::settings::RiskParams;
use crate::trading::market::TrendClass;
use crate::trading::signal::{Direction, TradeSignal};

/// 账户快照（实盘或影子账户均可）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// 账户权益（美元）
    pub equity: f64,
    /// 已占用保证金（美元）
    pub open_exposure_usd: f64,
    /// 当前趋势分类
    pub trend: TrendClass,
}

/// 风控决策 - 每个周期生成新的一份，从不原地修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub approved: bool,
    /// 本单使用的杠杆（放行时有效）
    pub max_leverage: u32,
    /// 占可用权益的仓位比例 [0,1]
    pub position_size_fraction: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub rejection_reason: Option<String>,
}

impl RiskDecision {
    fn reject(reason: &str) -> Self {
        Self {
            approved: false,
            max_leverage: 0,
            position_size_fraction: 0.0,
            stop_loss_price: 0.0,
            take_profit_price: 0.0,
            rejection_reason: Some(reason.to_string()),
        }
    }
}

/// 置信度到杠杆/仓位比例的映射策略
///
/// 映射必须单调：置信度越高，杠杆与仓位比例不得降低。
pub trait SizingStrategy: Send + Sync {
    fn leverage_for(&self, confidence: f64) -> u32;
    fn size_fraction_for(&self, confidence: f64) -> f64;
}

/// 默认映射：阶梯式杠杆 + 线性仓位比例
///
/// 阶梯参考主流合约杠杆档位，比例上限由风控参数另行截断。
pub struct ConfidenceLadder;

impl SizingStrategy for ConfidenceLadder {
    fn leverage_for(&self, confidence: f64) -> u32 {
        if confidence < 0.65 {
            5
        } else if confidence < 0.75 {
            10
        } else if confidence < 0.85 {
            20
        } else {
            40
        }
    }

    fn size_fraction_for(&self, confidence: f64) -> f64 {
        (confidence * 0.9).clamp(0.0, 1.0)
    }
}

/// 风控引擎
pub struct RiskEngine {
    params: RiskParams,
    sizing: Box<dyn SizingStrategy>,
}

impl RiskEngine {
    pub fn new(params: RiskParams) -> Self {
        Self {
            params,
            sizing: Box::new(ConfidenceLadder),
        }
    }

    pub fn with_sizing(params: RiskParams, sizing: Box<dyn SizingStrategy>) -> Self {
        Self { params, sizing }
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    /// 评估信号，规则按序执行，先命中的拒绝即生效
    pub fn evaluate(&self, signal: &TradeSignal, account: &AccountSnapshot) -> RiskDecision {
        // 平仓/观望信号不开新仓
        if signal.direction == Direction::Flat {
            return RiskDecision::reject("no_trade_signal");
        }

        // 1. 空头趋势锁定：趋势为空时只放行高置信度信号
        if account.trend == TrendClass::Bear
            && signal.confidence <= self.params.bear_trend_confidence_override
        {
            return RiskDecision::reject("bear_trend_lockout");
        }

        // 2. 置信度下限：手续费会吃掉低确定性的小赢
        if signal.confidence < self.params.min_confidence {
            return RiskDecision::reject("confidence_floor");
        }

        // 3. 置信度映射出的杠杆超过账户上限则拒绝
        let leverage = self.sizing.leverage_for(signal.confidence);
        if leverage > self.params.max_leverage {
            return RiskDecision::reject("leverage_exceeded");
        }

        // 4. 总保证金占用检查
        let fraction = self
            .sizing
            .size_fraction_for(signal.confidence)
            .min(self.params.position_size_ceiling);
        let margin = account.equity * fraction;
        if account.open_exposure_usd + margin
            > self.params.max_total_exposure_fraction * account.equity
        {
            return RiskDecision::reject("exposure_exceeded");
        }

        // 放行：止损止盈优先用信号给出的价位，缺失时按默认偏移计算
        let entry = signal.entry_hint.unwrap_or(0.0);
        let dir = signal.direction.sign();
        let stop_loss_price = signal
            .stop_loss
            .unwrap_or(entry * (1.0 - dir * self.params.default_stop_loss_pct));
        let take_profit_price = signal
            .take_profit
            .unwrap_or(entry * (1.0 + dir * self.params.default_take_profit_pct));

        debug!(
            "risk approve: {} {} conf={:.2} lev={} fraction={:.2} sl={} tp={}",
            signal.instrument,
            signal.direction.as_str(),
            signal.confidence,
            leverage,
            fraction,
            stop_loss_price,
            take_profit_price
        );

        RiskDecision {
            approved: true,
            max_leverage: leverage,
            position_size_fraction: fraction,
            stop_loss_price,
            take_profit_price,
            rejection_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(confidence: f64) -> TradeSignal {
        TradeSignal {
            instrument: "BTC-USDT-SWAP".to_string(),
            direction: Direction::Long,
            confidence,
            entry_hint: Some(50_000.0),
            stop_loss: None,
            take_profit: None,
            reasoning: "test".to_string(),
            timestamp: 0,
        }
    }

    fn account(trend: TrendClass) -> AccountSnapshot {
        AccountSnapshot {
            equity: 10_000.0,
            open_exposure_usd: 0.0,
            trend,
        }
    }

    #[test]
    fn test_default_stops_filled_from_offsets() {
        let engine = RiskEngine::new(RiskParams::default());
        let decision = engine.evaluate(&signal(0.7), &account(TrendClass::Range));
        assert!(decision.approved);
        assert!((decision.stop_loss_price - 49_000.0).abs() < 1e-9);
        assert!((decision.take_profit_price - 52_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_ladder_is_monotonic() {
        let ladder = ConfidenceLadder;
        let mut last = 0;
        for conf in [0.1, 0.3, 0.6, 0.66, 0.76, 0.86, 0.99] {
            let lev = ladder.leverage_for(conf);
            assert!(lev >= last);
            last = lev;
        }
    }
}
