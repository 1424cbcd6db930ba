//! 影子结算模拟器
//!
//! 每个周期对账本中的持仓做一次结算扫描：
//! 当前价触及止损/止盈阈值即按阈值价平仓（含滑点），
//! 无止盈止损的仓位只能由平仓信号或持仓时长策略关闭。

use tracing::{info, warn};

use crate::app_config::settings::ShadowParams;
use crate::trading::shadow::ledger::{ExitReason, ShadowLedger, ShadowTrade};
use crate::trading::signal::Direction;

/// 结算模拟器
pub struct ShadowSimulator {
    params: ShadowParams,
}

impl ShadowSimulator {
    pub fn new(params: ShadowParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ShadowParams {
        &self.params
    }

    /// 判断持仓在当前价下是否触发退出，返回(触发价, 原因)
    fn exit_trigger(&self, trade: &ShadowTrade, price: f64, now_ms: i64) -> Option<(f64, ExitReason)> {
        match trade.direction {
            Direction::Long => {
                if let Some(sl) = trade.stop_loss {
                    if price <= sl {
                        return Some((sl, ExitReason::StopLoss));
                    }
                }
                if let Some(tp) = trade.take_profit {
                    if price >= tp {
                        return Some((tp, ExitReason::TakeProfit));
                    }
                }
            }
            Direction::Short => {
                if let Some(sl) = trade.stop_loss {
                    if price >= sl {
                        return Some((sl, ExitReason::StopLoss));
                    }
                }
                if let Some(tp) = trade.take_profit {
                    if price <= tp {
                        return Some((tp, ExitReason::TakeProfit));
                    }
                }
            }
            Direction::Flat => {}
        }

        // 持仓时长策略：超时仓位按市场价关闭（0 表示关闭该策略）
        if self.params.max_trade_age_minutes > 0 {
            let age_minutes = (now_ms - trade.opened_at) / 60_000;
            if age_minutes >= self.params.max_trade_age_minutes {
                return Some((price, ExitReason::MaxAge));
            }
        }

        None
    }

    /// 结算扫描：检查指定产品的全部持仓并平掉已触发的
    pub fn settle(
        &self,
        ledger: &mut ShadowLedger,
        instrument: &str,
        price: f64,
        now_ms: i64,
    ) -> Vec<ShadowTrade> {
        if price <= 0.0 || !price.is_finite() {
            return Vec::new();
        }

        let triggered: Vec<(String, f64, ExitReason)> = ledger
            .open_trades()
            .iter()
            .filter(|t| t.instrument == instrument)
            .filter_map(|t| {
                self.exit_trigger(t, price, now_ms)
                    .map(|(px, reason)| (t.id.clone(), px, reason))
            })
            .collect();

        let mut closed = Vec::new();
        for (trade_id, exit_quote, reason) in triggered {
            match ledger.close_trade(
                &trade_id,
                exit_quote,
                reason,
                self.params.fee_rate,
                self.params.slippage_rate,
                now_ms,
            ) {
                Ok(trade) => {
                    info!(
                        "shadow close {} ({}): net {:+.2}, equity {:.2}",
                        trade.id,
                        reason.as_str(),
                        trade.pnl_usd.unwrap_or(0.0),
                        ledger.account.current_equity
                    );
                    closed.push(trade);
                }
                // 状态错误说明该交易已被并发周期结算，丢弃本次操作即可
                Err(e) => warn!("shadow settle dropped: {}", e),
            }
        }
        closed
    }

    /// 平掉某产品的全部持仓（响应平仓信号）
    pub fn close_all(
        &self,
        ledger: &mut ShadowLedger,
        instrument: &str,
        price: f64,
        now_ms: i64,
    ) -> Vec<ShadowTrade> {
        if price <= 0.0 || !price.is_finite() {
            return Vec::new();
        }

        let ids: Vec<String> = ledger
            .open_trades()
            .iter()
            .filter(|t| t.instrument == instrument)
            .map(|t| t.id.clone())
            .collect();

        let mut closed = Vec::new();
        for trade_id in ids {
            match ledger.close_trade(
                &trade_id,
                price,
                ExitReason::Signal,
                self.params.fee_rate,
                self.params.slippage_rate,
                now_ms,
            ) {
                Ok(trade) => closed.push(trade),
                Err(e) => warn!("shadow close_all dropped: {}", e),
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::shadow::ledger::OpenTradeRequest;

    fn simulator() -> ShadowSimulator {
        ShadowSimulator::new(ShadowParams::default())
    }

    fn open(ledger: &mut ShadowLedger, direction: Direction, sl: Option<f64>, tp: Option<f64>) {
        ledger.open_trade(
            OpenTradeRequest {
                instrument: "BTC-USDT-SWAP".to_string(),
                direction,
                confidence: 0.7,
                reasoning: "test".to_string(),
                quote_price: 100.0,
                stop_loss: sl,
                take_profit: tp,
                size_usd: 100.0,
                leverage: 10,
                decision_context: "{}".to_string(),
                now_ms: 0,
            },
            0.0001,
        );
    }

    #[test]
    fn test_long_stop_loss_crossing_closes_at_threshold() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        open(&mut ledger, Direction::Long, Some(98.0), Some(105.0));
        let closed = simulator().settle(&mut ledger, "BTC-USDT-SWAP", 97.5, 60_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        // 阈值价 98.0 上再叠加滑点
        assert!((closed[0].exit_price.unwrap() - 98.0 * (1.0 - 0.0001)).abs() < 1e-9);
        assert!(ledger.account.invariant_holds(1e-9));
    }

    #[test]
    fn test_short_take_profit_crossing() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        open(&mut ledger, Direction::Short, Some(103.0), Some(95.0));
        let closed = simulator().settle(&mut ledger, "BTC-USDT-SWAP", 94.0, 60_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::TakeProfit));
        assert!(closed[0].pnl_usd.unwrap() > 0.0);
    }

    #[test]
    fn test_no_trigger_keeps_trade_open() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        open(&mut ledger, Direction::Long, Some(98.0), Some(105.0));
        let closed = simulator().settle(&mut ledger, "BTC-USDT-SWAP", 101.0, 60_000);
        assert!(closed.is_empty());
        assert_eq!(ledger.open_trades().len(), 1);
    }

    #[test]
    fn test_stopless_trade_never_auto_closes_by_default() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        open(&mut ledger, Direction::Long, None, None);
        let closed = simulator().settle(&mut ledger, "BTC-USDT-SWAP", 250.0, i64::MAX / 2);
        assert!(closed.is_empty());
    }

    #[test]
    fn test_max_age_policy_closes_stopless_trade() {
        let mut params = ShadowParams::default();
        params.max_trade_age_minutes = 60;
        let sim = ShadowSimulator::new(params);

        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        open(&mut ledger, Direction::Long, None, None);
        let closed = sim.settle(&mut ledger, "BTC-USDT-SWAP", 100.5, 61 * 60_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::MaxAge));
    }

    #[test]
    fn test_close_all_on_signal() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        open(&mut ledger, Direction::Long, Some(98.0), None);
        open(&mut ledger, Direction::Short, Some(103.0), None);
        let closed = simulator().close_all(&mut ledger, "BTC-USDT-SWAP", 100.0, 60_000);
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|t| t.exit_reason == Some(ExitReason::Signal)));
        assert!(ledger.open_trades().is_empty());
        assert!(ledger.account.invariant_holds(1e-9));
    }
}
