//! 影子账本
//!
//! 独立于交易所的虚拟账户：开平仓只依据传入的行情报价，
//! 成交价按滑点模型逆向偏移，手续费在平仓时一次性计提。
//! 账本是唯一允许修改 `ShadowAccountState` 的地方。
//!
//! 结算恒等式（每次平仓后成立）：
//! `current_equity == initial_equity + total_pnl - total_fees - total_slippage`
//! 其中 `total_pnl` 按报价口径累计（毛收益），权益按净收益变动。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trading::error::PipelineError;
use crate::trading::signal::Direction;

/// 交易状态：开仓 -> 平仓，平仓为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

/// 平仓原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// 触发止损
    StopLoss,
    /// 触发止盈
    TakeProfit,
    /// 外部平仓信号
    Signal,
    /// 超过最大持有时长
    MaxAge,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::Signal => "SIGNAL",
            ExitReason::MaxAge => "MAX_AGE",
        }
    }
}

/// 影子交易记录
///
/// 开仓后仅在 Open 状态下允许修改，平仓后不再变动。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowTrade {
    pub id: String,
    pub instrument: String,
    pub direction: Direction,
    pub confidence: f64,
    pub reasoning: String,
    /// 滑点调整后的开仓成交价
    pub entry_price: f64,
    /// 滑点调整后的平仓成交价
    pub exit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// 开仓名义价值（美元）
    pub size_usd: f64,
    pub leverage: u32,
    /// 开仓时的影子账户权益
    pub account_equity: f64,
    /// 净收益（扣除手续费与滑点后）
    pub pnl_usd: Option<f64>,
    /// 保证金口径的收益率（含杠杆，百分比）
    pub pnl_percent: Option<f64>,
    pub fees_usd: f64,
    /// 滑点成本：开仓腿在开仓时计入，平仓腿在平仓时累加
    pub slippage_usd: f64,
    pub status: TradeStatus,
    pub exit_reason: Option<ExitReason>,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
    pub duration_minutes: Option<f64>,
    /// 决策上下文快照（推理输入与原始输出的 JSON）
    pub decision_context: String,
}

impl ShadowTrade {
    /// 持仓数量（币本位）
    pub fn units(&self) -> f64 {
        self.size_usd / self.entry_price
    }
}

/// 影子账户状态 - 每个账户ID一份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowAccountState {
    pub account_id: String,
    pub initial_equity: f64,
    pub current_equity: f64,
    /// 毛收益累计（报价口径，不含费用与滑点）
    pub total_pnl: f64,
    pub total_fees: f64,
    pub total_slippage: f64,
    pub winning_trades: i64,
    pub losing_trades: i64,
}

impl ShadowAccountState {
    pub fn new(account_id: &str, seed_equity: f64) -> Self {
        Self {
            account_id: account_id.to_string(),
            initial_equity: seed_equity,
            current_equity: seed_equity,
            total_pnl: 0.0,
            total_fees: 0.0,
            total_slippage: 0.0,
            winning_trades: 0,
            losing_trades: 0,
        }
    }

    /// 结算恒等式校验
    pub fn invariant_holds(&self, tolerance: f64) -> bool {
        let expected =
            self.initial_equity + self.total_pnl - self.total_fees - self.total_slippage;
        (self.current_equity - expected).abs() <= tolerance
    }

    /// 显式重置（不会在其他任何路径上被隐式触发）
    pub fn reset(&mut self, seed_equity: f64) {
        *self = Self::new(&self.account_id, seed_equity);
    }
}

/// 开仓请求
#[derive(Debug, Clone)]
pub struct OpenTradeRequest {
    pub instrument: String,
    pub direction: Direction,
    pub confidence: f64,
    pub reasoning: String,
    /// 行情报价（未调整滑点）
    pub quote_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub size_usd: f64,
    pub leverage: u32,
    pub decision_context: String,
    pub now_ms: i64,
}

/// 影子账本：账户状态 + 该账户全部交易记录的唯一属主
#[derive(Debug)]
pub struct ShadowLedger {
    pub account: ShadowAccountState,
    open_trades: Vec<ShadowTrade>,
    closed_trades: Vec<ShadowTrade>,
}

impl ShadowLedger {
    pub fn new(account_id: &str, seed_equity: f64) -> Self {
        Self {
            account: ShadowAccountState::new(account_id, seed_equity),
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
        }
    }

    /// 从已持久化的账户状态恢复
    pub fn from_state(account: ShadowAccountState, open_trades: Vec<ShadowTrade>) -> Self {
        Self {
            account,
            open_trades,
            closed_trades: Vec::new(),
        }
    }

    pub fn open_trades(&self) -> &[ShadowTrade] {
        &self.open_trades
    }

    /// 最近一笔平仓交易（用于推理上下文）
    pub fn last_closed(&self) -> Option<&ShadowTrade> {
        self.closed_trades.last()
    }

    /// 当前占用的保证金（美元）
    pub fn open_margin(&self) -> f64 {
        self.open_trades
            .iter()
            .map(|t| t.size_usd / t.leverage.max(1) as f64)
            .sum()
    }

    /// 开仓：成交价按滑点逆向偏移（多头买贵、空头卖贱）
    pub fn open_trade(&mut self, req: OpenTradeRequest, slippage_rate: f64) -> ShadowTrade {
        let dir = req.direction.sign();
        let entry_fill = req.quote_price * (1.0 + dir * slippage_rate);
        let units = req.size_usd / entry_fill;
        // 开仓腿滑点成本先记在交易上，平仓结算时一并计入账户
        let entry_slippage = units * req.quote_price * slippage_rate;

        let trade = ShadowTrade {
            id: Uuid::new_v4().to_string(),
            instrument: req.instrument,
            direction: req.direction,
            confidence: req.confidence,
            reasoning: req.reasoning,
            entry_price: entry_fill,
            exit_price: None,
            stop_loss: req.stop_loss,
            take_profit: req.take_profit,
            size_usd: req.size_usd,
            leverage: req.leverage,
            account_equity: self.account.current_equity,
            pnl_usd: None,
            pnl_percent: None,
            fees_usd: 0.0,
            slippage_usd: entry_slippage,
            status: TradeStatus::Open,
            exit_reason: None,
            opened_at: req.now_ms,
            closed_at: None,
            duration_minutes: None,
            decision_context: req.decision_context,
        };
        self.open_trades.push(trade.clone());
        trade
    }

    /// 平仓并结算
    ///
    /// `quote_exit` 是触发价（止损/止盈阈值或市场价），
    /// 成交价同样按滑点逆向偏移。对已平仓的交易再次调用
    /// 返回状态错误且账户不发生任何变动。
    pub fn close_trade(
        &mut self,
        trade_id: &str,
        quote_exit: f64,
        reason: ExitReason,
        fee_rate: f64,
        slippage_rate: f64,
        now_ms: i64,
    ) -> Result<ShadowTrade, PipelineError> {
        let pos = match self.open_trades.iter().position(|t| t.id == trade_id) {
            Some(pos) => pos,
            None => {
                if self.closed_trades.iter().any(|t| t.id == trade_id) {
                    return Err(PipelineError::state(format!(
                        "trade {} already closed",
                        trade_id
                    )));
                }
                return Err(PipelineError::state(format!("unknown trade {}", trade_id)));
            }
        };

        let mut trade = self.open_trades.remove(pos);
        let dir = trade.direction.sign();
        let units = trade.units();

        let exit_fill = quote_exit * (1.0 - dir * slippage_rate);
        let exit_slippage = units * quote_exit * slippage_rate;
        // 往返费率按平仓时的名义价值一次性计提
        let fees = units * exit_fill * fee_rate;

        let price_pnl = units * (exit_fill - trade.entry_price) * dir;
        let net_pnl = price_pnl - fees;
        // 报价口径的毛收益 = 成交口径收益 + 双边滑点成本
        let gross_pnl = price_pnl + trade.slippage_usd + exit_slippage;

        trade.exit_price = Some(exit_fill);
        trade.pnl_usd = Some(net_pnl);
        trade.pnl_percent =
            Some(dir * (exit_fill - trade.entry_price) / trade.entry_price
                * trade.leverage as f64
                * 100.0);
        trade.fees_usd = fees;
        trade.slippage_usd += exit_slippage;
        trade.status = TradeStatus::Closed;
        trade.exit_reason = Some(reason);
        trade.closed_at = Some(now_ms);
        trade.duration_minutes = Some((now_ms - trade.opened_at) as f64 / 60_000.0);

        self.account.current_equity += net_pnl;
        self.account.total_pnl += gross_pnl;
        self.account.total_fees += fees;
        self.account.total_slippage += trade.slippage_usd;
        if net_pnl > 0.0 {
            self.account.winning_trades += 1;
        } else {
            self.account.losing_trades += 1;
        }

        self.closed_trades.push(trade.clone());
        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn open_request(quote: f64, size_usd: f64) -> OpenTradeRequest {
        OpenTradeRequest {
            instrument: "BTC-USDT-SWAP".to_string(),
            direction: Direction::Long,
            confidence: 0.7,
            reasoning: "test".to_string(),
            quote_price: quote,
            stop_loss: Some(quote * 0.98),
            take_profit: Some(quote * 1.05),
            size_usd,
            leverage: 10,
            decision_context: "{}".to_string(),
            now_ms: 0,
        }
    }

    #[test]
    fn test_entry_fill_is_adverse() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        let trade = ledger.open_trade(open_request(100.0, 100.0), 0.0001);
        assert_relative_eq!(trade.entry_price, 100.01, epsilon = 1e-12);

        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        let mut req = open_request(100.0, 100.0);
        req.direction = Direction::Short;
        let trade = ledger.open_trade(req, 0.0001);
        assert_relative_eq!(trade.entry_price, 99.99, epsilon = 1e-12);
    }

    #[test]
    fn test_close_settles_account_and_invariant_holds() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        // size 选成 100.01 美元，滑点调整后持仓恰好 1 个单位
        let trade = ledger.open_trade(open_request(100.0, 100.01), 0.0001);
        let closed = ledger
            .close_trade(&trade.id, 110.0, ExitReason::TakeProfit, 0.0006, 0.0001, 60_000)
            .unwrap();

        assert_relative_eq!(closed.exit_price.unwrap(), 109.989, epsilon = 1e-9);
        assert_relative_eq!(closed.fees_usd, 0.0659934, epsilon = 1e-9);
        assert_relative_eq!(closed.slippage_usd, 0.021, epsilon = 1e-9);
        assert_relative_eq!(closed.pnl_usd.unwrap(), 9.9130066, epsilon = 1e-9);

        assert_relative_eq!(ledger.account.total_pnl, 10.0, epsilon = 1e-9);
        assert_relative_eq!(ledger.account.current_equity, 1_009.9130066, epsilon = 1e-9);
        assert_eq!(ledger.account.winning_trades, 1);
        assert!(ledger.account.invariant_holds(1e-9));
    }

    #[test]
    fn test_double_close_is_state_error_and_account_unchanged() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        let trade = ledger.open_trade(open_request(100.0, 100.0), 0.0001);
        ledger
            .close_trade(&trade.id, 98.0, ExitReason::StopLoss, 0.0006, 0.0001, 0)
            .unwrap();
        let before = ledger.account.clone();

        let err = ledger
            .close_trade(&trade.id, 98.0, ExitReason::StopLoss, 0.0006, 0.0001, 0)
            .unwrap_err();
        assert!(matches!(err, PipelineError::State { .. }));
        assert_eq!(ledger.account.current_equity, before.current_equity);
        assert_eq!(ledger.account.losing_trades, before.losing_trades);
    }

    #[test]
    fn test_short_loss_counts_as_loss() {
        let mut ledger = ShadowLedger::new("acc", 1_000.0);
        let mut req = open_request(100.0, 100.0);
        req.direction = Direction::Short;
        req.stop_loss = Some(102.0);
        req.take_profit = Some(95.0);
        let trade = ledger.open_trade(req, 0.0001);
        let closed = ledger
            .close_trade(&trade.id, 102.0, ExitReason::StopLoss, 0.0006, 0.0001, 0)
            .unwrap();
        assert!(closed.pnl_usd.unwrap() < 0.0);
        assert_eq!(ledger.account.losing_trades, 1);
        assert!(ledger.account.invariant_holds(1e-9));
    }

    #[test]
    fn test_explicit_reset() {
        let mut state = ShadowAccountState::new("acc", 500.0);
        state.current_equity = 700.0;
        state.total_pnl = 200.0;
        state.reset(800.0);
        assert_eq!(state.initial_equity, 800.0);
        assert_eq!(state.current_equity, 800.0);
        assert_eq!(state.total_pnl, 0.0);
    }
}
