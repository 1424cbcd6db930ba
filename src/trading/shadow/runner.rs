//! 影子周期编排器
//!
//! 每个决策周期结束后，实盘路径把本周期的行情快照交给编排器，
//! 编排器在后台任务中完成：结算 -> 推理(带断言重试) -> 规范化 ->
//! 风控 -> 开仓/平仓 -> 持久化与通知。
//!
//! 同一账户的账本由互斥锁串行化：迟到的旧周期任务会等待锁，
//! 而不是覆盖并发周期的进度。第 N 周期的任务拿到的永远是
//! 第 N 周期捕获的快照。

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::trading::inference::{infer_with_assertions, PromptContext, SignalProvider};
use crate::trading::market::{MarketSnapshot, TrendClass};
use crate::trading::model::optimization_example::OptimizationExampleEntity;
use crate::trading::model::shadow_store::ShadowStore;
use crate::trading::risk::{AccountSnapshot, RiskEngine};
use crate::trading::services::notify::{Notifier, Severity, ShadowCloseEvent, ShadowOpenEvent};
use crate::trading::shadow::ledger::{OpenTradeRequest, ShadowLedger, ShadowTrade};
use crate::trading::shadow::simulator::ShadowSimulator;
use crate::trading::signal::{normalize, Direction};

/// 影子周期输入 - 实盘周期结束时捕获的不可变快照
#[derive(Debug, Clone)]
pub struct ShadowCycleContext {
    pub snapshot: MarketSnapshot,
    /// 实盘账户权益（仅用于首次播种影子账户）
    pub real_equity: f64,
    pub cycle: u64,
}

/// 影子编排器
///
/// 所有共享成员都包在 Arc 里，克隆即是新句柄，可直接带进后台任务。
#[derive(Clone)]
pub struct ShadowRunner {
    /// 账户ID -> 账本句柄；互斥锁保证同一账户的结算互不交错
    ledgers: Arc<DashMap<String, Arc<Mutex<ShadowLedger>>>>,
    simulator: Arc<ShadowSimulator>,
    risk: Arc<RiskEngine>,
    provider: Arc<dyn SignalProvider>,
    store: Arc<dyn ShadowStore>,
    notifier: Arc<dyn Notifier>,
    /// 在飞的周期任务，停机时统一收尾
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ShadowRunner {
    pub fn new(
        simulator: ShadowSimulator,
        risk: RiskEngine,
        provider: Arc<dyn SignalProvider>,
        store: Arc<dyn ShadowStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledgers: Arc::new(DashMap::new()),
            simulator: Arc::new(simulator),
            risk: Arc::new(risk),
            provider,
            store,
            notifier,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 以后台任务运行一个影子周期（不阻塞实盘路径）
    pub async fn spawn_cycle(&self, ctx: ShadowCycleContext) {
        let runner = self.clone();
        let cycle = ctx.cycle;
        let handle = tokio::spawn(async move {
            if let Err(e) = runner.run_cycle(ctx).await {
                runner
                    .notifier
                    .cycle_alert(Severity::Error, &format!("shadow cycle {} failed: {}", cycle, e))
                    .await;
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// 停机收尾：等待在飞任务跑完（任务内部不会留下半成品交易）
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };
        join_all(handles).await;
        info!("shadow runner drained");
    }

    /// 懒创建账本：优先从存储恢复，否则用实盘权益播种
    async fn ledger_handle(&self, seed_equity: f64) -> Result<Arc<Mutex<ShadowLedger>>> {
        let account_id = self.simulator.params().account_id.clone();
        if let Some(handle) = self.ledgers.get(&account_id) {
            return Ok(handle.clone());
        }

        let ledger = match self.store.load_account(&account_id).await? {
            Some(state) => {
                let open_trades = self.store.load_open_trades(&account_id).await?;
                info!(
                    "shadow account restored: equity {:.2}, {} open trades",
                    state.current_equity,
                    open_trades.len()
                );
                ShadowLedger::from_state(state, open_trades)
            }
            None => {
                info!("shadow account seeded from real equity {:.2}", seed_equity);
                let ledger = ShadowLedger::new(&account_id, seed_equity);
                self.store.save_account(&ledger.account).await?;
                ledger
            }
        };

        // 并发首轮可能同时走到这里，entry 去重保证只保留一份账本
        let handle = self
            .ledgers
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(ledger)))
            .clone();
        Ok(handle)
    }

    async fn run_cycle(&self, ctx: ShadowCycleContext) -> Result<()> {
        let handle = self.ledger_handle(ctx.real_equity).await?;
        let mut ledger = handle.lock().await;
        let now_ms = ctx.snapshot.ts;
        let instrument = ctx.snapshot.instrument.clone();

        // 1. 结算：先对上一轮持仓按本周期价格做止盈止损检查
        if let Some(price) = ctx.snapshot.latest_price() {
            let closed = self.simulator.settle(&mut ledger, &instrument, price, now_ms);
            self.flush_closed(&ledger, &closed, now_ms).await;
        } else {
            warn!("shadow cycle {}: no market price, skip settlement", ctx.cycle);
        }

        // 2. 推理（带断言重试），失败则跳过本周期，不产生半成品交易
        let prompt_ctx = build_prompt_context(&ledger, &ctx.snapshot);
        let raw = match infer_with_assertions(
            self.provider.as_ref(),
            prompt_ctx.clone(),
            ctx.snapshot.trend,
            self.risk.params().bear_trend_confidence_override,
            self.simulator.params().retry_limit,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                self.notifier
                    .cycle_alert(
                        Severity::Warning,
                        &format!("shadow cycle {} skipped: {}", ctx.cycle, e),
                    )
                    .await;
                return Ok(());
            }
        };
        let decision_context = json!({"inputs": prompt_ctx, "output": raw}).to_string();

        // 3. 规范化
        let signal = match normalize(raw, &ctx.snapshot) {
            Ok(signal) => signal,
            Err(e) => {
                self.notifier
                    .cycle_alert(
                        Severity::Warning,
                        &format!("shadow cycle {} rejected signal: {}", ctx.cycle, e),
                    )
                    .await;
                return Ok(());
            }
        };

        // 4. 平仓信号：高确定性的 Flat 关掉该产品全部持仓，低确定性视为观望
        if signal.direction == Direction::Flat {
            if signal.confidence > 0.5 {
                if let Some(price) = ctx.snapshot.latest_price() {
                    let closed = self.simulator.close_all(&mut ledger, &instrument, price, now_ms);
                    self.flush_closed(&ledger, &closed, now_ms).await;
                }
            }
            return Ok(());
        }

        // 5. 影子账户口径的风控（与实盘同一引擎）
        let account = AccountSnapshot {
            equity: ledger.account.current_equity,
            open_exposure_usd: ledger.open_margin(),
            trend: ctx.snapshot.trend,
        };
        let decision = self.risk.evaluate(&signal, &account);
        if !decision.approved {
            self.notifier
                .cycle_alert(
                    Severity::Info,
                    &format!(
                        "shadow cycle {}: risk rejected ({})",
                        ctx.cycle,
                        decision.rejection_reason.as_deref().unwrap_or("unknown")
                    ),
                )
                .await;
            return Ok(());
        }

        // 6. 开仓（规模按影子权益计算，与交易所完全隔离）
        let quote_price = match signal.entry_hint.or(ctx.snapshot.latest_price()) {
            Some(price) => price,
            None => return Ok(()),
        };
        let size_usd =
            account.equity * decision.position_size_fraction * decision.max_leverage as f64;
        let trade = ledger.open_trade(
            OpenTradeRequest {
                instrument: signal.instrument.clone(),
                direction: signal.direction,
                confidence: signal.confidence,
                reasoning: signal.reasoning.clone(),
                quote_price,
                stop_loss: Some(decision.stop_loss_price),
                take_profit: Some(decision.take_profit_price),
                size_usd,
                leverage: decision.max_leverage,
                decision_context,
                now_ms,
            },
            self.simulator.params().slippage_rate,
        );

        let account_id = &ledger.account.account_id;
        if let Err(e) = self.store.insert_trade(account_id, &trade).await {
            warn!("persist shadow trade failed: {}", e);
        }
        self.notifier
            .shadow_trade_opened(&ShadowOpenEvent {
                instrument: trade.instrument.clone(),
                side: trade.direction.as_str().to_string(),
                confidence: trade.confidence,
                entry_price: trade.entry_price,
                stop_loss: trade.stop_loss,
                take_profit: trade.take_profit,
                account_equity: ledger.account.current_equity,
                open_position_count: ledger.open_trades().len(),
            })
            .await;

        Ok(())
    }

    /// 平仓结果落库、通知，并按阈值保留优化样本
    async fn flush_closed(&self, ledger: &ShadowLedger, closed: &[ShadowTrade], now_ms: i64) {
        if closed.is_empty() {
            return;
        }

        let account_id = &ledger.account.account_id;
        for trade in closed {
            if let Err(e) = self.store.update_trade(account_id, trade).await {
                warn!("persist closed shadow trade failed: {}", e);
            }

            self.notifier
                .shadow_trade_closed(&ShadowCloseEvent {
                    instrument: trade.instrument.clone(),
                    side: trade.direction.as_str().to_string(),
                    entry_price: trade.entry_price,
                    exit_price: trade.exit_price.unwrap_or(0.0),
                    pnl_usd: trade.pnl_usd.unwrap_or(0.0),
                    fees_usd: trade.fees_usd,
                    exit_reason: trade
                        .exit_reason
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_default(),
                    updated_equity: ledger.account.current_equity,
                })
                .await;

            // 只追加：源交易本身不再变动
            let threshold = self.simulator.params().optimization_example_pnl_threshold;
            if trade.pnl_usd.unwrap_or(f64::MIN) > threshold {
                if let Some(example) = OptimizationExampleEntity::from_closed_trade(trade, now_ms) {
                    if let Err(e) = self.store.insert_example(&example).await {
                        warn!("persist optimization example failed: {}", e);
                    }
                }
            }
        }

        if let Err(e) = self.store.save_account(&ledger.account).await {
            warn!("persist shadow account failed: {}", e);
        }
    }
}

/// 拼装推理上下文：影子持仓与最近一笔平仓结果回注给模型
fn build_prompt_context(ledger: &ShadowLedger, snapshot: &MarketSnapshot) -> PromptContext {
    let open_trades = ledger.open_trades();
    let open_context = if open_trades.is_empty() {
        "NO OPEN POSITIONS.".to_string()
    } else {
        let details: Vec<String> = open_trades
            .iter()
            .map(|t| {
                format!(
                    "{} ({} @ ${:.2})",
                    t.instrument,
                    t.direction.as_str(),
                    t.entry_price
                )
            })
            .collect();
        format!("OPEN POSITIONS ({}): {}", open_trades.len(), details.join(", "))
    };

    let last_trade_outcome = match ledger.last_closed() {
        Some(trade) => {
            let pnl = trade.pnl_usd.unwrap_or(0.0);
            let outcome = if pnl > 0.0 { "WIN" } else { "LOSS" };
            format!(
                "LAST TRADE: {} {} -> {} (${:+.2})",
                trade.instrument,
                trade.direction.as_str(),
                outcome,
                pnl
            )
        }
        None => "NO TRADE HISTORY.".to_string(),
    };

    let risk_environment = match snapshot.trend {
        TrendClass::Bull => "BULL_TREND",
        TrendClass::Bear => "BEAR_TREND",
        TrendClass::Range => "RANGE",
    };

    PromptContext {
        instrument: snapshot.instrument.clone(),
        market_structure: snapshot.structure_digest("1H", 12),
        risk_environment: risk_environment.to_string(),
        account_context: format!(
            "Shadow Equity: ${:.2} | {}",
            ledger.account.current_equity, open_context
        ),
        last_trade_outcome,
        amendments: Vec::new(),
    }
}
