//! 决策周期任务
//!
//! 实盘主管线：规范化 -> 风控 -> 订单合成 -> 执行协作方。
//! 周期收尾时把同一份快照交给影子编排器，在后台并行推进影子账本。

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::app_config;
use crate::trading::inference::{PromptContext, SignalProvider};
use crate::trading::market::{MarketSnapshot, TrendClass};
use crate::trading::model::risk_audit_log::{RiskAuditLogEntity, RiskAuditLogModel};
use crate::trading::order::{synthesize_order, OrderExecutor, OrderSpec};
use crate::trading::risk::{AccountSnapshot, RiskEngine};
use crate::trading::services::notify::{Notifier, Severity};
use crate::trading::shadow::{ShadowCycleContext, ShadowRunner};
use crate::trading::signal::{normalize, Direction};

/// 实盘周期依赖
pub struct CycleDeps {
    pub risk: RiskEngine,
    pub provider: Arc<dyn SignalProvider>,
    pub executor: Arc<dyn OrderExecutor>,
    pub notifier: Arc<dyn Notifier>,
    pub shadow: ShadowRunner,
}

/// 单周期结果
#[derive(Debug)]
pub enum CycleOutcome {
    /// 已提交订单
    Executed(OrderSpec),
    /// 风控拒绝（一等结果，不是错误）
    Rejected(String),
    /// 平仓信号已转发
    ClosedAll,
    /// 本周期跳过（校验/断言/不变量失败）
    Skipped(String),
}

/// 运行一个实盘决策周期
///
/// 任何失败都收敛在本周期内：记录、通知，然后返回，不向调度循环抛出。
pub async fn run_decision_cycle(
    deps: &CycleDeps,
    snapshot: MarketSnapshot,
    account: AccountSnapshot,
    cycle: u64,
) -> Result<CycleOutcome> {
    info!(
        "cycle {} start: {} last={:.2} trend={:?} equity={:.2}",
        cycle, snapshot.instrument, snapshot.last_price, snapshot.trend, account.equity
    );

    let outcome = live_path(deps, &snapshot, &account, cycle).await;

    // 影子路径拿到的是本周期的快照，即使它比下一个实盘周期晚结束
    deps.shadow
        .spawn_cycle(ShadowCycleContext {
            snapshot,
            real_equity: account.equity,
            cycle,
        })
        .await;

    outcome
}

async fn live_path(
    deps: &CycleDeps,
    snapshot: &MarketSnapshot,
    account: &AccountSnapshot,
    cycle: u64,
) -> Result<CycleOutcome> {
    // 1. 推理协作方给出原始信号
    let prompt_ctx = live_prompt_context(snapshot, account);
    let raw = match deps.provider.infer(&prompt_ctx).await {
        Ok(raw) => raw,
        Err(e) => {
            deps.notifier
                .cycle_alert(Severity::Warning, &format!("cycle {}: inference failed: {}", cycle, e))
                .await;
            return Ok(CycleOutcome::Skipped(format!("inference failed: {}", e)));
        }
    };

    // 2. 规范化
    let signal = match normalize(raw, snapshot) {
        Ok(signal) => signal,
        Err(e) => {
            deps.notifier
                .cycle_alert(Severity::Warning, &format!("cycle {}: {}", cycle, e))
                .await;
            return Ok(CycleOutcome::Skipped(e.to_string()));
        }
    };

    // 3. 平仓信号直接转发执行协作方
    if signal.direction == Direction::Flat {
        if signal.confidence > 0.5 {
            deps.executor.close_all(&signal.instrument).await?;
            return Ok(CycleOutcome::ClosedAll);
        }
        return Ok(CycleOutcome::Rejected("no_trade_signal".to_string()));
    }

    // 4. 风控评估 + 审计落库（每周期追加一行）
    let decision = deps.risk.evaluate(&signal, account);
    if app_config::db::db_is_ready() {
        let entity = RiskAuditLogEntity::from_decision(cycle, &signal, &decision, snapshot.ts);
        if let Err(e) = RiskAuditLogModel::new().await.add(&entity).await {
            debug!("risk audit insert failed: {}", e);
        }
    }

    if !decision.approved {
        let reason = decision
            .rejection_reason
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        deps.notifier
            .cycle_alert(Severity::Info, &format!("cycle {}: risk rejected ({})", cycle, reason))
            .await;
        return Ok(CycleOutcome::Rejected(reason));
    }

    // 5. 订单合成，不变量失败时终止本周期，不提交任何订单
    let order = match synthesize_order(
        &signal,
        &decision,
        account,
        snapshot.last_price,
        deps.risk.params(),
    ) {
        Ok(order) => order,
        Err(e) => {
            deps.notifier
                .cycle_alert(Severity::Error, &format!("cycle {}: {}", cycle, e))
                .await;
            return Ok(CycleOutcome::Skipped(e.to_string()));
        }
    };

    // 6. 提交执行
    deps.executor.place_order(&order).await?;
    info!(
        "cycle {} executed: {} {} size={:.2} lev={}",
        cycle,
        order.instrument,
        order.side.as_str(),
        order.size,
        order.leverage
    );
    Ok(CycleOutcome::Executed(order))
}

fn live_prompt_context(snapshot: &MarketSnapshot, account: &AccountSnapshot) -> PromptContext {
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
            "Equity: ${:.2} | Margin Used: ${:.2}",
            account.equity, account.open_exposure_usd
        ),
        last_trade_outcome: "N/A".to_string(),
        amendments: Vec::new(),
    }
}
