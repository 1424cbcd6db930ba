extern crate rbatis;

use rbatis::{crud, impl_select, RBatis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app_config::db;
use crate::trading::shadow::ledger::{ShadowTrade, TradeStatus};

/// table: shadow_trade
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowTradeEntity {
    pub trade_id: String,
    pub account_id: String,
    pub instrument: String,
    pub direction: String,
    pub confidence: f64,
    pub reasoning: String,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub size_usd: f64,
    pub leverage: i32,
    pub account_equity: f64,
    pub pnl_usd: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub fees_usd: f64,
    pub slippage_usd: f64,
    pub status: String,
    pub exit_reason: Option<String>,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
    pub duration_minutes: Option<f64>,
    pub decision_context: String,
}
crud!(ShadowTradeEntity {}, "shadow_trade");

impl_select!(ShadowTradeEntity{select_open_by_account(account_id: &str) =>
    "`where account_id = #{account_id} and status = 'OPEN'`"}, "shadow_trade");

impl ShadowTradeEntity {
    pub fn from_trade(trade: &ShadowTrade, account_id: &str) -> Self {
        Self {
            trade_id: trade.id.clone(),
            account_id: account_id.to_string(),
            instrument: trade.instrument.clone(),
            direction: trade.direction.as_str().to_string(),
            confidence: trade.confidence,
            reasoning: trade.reasoning.clone(),
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            size_usd: trade.size_usd,
            leverage: trade.leverage as i32,
            account_equity: trade.account_equity,
            pnl_usd: trade.pnl_usd,
            pnl_percent: trade.pnl_percent,
            fees_usd: trade.fees_usd,
            slippage_usd: trade.slippage_usd,
            status: match trade.status {
                TradeStatus::Open => "OPEN".to_string(),
                TradeStatus::Closed => "CLOSED".to_string(),
            },
            exit_reason: trade.exit_reason.map(|r| r.as_str().to_string()),
            opened_at: trade.opened_at,
            closed_at: trade.closed_at,
            duration_minutes: trade.duration_minutes,
            decision_context: trade.decision_context.clone(),
        }
    }
}

impl ShadowTradeEntity {
    /// 反序列化为运行时交易（字段非法时返回 None）
    pub fn into_trade(self) -> Option<ShadowTrade> {
        use crate::trading::shadow::ledger::ExitReason;
        use crate::trading::signal::Direction;

        let direction = match self.direction.as_str() {
            "LONG" => Direction::Long,
            "SHORT" => Direction::Short,
            "FLAT" => Direction::Flat,
            _ => return None,
        };
        let status = match self.status.as_str() {
            "OPEN" => TradeStatus::Open,
            "CLOSED" => TradeStatus::Closed,
            _ => return None,
        };
        let exit_reason = match self.exit_reason.as_deref() {
            None => None,
            Some("STOP_LOSS") => Some(ExitReason::StopLoss),
            Some("TAKE_PROFIT") => Some(ExitReason::TakeProfit),
            Some("SIGNAL") => Some(ExitReason::Signal),
            Some("MAX_AGE") => Some(ExitReason::MaxAge),
            Some(_) => return None,
        };

        Some(ShadowTrade {
            id: self.trade_id,
            instrument: self.instrument,
            direction,
            confidence: self.confidence,
            reasoning: self.reasoning,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            size_usd: self.size_usd,
            leverage: self.leverage.max(1) as u32,
            account_equity: self.account_equity,
            pnl_usd: self.pnl_usd,
            pnl_percent: self.pnl_percent,
            fees_usd: self.fees_usd,
            slippage_usd: self.slippage_usd,
            status,
            exit_reason,
            opened_at: self.opened_at,
            closed_at: self.closed_at,
            duration_minutes: self.duration_minutes,
            decision_context: self.decision_context,
        })
    }
}

pub struct ShadowTradeModel {
    db: &'static RBatis,
}

impl ShadowTradeModel {
    pub async fn new() -> Self {
        Self {
            db: db::get_db_client(),
        }
    }

    pub async fn add(&self, entity: &ShadowTradeEntity) -> anyhow::Result<u64> {
        let result = ShadowTradeEntity::insert(self.db, entity).await?;
        debug!("insert shadow_trade rows_affected = {}", result.rows_affected);
        Ok(result.rows_affected)
    }

    /// 平仓后更新结算结果（只允许对仍为 OPEN 的行生效）
    pub async fn update_close(&self, entity: &ShadowTradeEntity) -> anyhow::Result<u64> {
        let sql = r#"
            UPDATE shadow_trade
            SET exit_price = ?,
                pnl_usd = ?,
                pnl_percent = ?,
                fees_usd = ?,
                slippage_usd = ?,
                status = ?,
                exit_reason = ?,
                closed_at = ?,
                duration_minutes = ?
            WHERE trade_id = ? AND status = 'OPEN'
        "#;
        let params = vec![
            rbs::to_value!(entity.exit_price),
            rbs::to_value!(entity.pnl_usd),
            rbs::to_value!(entity.pnl_percent),
            rbs::to_value!(entity.fees_usd),
            rbs::to_value!(entity.slippage_usd),
            rbs::to_value!(entity.status.clone()),
            rbs::to_value!(entity.exit_reason.clone()),
            rbs::to_value!(entity.closed_at),
            rbs::to_value!(entity.duration_minutes),
            rbs::to_value!(entity.trade_id.clone()),
        ];
        let result = self.db.exec(sql, params).await?;
        if result.rows_affected == 0 {
            warn!("update_close affected no rows, trade_id = {}", entity.trade_id);
        }
        Ok(result.rows_affected)
    }

    pub async fn get_open_by_account(
        &self,
        account_id: &str,
    ) -> anyhow::Result<Vec<ShadowTradeEntity>> {
        let list = ShadowTradeEntity::select_open_by_account(self.db, account_id).await?;
        Ok(list)
    }
}
