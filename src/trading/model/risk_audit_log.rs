extern crate rbatis;

use rbatis::{crud, RBatis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_config::db;
use crate::trading::risk::RiskDecision;
use crate::trading::signal::TradeSignal;

/// table: risk_audit_log（实盘侧审计，每个周期追加一行）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskAuditLogEntity {
    pub cycle: i64,
    pub instrument: String,
    pub direction: String,
    pub confidence: f64,
    pub approved: bool,
    pub rejection_reason: Option<String>,
    pub leverage: i32,
    pub position_size_fraction: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub ts: i64,
}
crud!(RiskAuditLogEntity {}, "risk_audit_log");

impl RiskAuditLogEntity {
    pub fn from_decision(
        cycle: u64,
        signal: &TradeSignal,
        decision: &RiskDecision,
        ts: i64,
    ) -> Self {
        Self {
            cycle: cycle as i64,
            instrument: signal.instrument.clone(),
            direction: signal.direction.as_str().to_string(),
            confidence: signal.confidence,
            approved: decision.approved,
            rejection_reason: decision.rejection_reason.clone(),
            leverage: decision.max_leverage as i32,
            position_size_fraction: decision.position_size_fraction,
            stop_loss_price: decision.stop_loss_price,
            take_profit_price: decision.take_profit_price,
            ts,
        }
    }
}

pub struct RiskAuditLogModel {
    db: &'static RBatis,
}

impl RiskAuditLogModel {
    pub async fn new() -> Self {
        Self {
            db: db::get_db_client(),
        }
    }

    pub async fn add(&self, entity: &RiskAuditLogEntity) -> anyhow::Result<u64> {
        let result = RiskAuditLogEntity::insert(self.db, entity).await?;
        debug!("insert risk_audit_log rows_affected = {}", result.rows_affected);
        Ok(result.rows_affected)
    }
}
