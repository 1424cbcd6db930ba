extern crate rbatis;

use rbatis::{crud, RBatis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_config::db;
use crate::trading::shadow::ledger::ShadowTrade;

/// table: optimization_example（只追加，从不修改）
///
/// 达到收益阈值的平仓交易会被复制为一条优化样本，
/// 供外部的提示词/策略优化器作为训练数据使用。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizationExampleEntity {
    pub trade_id: String,
    pub input_market_structure: String,
    pub input_risk_env: String,
    /// 成功计划的完整 JSON（作为标注）
    pub gold_plan_json: String,
    /// 净收益评分
    pub score: f64,
    pub created_at: i64,
}
crud!(OptimizationExampleEntity {}, "optimization_example");

impl OptimizationExampleEntity {
    /// 从平仓交易构造样本：决策上下文快照中拆出输入与输出
    pub fn from_closed_trade(trade: &ShadowTrade, now_ms: i64) -> Option<Self> {
        let score = trade.pnl_usd?;
        let context: serde_json::Value = serde_json::from_str(&trade.decision_context).ok()?;
        let inputs = context.get("inputs")?;
        let output = context.get("output")?;

        Some(Self {
            trade_id: trade.id.clone(),
            input_market_structure: inputs
                .get("market_structure")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            input_risk_env: inputs
                .get("risk_environment")
                .and_then(|v| v.as_str())
                .unwrap_or("N/A")
                .to_string(),
            gold_plan_json: output.to_string(),
            score,
            created_at: now_ms,
        })
    }
}

pub struct OptimizationExampleModel {
    db: &'static RBatis,
}

impl OptimizationExampleModel {
    pub async fn new() -> Self {
        Self {
            db: db::get_db_client(),
        }
    }

    pub async fn add(&self, entity: &OptimizationExampleEntity) -> anyhow::Result<u64> {
        let result = OptimizationExampleEntity::insert(self.db, entity).await?;
        debug!(
            "insert optimization_example rows_affected = {}",
            result.rows_affected
        );
        Ok(result.rows_affected)
    }
}
