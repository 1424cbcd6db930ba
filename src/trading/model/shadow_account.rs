extern crate rbatis;

use rbatis::{crud, RBatis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_config::db;
use crate::trading::shadow::ledger::ShadowAccountState;

/// table: shadow_account（每个账户ID一行，保存最新状态）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowAccountEntity {
    pub account_id: String,
    pub initial_equity: f64,
    pub current_equity: f64,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub total_slippage: f64,
    pub winning_trades: i64,
    pub losing_trades: i64,
}
crud!(ShadowAccountEntity {}, "shadow_account");

impl From<&ShadowAccountState> for ShadowAccountEntity {
    fn from(state: &ShadowAccountState) -> Self {
        Self {
            account_id: state.account_id.clone(),
            initial_equity: state.initial_equity,
            current_equity: state.current_equity,
            total_pnl: state.total_pnl,
            total_fees: state.total_fees,
            total_slippage: state.total_slippage,
            winning_trades: state.winning_trades,
            losing_trades: state.losing_trades,
        }
    }
}

impl ShadowAccountEntity {
    pub fn into_state(self) -> ShadowAccountState {
        ShadowAccountState {
            account_id: self.account_id,
            initial_equity: self.initial_equity,
            current_equity: self.current_equity,
            total_pnl: self.total_pnl,
            total_fees: self.total_fees,
            total_slippage: self.total_slippage,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
        }
    }
}

pub struct ShadowAccountModel {
    db: &'static RBatis,
}

impl ShadowAccountModel {
    pub async fn new() -> Self {
        Self {
            db: db::get_db_client(),
        }
    }

    pub async fn get_by_account_id(
        &self,
        account_id: &str,
    ) -> anyhow::Result<Option<ShadowAccountEntity>> {
        let list =
            ShadowAccountEntity::select_by_column(self.db, "account_id", account_id).await?;
        Ok(list.into_iter().next())
    }

    /// 插入或更新账户最新状态
    pub async fn upsert(&self, entity: &ShadowAccountEntity) -> anyhow::Result<u64> {
        let sql = r#"
            INSERT INTO shadow_account
                (account_id, initial_equity, current_equity, total_pnl, total_fees,
                 total_slippage, winning_trades, losing_trades)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                current_equity = VALUES(current_equity),
                total_pnl = VALUES(total_pnl),
                total_fees = VALUES(total_fees),
                total_slippage = VALUES(total_slippage),
                winning_trades = VALUES(winning_trades),
                losing_trades = VALUES(losing_trades)
        "#;
        let params = vec![
            rbs::to_value!(entity.account_id.clone()),
            rbs::to_value!(entity.initial_equity),
            rbs::to_value!(entity.current_equity),
            rbs::to_value!(entity.total_pnl),
            rbs::to_value!(entity.total_fees),
            rbs::to_value!(entity.total_slippage),
            rbs::to_value!(entity.winning_trades),
            rbs::to_value!(entity.losing_trades),
        ];
        let result = self.db.exec(sql, params).await?;
        debug!("upsert shadow_account rows_affected = {}", result.rows_affected);
        Ok(result.rows_affected)
    }
}
