//! 影子账本持久化接口
//!
//! 仓储抽象：运行时账本在内存中结算，结果透写到存储。
//! MySQL 实现用于生产，内存实现用于纸面模式与测试。

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::trading::model::optimization_example::{
    OptimizationExampleEntity, OptimizationExampleModel,
};
use crate::trading::model::shadow_account::{ShadowAccountEntity, ShadowAccountModel};
use crate::trading::model::shadow_trade::{ShadowTradeEntity, ShadowTradeModel};
use crate::trading::shadow::ledger::{ShadowAccountState, ShadowTrade};

/// 影子账本仓储接口
#[async_trait]
pub trait ShadowStore: Send + Sync {
    /// 读取账户最新状态（不存在返回 None）
    async fn load_account(&self, account_id: &str) -> Result<Option<ShadowAccountState>>;

    /// 写入账户最新状态
    async fn save_account(&self, state: &ShadowAccountState) -> Result<()>;

    /// 读取未平仓记录（进程重启后恢复账本）
    async fn load_open_trades(&self, account_id: &str) -> Result<Vec<ShadowTrade>>;

    /// 新开仓记录
    async fn insert_trade(&self, account_id: &str, trade: &ShadowTrade) -> Result<()>;

    /// 平仓结算更新
    async fn update_trade(&self, account_id: &str, trade: &ShadowTrade) -> Result<()>;

    /// 追加优化样本（只追加）
    async fn insert_example(&self, example: &OptimizationExampleEntity) -> Result<()>;
}

/// MySQL 仓储实现
pub struct MysqlShadowStore;

#[async_trait]
impl ShadowStore for MysqlShadowStore {
    async fn load_account(&self, account_id: &str) -> Result<Option<ShadowAccountState>> {
        let entity = ShadowAccountModel::new()
            .await
            .get_by_account_id(account_id)
            .await?;
        Ok(entity.map(|e| e.into_state()))
    }

    async fn save_account(&self, state: &ShadowAccountState) -> Result<()> {
        ShadowAccountModel::new()
            .await
            .upsert(&ShadowAccountEntity::from(state))
            .await?;
        Ok(())
    }

    async fn load_open_trades(&self, account_id: &str) -> Result<Vec<ShadowTrade>> {
        let entities = ShadowTradeModel::new()
            .await
            .get_open_by_account(account_id)
            .await?;
        Ok(entities
            .into_iter()
            .filter_map(|e| e.into_trade())
            .collect())
    }

    async fn insert_trade(&self, account_id: &str, trade: &ShadowTrade) -> Result<()> {
        ShadowTradeModel::new()
            .await
            .add(&ShadowTradeEntity::from_trade(trade, account_id))
            .await?;
        Ok(())
    }

    async fn update_trade(&self, account_id: &str, trade: &ShadowTrade) -> Result<()> {
        ShadowTradeModel::new()
            .await
            .update_close(&ShadowTradeEntity::from_trade(trade, account_id))
            .await?;
        Ok(())
    }

    async fn insert_example(&self, example: &OptimizationExampleEntity) -> Result<()> {
        OptimizationExampleModel::new().await.add(example).await?;
        Ok(())
    }
}

/// 内存仓储实现（纸面模式与测试）
#[derive(Default)]
pub struct MemoryShadowStore {
    accounts: Mutex<HashMap<String, ShadowAccountState>>,
    trades: Mutex<HashMap<String, ShadowTrade>>,
    examples: Mutex<Vec<OptimizationExampleEntity>>,
}

impl MemoryShadowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trade_count(&self) -> usize {
        self.trades.lock().await.len()
    }

    pub async fn example_count(&self) -> usize {
        self.examples.lock().await.len()
    }

    pub async fn closed_trades(&self) -> Vec<ShadowTrade> {
        self.trades
            .lock()
            .await
            .values()
            .filter(|t| t.pnl_usd.is_some())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ShadowStore for MemoryShadowStore {
    async fn load_account(&self, account_id: &str) -> Result<Option<ShadowAccountState>> {
        Ok(self.accounts.lock().await.get(account_id).cloned())
    }

    async fn save_account(&self, state: &ShadowAccountState) -> Result<()> {
        self.accounts
            .lock()
            .await
            .insert(state.account_id.clone(), state.clone());
        Ok(())
    }

    async fn load_open_trades(&self, _account_id: &str) -> Result<Vec<ShadowTrade>> {
        Ok(self
            .trades
            .lock()
            .await
            .values()
            .filter(|t| t.pnl_usd.is_none())
            .cloned()
            .collect())
    }

    async fn insert_trade(&self, _account_id: &str, trade: &ShadowTrade) -> Result<()> {
        self.trades
            .lock()
            .await
            .insert(trade.id.clone(), trade.clone());
        Ok(())
    }

    async fn update_trade(&self, _account_id: &str, trade: &ShadowTrade) -> Result<()> {
        self.trades
            .lock()
            .await
            .insert(trade.id.clone(), trade.clone());
        Ok(())
    }

    async fn insert_example(&self, example: &OptimizationExampleEntity) -> Result<()> {
        self.examples.lock().await.push(example.clone());
        Ok(())
    }
}
