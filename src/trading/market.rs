//! 行情快照类型
//!
//! 行情获取由外部分析协作方完成，这里只定义入站接口：
//! 每个决策周期收到一份不可变快照（最新价、多周期K线、趋势分类）。

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 趋势分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendClass {
    /// 多头趋势
    Bull,
    /// 空头趋势
    Bear,
    /// 震荡
    Range,
}

/// K线
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleBar {
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
    pub ts: i64,
}

/// 单产品行情快照 - 不可变
///
/// 同一周期内实盘路径和影子路径读取的是同一份快照，
/// 两条路径之间不共享任何可变状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// 产品ID
    pub instrument: String,
    /// 最新成交价
    pub last_price: f64,
    /// 多周期K线（周期 -> 序列）
    pub candles: HashMap<String, Vec<CandleBar>>,
    /// 趋势分类
    pub trend: TrendClass,
    /// 快照时间戳（毫秒）
    pub ts: i64,
}

impl MarketSnapshot {
    /// 最新价（无效价格返回 None）
    pub fn latest_price(&self) -> Option<f64> {
        if self.last_price > 0.0 && self.last_price.is_finite() {
            Some(self.last_price)
        } else {
            None
        }
    }

    /// 摘要最近的K线结构，用于拼装推理上下文
    pub fn structure_digest(&self, period: &str, bars: usize) -> String {
        match self.candles.get(period) {
            Some(series) if !series.is_empty() => {
                let tail: Vec<String> = series
                    .iter()
                    .rev()
                    .take(bars)
                    .rev()
                    .map(|b| format!("o:{} h:{} l:{} c:{}", b.o, b.h, b.l, b.c))
                    .collect();
                format!("{} {}", period, tail.join(" | "))
            }
            _ => "Neutral structure".to_string(),
        }
    }
}

/// 行情来源接口（外部协作方）
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_snapshot(&self, instrument: &str) -> Result<MarketSnapshot>;
}

/// 基于公共 Ticker 接口的轻量行情来源
///
/// 只取最新价，K线与趋势分类留给完整的分析服务。
pub struct HttpTickerSource {
    client: reqwest::Client,
}

#[derive(serde::Deserialize)]
struct TickerResponse {
    data: Vec<TickerData>,
}

#[derive(serde::Deserialize)]
struct TickerData {
    last: String,
}

impl HttpTickerSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTickerSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for HttpTickerSource {
    async fn fetch_snapshot(&self, instrument: &str) -> Result<MarketSnapshot> {
        let url = format!(
            "https://www.okx.com/api/v5/market/ticker?instId={}",
            instrument
        );
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let data: TickerResponse = resp.json().await?;
        let last_str = data
            .data
            .first()
            .ok_or_else(|| anyhow::anyhow!("empty ticker response"))?
            .last
            .trim()
            .to_string();
        let last = last_str
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("invalid last price '{}': {}", last_str, e))?;

        Ok(MarketSnapshot {
            instrument: instrument.to_string(),
            last_price: last,
            candles: HashMap::new(),
            trend: TrendClass::Range,
            ts: crate::time_util::now_millis(),
        })
    }
}
