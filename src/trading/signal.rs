//! 交易信号与信号规范化
//!
//! 推理协作方产出的原始信号在进入风控之前必须经过规范化：
//! 校验置信度范围、补全入场价、检查价格顺序。
//! 规范化之后的 `TradeSignal` 不可变。

use serde::{Deserialize, Serialize};

use crate::trading::error::PipelineError;
use crate::trading::market::MarketSnapshot;

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// 做多
    Long,
    /// 做空
    Short,
    /// 平仓/观望
    Flat,
}

impl Direction {
    /// 方向符号：多 +1，空 -1，平 0
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Flat => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Flat => "FLAT",
        }
    }
}

/// 模型原始输出（未经校验）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub instrument: String,
    pub direction: Direction,
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reasoning: String,
}

/// 规范化之后的交易信号 - 不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub instrument: String,
    pub direction: Direction,
    /// 置信度 [0,1]
    pub confidence: f64,
    /// 入场价（非平仓信号必有值）
    pub entry_hint: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub reasoning: String,
    /// 信号时间戳（毫秒）
    pub timestamp: i64,
}

/// 推理输出的最少说明词数，过滤"Buy now"式的低质量输出
const MIN_REASONING_WORDS: usize = 5;

/// 规范化原始信号
///
/// 入场价缺失时用快照最新价补全；平仓信号不要求价格字段。
pub fn normalize(raw: RawSignal, snapshot: &MarketSnapshot) -> Result<TradeSignal, PipelineError> {
    if raw.instrument.trim().is_empty() {
        return Err(PipelineError::validation("instrument is empty"));
    }

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(PipelineError::validation(format!(
            "confidence {} out of range [0,1]",
            raw.confidence
        )));
    }

    if raw.reasoning.split_whitespace().count() < MIN_REASONING_WORDS {
        return Err(PipelineError::validation("reasoning is not descriptive"));
    }

    let entry_hint = match raw.direction {
        Direction::Flat => raw.entry_price,
        _ => {
            let entry = raw
                .entry_price
                .filter(|p| *p > 0.0 && p.is_finite())
                .or_else(|| snapshot.latest_price());
            match entry {
                Some(p) => Some(p),
                None => {
                    return Err(PipelineError::validation(
                        "no entry price and no market price to derive it from",
                    ))
                }
            }
        }
    };

    // 价格顺序检查：止损必须在入场价的亏损一侧，止盈在盈利一侧
    if let (Some(entry), d @ (Direction::Long | Direction::Short)) = (entry_hint, raw.direction) {
        if let Some(sl) = raw.stop_loss {
            if d.sign() * (sl - entry) >= 0.0 {
                return Err(PipelineError::validation(format!(
                    "stop loss {} on wrong side of entry {} for {}",
                    sl,
                    entry,
                    d.as_str()
                )));
            }
        }
        if let Some(tp) = raw.take_profit {
            if d.sign() * (tp - entry) <= 0.0 {
                return Err(PipelineError::validation(format!(
                    "take profit {} on wrong side of entry {} for {}",
                    tp,
                    entry,
                    d.as_str()
                )));
            }
        }
    }

    Ok(TradeSignal {
        instrument: raw.instrument,
        direction: raw.direction,
        confidence: raw.confidence,
        entry_hint,
        stop_loss: raw.stop_loss,
        take_profit: raw.take_profit,
        reasoning: raw.reasoning,
        timestamp: snapshot.ts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::market::TrendClass;
    use std::collections::HashMap;

    fn snapshot(price: f64) -> MarketSnapshot {
        MarketSnapshot {
            instrument: "BTC-USDT-SWAP".to_string(),
            last_price: price,
            candles: HashMap::new(),
            trend: TrendClass::Range,
            ts: 1_700_000_000_000,
        }
    }

    fn raw(direction: Direction) -> RawSignal {
        RawSignal {
            instrument: "BTC-USDT-SWAP".to_string(),
            direction,
            confidence: 0.7,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            reasoning: "momentum breakout above prior range high".to_string(),
        }
    }

    #[test]
    fn test_entry_derived_from_market_price() {
        let signal = normalize(raw(Direction::Long), &snapshot(50_000.0)).unwrap();
        assert_eq!(signal.entry_hint, Some(50_000.0));
        assert_eq!(signal.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let mut r = raw(Direction::Long);
        r.confidence = 1.2;
        let err = normalize(r, &snapshot(50_000.0)).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn test_missing_instrument_rejected() {
        let mut r = raw(Direction::Long);
        r.instrument = " ".to_string();
        assert!(normalize(r, &snapshot(50_000.0)).is_err());
    }

    #[test]
    fn test_no_price_anywhere_rejected() {
        let err = normalize(raw(Direction::Long), &snapshot(0.0)).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn test_stop_loss_on_wrong_side_rejected() {
        let mut r = raw(Direction::Long);
        r.entry_price = Some(50_000.0);
        r.stop_loss = Some(51_000.0);
        assert!(normalize(r, &snapshot(50_000.0)).is_err());

        let mut r = raw(Direction::Short);
        r.entry_price = Some(50_000.0);
        r.stop_loss = Some(49_000.0);
        assert!(normalize(r, &snapshot(50_000.0)).is_err());
    }

    #[test]
    fn test_short_price_ordering_accepted() {
        let mut r = raw(Direction::Short);
        r.entry_price = Some(50_000.0);
        r.stop_loss = Some(51_000.0);
        r.take_profit = Some(48_000.0);
        let signal = normalize(r, &snapshot(50_000.0)).unwrap();
        assert_eq!(signal.stop_loss, Some(51_000.0));
    }

    #[test]
    fn test_flat_signal_needs_no_prices() {
        let mut r = raw(Direction::Flat);
        r.confidence = 0.9;
        assert!(normalize(r, &snapshot(0.0)).is_ok());
    }

    #[test]
    fn test_terse_reasoning_rejected() {
        let mut r = raw(Direction::Long);
        r.reasoning = "buy now".to_string();
        assert!(normalize(r, &snapshot(50_000.0)).is_err());
    }
}
