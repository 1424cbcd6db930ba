use shadow_quant::app_config::settings::RiskParams;
use shadow_quant::trading::error::PipelineError;
use shadow_quant::trading::market::TrendClass;
use shadow_quant::trading::order::{synthesize_order, OrderSide};
use shadow_quant::trading::risk::{AccountSnapshot, RiskDecision, RiskEngine};
use shadow_quant::trading::signal::{Direction, TradeSignal};

fn signal(direction: Direction, entry: f64) -> TradeSignal {
    TradeSignal {
        instrument: "BTC-USDT-SWAP".to_string(),
        direction,
        confidence: 0.7,
        entry_hint: Some(entry),
        stop_loss: None,
        take_profit: None,
        reasoning: "clean breakout with rising volume".to_string(),
        timestamp: 0,
    }
}

fn account() -> AccountSnapshot {
    AccountSnapshot {
        equity: 10_000.0,
        open_exposure_usd: 0.0,
        trend: TrendClass::Range,
    }
}

fn decision(sl: f64, tp: f64) -> RiskDecision {
    RiskDecision {
        approved: true,
        max_leverage: 10,
        position_size_fraction: 0.5,
        stop_loss_price: sl,
        take_profit_price: tp,
        rejection_reason: None,
    }
}

#[test]
fn test_merge_invariant_holds_for_both_directions() {
    let params = RiskParams::default();

    // 多头
    let spec = synthesize_order(
        &signal(Direction::Long, 50_000.0),
        &decision(49_000.0, 52_500.0),
        &account(),
        50_000.0,
        &params,
    )
    .unwrap();
    assert_eq!(spec.side, OrderSide::Buy);
    assert!(spec.stop_loss_pct < 0.0);
    assert!(spec.take_profit_pct > 0.0);

    // 空头：绝对价位在入场价两侧的位置相反，偏移符号不变
    let spec = synthesize_order(
        &signal(Direction::Short, 50_000.0),
        &decision(51_000.0, 47_500.0),
        &account(),
        50_000.0,
        &params,
    )
    .unwrap();
    assert_eq!(spec.side, OrderSide::Sell);
    assert!(spec.stop_loss_pct < 0.0);
    assert!(spec.take_profit_pct > 0.0);
}

#[test]
fn test_full_pipeline_from_risk_engine_output() {
    // 风控产出的决策直接进入合成，偏移与默认配置一致
    let params = RiskParams::default();
    let engine = RiskEngine::new(params.clone());
    let sig = signal(Direction::Long, 50_000.0);
    let dec = engine.evaluate(&sig, &account());
    assert!(dec.approved);

    let spec = synthesize_order(&sig, &dec, &account(), 50_000.0, &params).unwrap();
    assert!((spec.stop_loss_pct - (-params.default_stop_loss_pct)).abs() < 1e-9);
    assert!((spec.take_profit_pct - params.default_take_profit_pct).abs() < 1e-9);
    // 名义价值 = 权益 × 比例 × 杠杆
    assert!((spec.size - 10_000.0 * dec.position_size_fraction * dec.max_leverage as f64).abs() < 1e-6);
}

#[test]
fn test_stop_on_profitable_side_aborts_cycle() {
    let err = synthesize_order(
        &signal(Direction::Short, 50_000.0),
        // 空头的止损给到了入场价下方（盈利一侧）
        &decision(49_000.0, 47_000.0),
        &account(),
        50_000.0,
        &RiskParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Invariant { .. }));
}

#[test]
fn test_rejected_decision_cannot_be_synthesized() {
    let mut dec = decision(49_000.0, 52_500.0);
    dec.approved = false;
    let err = synthesize_order(
        &signal(Direction::Long, 50_000.0),
        &dec,
        &account(),
        50_000.0,
        &RiskParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Invariant { .. }));
}

#[test]
fn test_tiny_notional_bumped_to_exchange_minimum() {
    let params = RiskParams::default();
    let mut acc = account();
    acc.equity = 1.0;
    let mut dec = decision(49_000.0, 52_500.0);
    dec.position_size_fraction = 0.5;
    dec.max_leverage = 2;
    let spec = synthesize_order(
        &signal(Direction::Long, 50_000.0),
        &dec,
        &acc,
        50_000.0,
        &params,
    )
    .unwrap();
    assert_eq!(spec.size, params.min_order_notional_usd);
}

#[test]
fn test_entry_falls_back_to_market_price() {
    let mut sig = signal(Direction::Long, 50_000.0);
    sig.entry_hint = None;
    let spec = synthesize_order(
        &sig,
        &decision(49_000.0, 52_500.0),
        &account(),
        50_000.0,
        &RiskParams::default(),
    )
    .unwrap();
    assert!((spec.stop_loss_pct - (-0.02)).abs() < 1e-9);
}
