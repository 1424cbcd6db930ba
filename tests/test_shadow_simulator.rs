use approx::assert_relative_eq;

use shadow_quant::app_config::settings::ShadowParams;
use shadow_quant::trading::shadow::ledger::{ExitReason, OpenTradeRequest, ShadowLedger};
use shadow_quant::trading::shadow::ShadowSimulator;
use shadow_quant::trading::signal::Direction;

fn open_request(direction: Direction, quote: f64, size_usd: f64) -> OpenTradeRequest {
    let dir = direction.sign();
    OpenTradeRequest {
        instrument: "BTC-USDT-SWAP".to_string(),
        direction,
        confidence: 0.75,
        reasoning: "strong momentum follow through expected".to_string(),
        quote_price: quote,
        stop_loss: Some(quote * (1.0 - dir * 0.02)),
        take_profit: Some(quote * (1.0 + dir * 0.10)),
        size_usd,
        leverage: 10,
        decision_context: "{}".to_string(),
        now_ms: 0,
    }
}

/// 开仓 100，止盈 110，多头 1 个单位：
/// 手续费按平仓名义价值计提（≈110×0.0006），两条腿各有万分之一的逆向滑点。
#[test]
fn test_round_trip_economics() {
    let params = ShadowParams::default();
    let sim = ShadowSimulator::new(params);
    let mut ledger = ShadowLedger::new("acc", 1_000.0);

    // 名义价值取 100.01 美元，滑点调整后的持仓恰好 1 个单位
    let trade = ledger.open_trade(open_request(Direction::Long, 100.0, 100.01), 0.0001);
    assert_relative_eq!(trade.entry_price, 100.01, epsilon = 1e-12);

    let closed = sim.settle(&mut ledger, "BTC-USDT-SWAP", 110.5, 3_600_000);
    assert_eq!(closed.len(), 1);
    let closed = &closed[0];

    assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
    // 平仓成交价 = 阈值 110 × (1 - 0.0001)
    assert_relative_eq!(closed.exit_price.unwrap(), 109.989, epsilon = 1e-9);
    // 手续费 ≈ 110 × 0.0006
    assert_relative_eq!(closed.fees_usd, 0.0659934, epsilon = 1e-9);
    // 双边滑点：0.01 + 0.011
    assert_relative_eq!(closed.slippage_usd, 0.021, epsilon = 1e-9);
    // 净收益 = 成交口径价差 - 手续费
    assert_relative_eq!(closed.pnl_usd.unwrap(), 9.9130066, epsilon = 1e-9);

    // 账户口径：毛收益 10，恒等式成立
    assert_relative_eq!(ledger.account.total_pnl, 10.0, epsilon = 1e-9);
    assert_relative_eq!(ledger.account.total_fees, 0.0659934, epsilon = 1e-9);
    assert_relative_eq!(ledger.account.total_slippage, 0.021, epsilon = 1e-9);
    assert_relative_eq!(ledger.account.current_equity, 1_009.9130066, epsilon = 1e-9);
    assert!(ledger.account.invariant_holds(1e-9));
    assert_eq!(ledger.account.winning_trades, 1);
}

#[test]
fn test_invariant_holds_across_many_settlements() {
    let params = ShadowParams::default();
    let sim = ShadowSimulator::new(params.clone());
    let mut ledger = ShadowLedger::new("acc", 5_000.0);

    // 交替方向和价格路径，混合止盈止损
    let paths = [
        (Direction::Long, 100.0, 97.0),   // 止损
        (Direction::Short, 100.0, 111.0), // 止损
        (Direction::Long, 100.0, 112.0),  // 止盈
        (Direction::Short, 100.0, 89.0),  // 止盈
        (Direction::Long, 250.0, 300.0),  // 止盈
    ];

    for (i, (direction, quote, next_price)) in paths.iter().enumerate() {
        ledger.open_trade(
            open_request(*direction, *quote, 500.0),
            params.slippage_rate,
        );
        let closed = sim.settle(&mut ledger, "BTC-USDT-SWAP", *next_price, (i as i64 + 1) * 60_000);
        assert_eq!(closed.len(), 1, "path {} should settle", i);
        assert!(
            ledger.account.invariant_holds(1e-9),
            "invariant broken after settlement {}",
            i
        );
    }

    assert_eq!(
        ledger.account.winning_trades + ledger.account.losing_trades,
        paths.len() as i64
    );
}

#[test]
fn test_settlement_only_touches_matching_instrument() {
    let params = ShadowParams::default();
    let sim = ShadowSimulator::new(params);
    let mut ledger = ShadowLedger::new("acc", 1_000.0);

    ledger.open_trade(open_request(Direction::Long, 100.0, 100.0), 0.0001);
    let mut other = open_request(Direction::Long, 100.0, 100.0);
    other.instrument = "ETH-USDT-SWAP".to_string();
    ledger.open_trade(other, 0.0001);

    let closed = sim.settle(&mut ledger, "BTC-USDT-SWAP", 50.0, 60_000);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].instrument, "BTC-USDT-SWAP");
    assert_eq!(ledger.open_trades().len(), 1);
}

#[test]
fn test_equity_matches_sum_of_trade_pnls() {
    let params = ShadowParams::default();
    let sim = ShadowSimulator::new(params.clone());
    let mut ledger = ShadowLedger::new("acc", 2_000.0);

    let mut nets = Vec::new();
    for (i, price) in [(0, 97.0), (1, 112.0), (2, 89.0)].iter() {
        let direction = if i % 2 == 0 { Direction::Long } else { Direction::Short };
        ledger.open_trade(open_request(direction, 100.0, 300.0), params.slippage_rate);
        for t in sim.settle(&mut ledger, "BTC-USDT-SWAP", *price, 60_000) {
            nets.push(t.pnl_usd.unwrap());
        }
    }

    let expected: f64 = 2_000.0 + nets.iter().sum::<f64>();
    assert_relative_eq!(ledger.account.current_equity, expected, epsilon = 1e-9);
}
