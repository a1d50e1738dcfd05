//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Conservation: equity = initial + realized - costs + unrealized at every point
//! 2. Determinism: identical inputs give identical traces
//! 3. Drawdown stays within [0, 1]
//! 4. Without margin, cash never goes negative on long-only runs

mod common;

use barback::engine::{run_backtest, BacktestConfig, BacktestResult, FillTiming, PositionSizing};
use barback::metrics::AnalyzerConfig;
use barback::strategy::Decision;
use common::{config, random_walk, Scripted};
use proptest::prelude::*;

fn arb_decision() -> impl Strategy<Value = Decision> {
    prop_oneof![
        4 => Just(Decision::Hold),
        2 => (0u64..40).prop_map(|q| Decision::Buy(if q == 0 { None } else { Some(q) })),
        2 => (0u64..40).prop_map(|q| Decision::Sell(if q == 0 { None } else { Some(q) })),
        1 => Just(Decision::Close),
    ]
}

fn arb_config() -> impl Strategy<Value = BacktestConfig> {
    (
        0.0..0.01f64,
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop_oneof![
            Just(PositionSizing::FullCapital),
            (1u64..20).prop_map(|quantity| PositionSizing::FixedQuantity { quantity }),
            (0.1..1.0f64).prop_map(|fraction| PositionSizing::FractionOfCapital { fraction }),
        ],
    )
        .prop_map(|(cost, allow_short, next_open, liquidate, sizing)| BacktestConfig {
            transaction_cost: cost,
            allow_short,
            position_sizing: sizing,
            fill_timing: if next_open {
                FillTiming::NextOpen
            } else {
                FillTiming::CurrentClose
            },
            liquidate_at_end: liquidate,
            ..config(10_000.0)
        })
}

fn run(seed: u64, script: &[Decision], cfg: &BacktestConfig) -> BacktestResult {
    let series = random_walk(script.len().max(2), seed);
    let mut strategy = Scripted::new(script.to_vec());
    run_backtest(&series, &mut strategy, cfg.clone()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn equity_is_conserved(
        seed in 0u64..1_000,
        script in prop::collection::vec(arb_decision(), 2..80),
        cfg in arb_config(),
    ) {
        let result = run(seed, &script, &cfg);
        for point in &result.equity_curve {
            let expected = cfg.initial_capital + point.realized_pnl - point.costs + point.unrealized_pnl;
            prop_assert!(
                (point.equity - expected).abs() < 1e-6 * cfg.initial_capital,
                "equity {} != {} at {}", point.equity, expected, point.timestamp
            );
        }

        //closed trades account for all realized pnl net of their costs
        let net: f64 = result.trades.iter().filter_map(|t| t.realized_pnl).sum();
        let open_costs = result.open_trade.as_ref().map_or(0.0, |t| t.costs);
        let last = result.equity_curve.last().unwrap();
        prop_assert!((net - (last.realized_pnl - last.costs + open_costs)).abs() < 1e-6 * cfg.initial_capital);
    }

    #[test]
    fn runs_are_deterministic(
        seed in 0u64..1_000,
        script in prop::collection::vec(arb_decision(), 2..60),
        cfg in arb_config(),
    ) {
        let a = run(seed, &script, &cfg);
        let b = run(seed, &script, &cfg);
        prop_assert_eq!(&a, &b);

        let analyzer = AnalyzerConfig::default();
        let ma = serde_json::to_string(&a.analyze(&analyzer)).unwrap();
        let mb = serde_json::to_string(&b.analyze(&analyzer)).unwrap();
        prop_assert_eq!(ma, mb);
    }

    #[test]
    fn drawdown_is_a_fraction(
        seed in 0u64..1_000,
        script in prop::collection::vec(arb_decision(), 2..80),
        cfg in arb_config(),
    ) {
        let metrics = run(seed, &script, &cfg).analyze(&AnalyzerConfig::default());
        prop_assert!(metrics.max_drawdown >= 0.0);
        prop_assert!(metrics.max_drawdown <= 1.0);
        prop_assert!(metrics.win_rate >= 0.0 && metrics.win_rate <= 1.0);
    }

    #[test]
    fn long_only_cash_stays_non_negative(
        seed in 0u64..1_000,
        script in prop::collection::vec(arb_decision(), 2..80),
        cost in 0.0..0.01f64,
    ) {
        let cfg = BacktestConfig { transaction_cost: cost, ..config(10_000.0) };
        let result = run(seed, &script, &cfg);
        for point in &result.equity_curve {
            prop_assert!(point.cash >= -1e-9);
            prop_assert!(point.position_qty >= 0);
        }
    }
}
