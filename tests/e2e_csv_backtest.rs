//! Full pipeline: csv file -> data source -> engine -> analyzer -> report files.

mod common;

use barback::prelude::*;
use common::random_walk;

#[test]
fn csv_to_reports() {
    let dir = tempfile::tempdir().unwrap();
    let source = CsvDataSource::new(dir.path());
    source.store(&random_walk(250, 17)).unwrap();

    let configuration = BacktestConfiguration {
        data_path: dir.path().to_path_buf(),
        symbol: common::SYMBOL.to_string(),
        transaction_cost: 0.001,
        fill_timing: FillTiming::NextOpen,
        liquidate_at_end: true,
        ..BacktestConfiguration::default()
    };

    let request = DataRequest::new(&configuration.symbol)
        .with_range(configuration.start_date, configuration.end_date);
    let series = source.fetch(&request).unwrap();
    assert_eq!(series.len(), 250);

    let engine_config = configuration.backtest_config();
    let mut strategy = configuration.strategy.build();
    let result = BacktestEngine::new(&series, strategy.as_mut(), engine_config.clone())
        .unwrap()
        .run()
        .unwrap();
    let metrics = result.analyze(&configuration.analyzer);

    assert!(result.open_trade.is_none());
    assert_eq!(metrics.periods, 250 - 34);
    assert!((metrics.final_equity - result.final_account.cash).abs() < 1e-6);

    let equity_path = dir.path().join("equity.csv");
    let trades_path = dir.path().join("trades.csv");
    let summary_path = dir.path().join("summary.json");

    write_equity_csv(&result.equity_curve, &equity_path).unwrap();
    write_trades_csv(&result.trades, result.open_trade.as_ref(), &trades_path).unwrap();
    let report = RunReport::new(
        &result,
        &engine_config,
        Some(configuration.strategy.clone()),
        metrics.clone(),
    );
    write_summary_json(&report, &summary_path).unwrap();

    let equity_rows = std::fs::read_to_string(&equity_path).unwrap().lines().count();
    assert_eq!(equity_rows, result.equity_curve.len() + 1);

    //the header is written with the first row
    let trade_rows = std::fs::read_to_string(&trades_path).unwrap().lines().count();
    if !result.trades.is_empty() {
        assert_eq!(trade_rows, result.trades.len() + 1);
    }

    let parsed: RunReport =
        serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
    assert_eq!(parsed.metrics.num_trades, metrics.num_trades);
    assert_eq!(parsed.config, engine_config);
    assert_eq!(parsed.bars_processed, 250 - 34);
}
