use anyhow::{Context, Result};
use barback::engine::sweep::rank_by_sharpe;
use barback::prelude::*;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barback")]
#[command(about = "Bar-by-bar strategy backtesting engine", long_about = None)]
struct Cli {
    //debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    //run a single backtest
    Run {
        //json configuration file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        //path to a csv file, or a directory of <symbol>.csv files
        #[arg(long)]
        data: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        //strategy type (macd, ma)
        #[arg(long)]
        strategy: Option<String>,

        //inclusive date range (yyyy-mm-dd)
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,

        //account and execution options
        #[arg(long)]
        initial_capital: Option<f64>,

        //fraction of notional charged per fill (eg 0.001)
        #[arg(long)]
        transaction_cost: Option<f64>,

        #[arg(long)]
        allow_short: bool,

        #[arg(long)]
        allow_margin: bool,

        //full, fixed:<qty> or fraction:<f>
        #[arg(long)]
        sizing: Option<String>,

        //close (fill at the decision bar's close) or open (next bar's open)
        #[arg(long)]
        fill: Option<String>,

        //close any open position at the last bar
        #[arg(long)]
        liquidate: bool,

        #[arg(long)]
        lookback: Option<usize>,

        //macd strategy parameters
        #[arg(long)]
        fast: Option<usize>,
        #[arg(long)]
        slow: Option<usize>,
        #[arg(long)]
        signal: Option<usize>,

        //enable the trend, volume and zero-line filters with take-profit and stop-loss
        #[arg(long)]
        filtered: bool,

        //ma cross strategy parameters
        #[arg(long)]
        short_period: Option<usize>,
        #[arg(long)]
        long_period: Option<usize>,

        //fixed order size used by the strategy
        #[arg(long)]
        qty: Option<u64>,

        //output options
        #[arg(long)]
        output_equity_csv: Option<PathBuf>,
        #[arg(long)]
        output_trades_csv: Option<PathBuf>,
        #[arg(long)]
        output_summary_json: Option<PathBuf>,
    },

    //run a MACD parameter sweep in parallel
    Sweep {
        //json configuration file for the base run
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, value_delimiter = ',', default_values_t = vec![8, 12, 16])]
        fast: Vec<usize>,

        #[arg(long, value_delimiter = ',', default_values_t = vec![21, 26, 34])]
        slow: Vec<usize>,

        #[arg(long, value_delimiter = ',', default_values_t = vec![5, 9])]
        signal: Vec<usize>,

        //number of best results to print
        #[arg(long, default_value = "10")]
        top: usize,
    },

    //write a default configuration file
    InitConfig {
        #[arg(default_value = "backtest.json")]
        path: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            data,
            symbol,
            strategy,
            start,
            end,
            initial_capital,
            transaction_cost,
            allow_short,
            allow_margin,
            sizing,
            fill,
            liquidate,
            lookback,
            fast,
            slow,
            signal,
            filtered,
            short_period,
            long_period,
            qty,
            output_equity_csv,
            output_trades_csv,
            output_summary_json,
        } => {
            let mut configuration = load_configuration(config)?;

            if let Some(data) = data {
                configuration.data_path = data;
            }
            if let Some(symbol) = symbol {
                configuration.symbol = symbol;
            }
            if start.is_some() {
                configuration.start_date = start;
            }
            if end.is_some() {
                configuration.end_date = end;
            }
            if let Some(capital) = initial_capital {
                configuration.initial_capital = capital;
            }
            if let Some(cost) = transaction_cost {
                configuration.transaction_cost = cost;
            }
            configuration.allow_short |= allow_short;
            configuration.allow_margin |= allow_margin;
            configuration.liquidate_at_end |= liquidate;
            if let Some(name) = strategy {
                let strategy_type = StrategyType::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown strategy: {}", name))?;
                if strategy_type != configuration.strategy.strategy_type() {
                    configuration.strategy = strategy_type.default_params();
                }
            }

            //the preset picks its own sizing unless --sizing is given
            if filtered {
                configuration.apply_filtered_preset();
            }
            if let Some(sizing) = sizing {
                configuration.position_sizing = PositionSizing::parse(&sizing)
                    .ok_or_else(|| anyhow::anyhow!("Unknown position sizing: {}", sizing))?;
            }
            if let Some(fill) = fill {
                configuration.fill_timing = FillTiming::parse(&fill)
                    .ok_or_else(|| anyhow::anyhow!("Unknown fill timing: {}", fill))?;
            }
            if lookback.is_some() {
                configuration.lookback_window = lookback;
            }

            match &mut configuration.strategy {
                StrategyParams::Macd(params) => {
                    params.fast_period = fast.unwrap_or(params.fast_period);
                    params.slow_period = slow.unwrap_or(params.slow_period);
                    params.signal_period = signal.unwrap_or(params.signal_period);
                    params.qty = qty.or(params.qty);
                }
                StrategyParams::MaCross(params) => {
                    params.short_period = short_period.unwrap_or(params.short_period);
                    params.long_period = long_period.unwrap_or(params.long_period);
                    params.qty = qty.or(params.qty);
                }
            }

            if output_equity_csv.is_some() {
                configuration.output_equity_csv = output_equity_csv;
            }
            if output_trades_csv.is_some() {
                configuration.output_trades_csv = output_trades_csv;
            }
            if output_summary_json.is_some() {
                configuration.output_summary_json = output_summary_json;
            }

            run_single(&configuration)?;
        }
        Commands::Sweep {
            config,
            data,
            symbol,
            fast,
            slow,
            signal,
            top,
        } => {
            let mut configuration = load_configuration(config)?;
            if let Some(data) = data {
                configuration.data_path = data;
            }
            if let Some(symbol) = symbol {
                configuration.symbol = symbol;
            }
            let grid = MacdGrid {
                fast_periods: fast,
                slow_periods: slow,
                signal_periods: signal,
            };
            run_grid(&configuration, &grid, top)?;
        }
        Commands::InitConfig { path } => {
            BacktestConfiguration::default().to_json_file(&path)?;
            println!("Default configuration written to {:?}", path);
        }
    }

    Ok(())
}

fn load_configuration(path: Option<PathBuf>) -> Result<BacktestConfiguration> {
    match path {
        Some(path) => BacktestConfiguration::from_json_file(&path),
        None => Ok(BacktestConfiguration::default()),
    }
}

fn load_data(configuration: &BacktestConfiguration) -> Result<BarSeries> {
    let source = CsvDataSource::new(&configuration.data_path);
    let request = DataRequest::new(&configuration.symbol)
        .with_range(configuration.start_date, configuration.end_date);
    let series = source.fetch(&request).context(format!(
        "Failed to load data from {:?}",
        configuration.data_path
    ))?;

    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        info!(
            symbol = series.symbol(),
            bars = series.len(),
            from = %first.timestamp,
            to = %last.timestamp,
            "loaded bar series"
        );
    }
    Ok(series)
}

fn run_single(configuration: &BacktestConfiguration) -> Result<()> {
    println!("Barback Backtesting Engine");
    println!("==========================\n");

    let series = load_data(configuration)?;
    let engine_config = configuration.backtest_config();

    println!("Strategy: {}", configuration.strategy.describe());
    println!("Initial capital: ${:.2}", engine_config.initial_capital);
    println!(
        "Transaction cost: {:.4}% of notional",
        engine_config.transaction_cost * 100.0
    );
    println!("Fill timing: {:?}\n", engine_config.fill_timing);

    let mut strategy = configuration.strategy.build();
    let result = BacktestEngine::new(&series, strategy.as_mut(), engine_config.clone())?.run()?;
    let metrics = result.analyze(&configuration.analyzer);

    println!("Backtest Results");
    println!("================\n");
    metrics.pretty_print_table();

    if let Some(open) = &result.open_trade {
        println!(
            "\nOpen position: {:?} {} @ {:.2}",
            open.side, open.quantity, open.entry_price
        );
    }
    let rejected = result.rejections().count();
    if rejected > 0 {
        println!("Skipped decisions: {}", rejected);
    }

    //save outputs if requested
    if let Some(path) = &configuration.output_equity_csv {
        write_equity_csv(&result.equity_curve, path)?;
        println!("\nEquity curve saved to {:?}", path);
    }

    if let Some(path) = &configuration.output_trades_csv {
        write_trades_csv(&result.trades, result.open_trade.as_ref(), path)?;
        println!("Trades saved to {:?}", path);
    }

    if let Some(path) = &configuration.output_summary_json {
        let report = RunReport::new(
            &result,
            &engine_config,
            Some(configuration.strategy.clone()),
            metrics,
        );
        write_summary_json(&report, path)?;
        println!("Summary saved to {:?}", path);
    }

    Ok(())
}

fn run_grid(configuration: &BacktestConfiguration, grid: &MacdGrid, top: usize) -> Result<()> {
    let series = load_data(configuration)?;

    let base_params = match &configuration.strategy {
        StrategyParams::Macd(params) => params.clone(),
        StrategyParams::MaCross(_) => MacdParams::default(),
    };
    let jobs = grid.jobs(&configuration.backtest_config(), &base_params);
    if jobs.is_empty() {
        anyhow::bail!("Parameter grid has no valid fast < slow combinations");
    }

    let outcomes = run_sweep(&series, &jobs, &configuration.analyzer);
    for outcome in outcomes.iter().filter(|o| o.result.is_err()) {
        if let Err(e) = &outcome.result {
            println!("{}: {}", outcome.label, e);
        }
    }

    let mut table = prettytable::Table::new();
    table.add_row(prettytable::row![
        "Parameters",
        "Total Return",
        "Max Drawdown",
        "Sharpe",
        "Trades",
        "Win Rate"
    ]);
    for outcome in rank_by_sharpe(&outcomes).into_iter().take(top) {
        if let Some(m) = outcome.metrics() {
            table.add_row(prettytable::row![
                outcome.label,
                format!("{:.2}%", m.total_return * 100.0),
                format!("{:.2}%", m.max_drawdown * 100.0),
                format!("{:.3}", m.sharpe_ratio),
                m.num_trades,
                format!("{:.2}%", m.win_rate * 100.0)
            ]);
        }
    }

    println!("Sweep Results ({} runs)", outcomes.len());
    println!("=============\n");
    table.printstd();
    Ok(())
}
