//! Equity backtester - main entry point
//!
//! Loads an [`EngineConfig`], reads each ticker's daily candles from CSV,
//! runs a single strategy over the configured date range, and prints the
//! resulting session statistics.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use equity_backtester::candle_store::InMemoryCandleStore;
use equity_backtester::strategies;
use equity_backtester::strategy::Strategy;
use equity_backtester::trade_repository::LoggingTradeRepository;
use equity_backtester::EngineConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "equity-backtester")]
#[command(about = "Event-driven equity backtesting engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/default.json")]
    config: String,

    /// Strategy name (overrides config file default)
    #[arg(short, long, default_value = "sma_breakout")]
    strategy: String,

    /// Initial capital
    #[arg(long)]
    capital: Option<f64>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    end: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mut config = EngineConfig::from_file(&cli.config).unwrap_or_else(|err| {
        info!("no config file loaded ({err}), using defaults");
        EngineConfig::default()
    });

    if let Some(capital) = cli.capital {
        config = config.with_initial_capital(capital);
    }

    let start = chrono::NaiveDate::parse_from_str(&cli.start, "%Y-%m-%d")?;
    let end = chrono::NaiveDate::parse_from_str(&cli.end, "%Y-%m-%d")?;

    let mut store = InMemoryCandleStore::new();
    let data_dir = PathBuf::from(&config.data_dir);
    for ticker in config.tickers().into_iter().chain(config.market_indices()) {
        let path = data_dir.join(format!("{ticker}.csv"));
        store.load_ticker_csv(ticker, path)?;
    }

    let strategy: Box<dyn Strategy> = match cli.strategy.as_str() {
        "sma_breakout" => Box::new(strategies::sma_breakout::SmaBreakoutStrategy),
        "ema_breakout" => Box::new(strategies::ema_breakout::EmaBreakoutStrategy),
        "trend_following" => Box::new(strategies::trend_following::TrendFollowingStrategy),
        "rsi_swing" => Box::new(strategies::rsi_swing::RsiSwingStrategy),
        other => anyhow::bail!("unknown strategy: {other}. available: sma_breakout, ema_breakout, trend_following, rsi_swing"),
    };

    info!(strategy = %cli.strategy, start = %start, end = %end, "running backtest");

    let tickers = config.tickers();
    let mut engine = equity_backtester::BacktestEngine::new(config, strategy, &store, Box::new(LoggingTradeRepository::default()));
    let result = engine.run(start, end, &tickers).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Initial Capital:      {}", result.initial_capital);
    println!("Final Equity:         {}", result.final_equity);
    println!("Total Return:         {:.2}%", result.stats.total_return_pct);
    println!("CAGR:                 {:.2}%", result.stats.cagr * 100.0);
    println!("Sharpe Ratio:         {:.2}", result.stats.sharpe_ratio);
    println!("Max Drawdown:         {:.2}%", result.stats.max_drawdown_pct);
    println!("Win Rate:             {:.2}%", result.stats.win_rate);
    println!("Profit Factor:        {:.2}", result.stats.profit_factor);
    println!("Total Trades:         {}", result.stats.total_trades);
    println!("Winning / Losing:     {} / {}", result.stats.winning_trades, result.stats.losing_trades);
    println!("Avg R-Multiple:       {:.2}", result.stats.avg_r_multiple);
    println!("Avg Holding Days:     {:.1}", result.stats.avg_holding_days);
    println!("Max Consec Wins:      {}", result.stats.max_consecutive_wins);
    println!("Max Consec Losses:    {}", result.stats.max_consecutive_losses);
    println!("{}", "=".repeat(60));

    Ok(())
}
