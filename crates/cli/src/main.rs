use anyhow::Result;
use atlas_backtest::{
    load_candles_csv, run_feature_attribution, BacktestEngine, MultiTimeframeData,
};
use atlas_core::{ConfigLoader, TradingConfig};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Decision and risk engine for leveraged futures trading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct DataArgs {
    /// Entry-timeframe (15m) candle CSV
    #[arg(long)]
    fast: String,
    /// Filter-timeframe (1h) candle CSV
    #[arg(long)]
    slow: String,
    /// Optional 5m candle CSV for multi-timeframe confirmation
    #[arg(long)]
    aux_fast: Option<String>,
    /// Optional 4h candle CSV for multi-timeframe confirmation
    #[arg(long)]
    aux_slow: Option<String>,
    /// Starting balance in quote currency
    #[arg(long, default_value = "10000")]
    balance: String,
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the decision pipeline over historical candles
    Backtest(DataArgs),
    /// Attribute each optional feature's marginal contribution
    AbTest(DataArgs),
}

fn load(args: &DataArgs) -> Result<(TradingConfig, MultiTimeframeData, Decimal)> {
    let config = ConfigLoader::load_from(&args.config).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "config not loaded, using defaults");
        TradingConfig::default()
    });

    let data = MultiTimeframeData {
        fast: load_candles_csv(&args.fast)?,
        slow: load_candles_csv(&args.slow)?,
        aux_fast: args.aux_fast.as_deref().map(load_candles_csv).transpose()?,
        aux_slow: args.aux_slow.as_deref().map(load_candles_csv).transpose()?,
    };
    let balance = Decimal::from_str(&args.balance)?;
    Ok((config, data, balance))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest(args) => {
            let (config, data, balance) = load(&args)?;
            let outcome = BacktestEngine::new(config).run(&data, balance)?;
            println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        }
        Commands::AbTest(args) => {
            let (config, data, balance) = load(&args)?;
            let attribution = run_feature_attribution(&config, &data, balance)?;
            println!("{}", serde_json::to_string_pretty(&attribution)?);
        }
    }
    Ok(())
}
