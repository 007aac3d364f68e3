use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use rust_trade_sync::app::bootstrap;
use rust_trade_sync::app_config::log::setup_logging;
use rust_trade_sync::app_config::sync_config::parse_symbols;
use rust_trade_sync::app_config::SyncConfig;

/// 交易账户同步与执行服务
#[derive(Parser, Debug)]
#[command(name = "rust_trade_sync", version)]
struct Args {
    /// 逗号分隔的行情订阅品种
    #[arg(long, env = "SYNC_SYMBOLS")]
    symbols: Option<String>,

    /// 交易账户id
    #[arg(long, env = "SYNC_ACCOUNT_ID")]
    account_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    setup_logging()?;

    let mut config = SyncConfig::from_env_for(&args.account_id)?;
    if let Some(symbols) = args.symbols.as_deref() {
        config.symbols = parse_symbols(symbols);
    }
    info!(
        "启动交易同步服务: account_id={}, symbols={:?}",
        config.account_id, config.symbols
    );

    bootstrap::run(config).await
}
