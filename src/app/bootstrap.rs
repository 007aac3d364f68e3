use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::app_config::SyncConfig;
use crate::socket::ConnectionState;
use crate::trading::TradingCore;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// 应用入口总编排：连接/同步/心跳/信号/优雅关闭
pub async fn run(config: SyncConfig) -> anyhow::Result<()> {
    let core = Arc::new(TradingCore::new(config));

    // 连接状态只记日志，重连期间属于临时状态
    let mut states = core.subscribe_connection_state();
    let state_handle = tokio::spawn(async move {
        while let Some(state) = states.recv().await {
            match &state {
                ConnectionState::Failed { reason } => error!("❌ 连接失败: {}", reason),
                ConnectionState::Reconnecting { attempt } => warn!("🔄 正在重连, 第{}次", attempt),
                other => info!("连接状态: {}", other),
            }
        }
    });

    core.connect();

    // 心跳任务，定期输出账户与持仓概况
    let heartbeat_core = Arc::clone(&core);
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            let handler = heartbeat_core.handler();
            let metrics = heartbeat_core.store().metrics();
            info!(
                "💓 连接状态: {}, 已同步: {}, 持仓数: {}, 净盈亏: {}, 占用保证金: {}",
                heartbeat_core.channel().state(),
                handler.is_synchronized(),
                metrics.position_count,
                metrics.total_net_pl,
                metrics.total_margin_used
            );
            if let Some(account) = heartbeat_core.store().account() {
                info!(
                    "📊 账户: balance={}, equity={}, free_margin={}",
                    account.balance, account.equity, account.free_margin
                );
            }
        }
    });

    let signal_name = shutdown_signal().await;
    info!("接收到 {} 信号，开始优雅关闭...", signal_name);
    heartbeat_handle.abort();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, core.shutdown())
        .await
        .is_err()
    {
        error!("关闭超时 ({:?})", SHUTDOWN_TIMEOUT);
    }
    state_handle.abort();

    info!("应用已优雅退出");
    Ok(())
}

/// 等待退出信号
async fn shutdown_signal() -> &'static str {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                return tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                };
            }
            _ => warn!("注册unix信号失败，改为监听Ctrl+C"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!("监听Ctrl+C失败: {}", e);
    }
    "CTRL+C"
}
