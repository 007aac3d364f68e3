use std::time::Duration;

use crate::app_config::env::{env_opt_u32, env_or_default, env_required, env_u64};
use crate::error::{AppError, AppResult};
use crate::socket::ReconnectConfig;
use crate::trading::execution::ExecutionConfig;

/// 同步核心的入站配置
///
/// endpoint / account_id / auth_token 由外部会话提供，每次连接使用一次，
/// 核心不会自行获取或刷新这些值。
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub endpoint: String,
    pub account_id: String,
    pub auth_token: String,
    pub application: String,
    pub instance_index: u32,
    pub host: String,
    pub symbols: Vec<String>,
    pub reconnect: ReconnectConfig,
    pub execution: ExecutionConfig,
}

impl SyncConfig {
    pub fn new(endpoint: &str, account_id: &str, auth_token: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            account_id: account_id.to_string(),
            auth_token: auth_token.to_string(),
            application: "MetaApi".to_string(),
            instance_index: 0,
            host: "ps-mpa-0".to_string(),
            symbols: Vec::new(),
            reconnect: ReconnectConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_env_for(&env_required("SYNC_ACCOUNT_ID")?)
    }

    /// 账户由调用方指定，其余配置读取环境变量
    pub fn from_env_for(account_id: &str) -> AppResult<Self> {
        let mut config = Self::new(
            &env_required("SYNC_ENDPOINT")?,
            account_id,
            &env_required("SYNC_AUTH_TOKEN")?,
        );
        config.application = env_or_default("SYNC_APPLICATION", "MetaApi");
        config.instance_index = parse_instance_index(env_u64("SYNC_INSTANCE_INDEX", 0))?;
        config.host = env_or_default("SYNC_HOST", "ps-mpa-0");
        config.symbols = parse_symbols(&env_or_default("SYNC_SYMBOLS", ""));
        config.reconnect = ReconnectConfig {
            base_delay: Duration::from_millis(env_u64("RECONNECT_BASE_DELAY_MS", 1_000)),
            max_delay: Duration::from_millis(env_u64("RECONNECT_MAX_DELAY_MS", 30_000)),
            max_attempts: env_opt_u32("RECONNECT_MAX_ATTEMPTS"),
        };
        config.execution = ExecutionConfig {
            confirmation_timeout: Duration::from_millis(env_u64("EXECUTION_TIMEOUT_MS", 30_000)),
            ..ExecutionConfig::default()
        };
        Ok(config)
    }

    /// 带鉴权参数的连接地址
    pub fn connect_url(&self) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}auth-token={}", self.endpoint, separator, self.auth_token)
    }
}

/// 实例序号超出 u32 时直接报配置错误，不截断
pub fn parse_instance_index(raw: u64) -> AppResult<u32> {
    u32::try_from(raw).map_err(|_| {
        AppError::ConfigError(format!("SYNC_INSTANCE_INDEX 超出范围: {}", raw))
    })
}

/// 解析逗号分隔的品种列表
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_appends_token() {
        let config = SyncConfig::new("wss://gateway.example/ws", "acct-1", "tok");
        assert_eq!(config.connect_url(), "wss://gateway.example/ws?auth-token=tok");

        let config = SyncConfig::new("wss://gateway.example/ws?region=eu", "acct-1", "tok");
        assert_eq!(
            config.connect_url(),
            "wss://gateway.example/ws?region=eu&auth-token=tok"
        );
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols(" EURUSD, USDJPY.pro,,"), vec!["EURUSD", "USDJPY.pro"]);
        assert!(parse_symbols("").is_empty());
    }

    #[test]
    fn test_instance_index_out_of_range() {
        assert_eq!(parse_instance_index(3).unwrap(), 3);
        assert!(matches!(
            parse_instance_index(u64::from(u32::MAX) + 1),
            Err(AppError::ConfigError(_))
        ));
    }
}
