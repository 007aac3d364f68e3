use chrono::NaiveDateTime;

const BROKER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// 解析经纪商服务器时间，如 `2020-04-15 05:43:45.137`，时区由经纪商决定
pub fn parse_broker_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), BROKER_TIME_FORMAT).ok()
}
