use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::time_util;

/// 品种最新报价，每个品种只保留最后一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    /// 经纪商服务器时间，如 `2020-04-15 05:43:45.137`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl PriceQuote {
    /// (bid + ask) / 2
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// ask - bid
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn broker_datetime(&self) -> Option<NaiveDateTime> {
        self.broker_time.as_deref().and_then(time_util::parse_broker_time)
    }
}
