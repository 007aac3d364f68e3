//! 提交结果对账
//!
//! 网关不一定回显客户端的请求，因此按以下顺序在账户状态中寻找开仓结果：
//! 网关回报中的 positionId/orderId，其次是随指令发出的 clientId 标签，
//! 最后按品种、方向、手数以及开仓时间窗口匹配提交前不存在的持仓。

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::trading::model::{TrackedOrder, TrackedPosition, TradeSide};

/// 开仓后期望在账户状态中看到的结果
#[derive(Debug, Clone)]
pub struct OpenExpectation {
    pub symbol: String,
    pub side: TradeSide,
    pub volume: Decimal,
    pub tag: String,
    pub submitted_at: DateTime<Utc>,
    pub window: Duration,
}

/// 提交前已经存在的持仓与挂单
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    pub position_ids: HashSet<String>,
    pub order_ids: HashSet<String>,
}

/// 网关回报里带回的标识
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoedIds {
    pub position_id: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched {
    Position(String),
    Order(String),
}

pub fn match_opened(
    expect: &OpenExpectation,
    baseline: &Baseline,
    echoed: &EchoedIds,
    positions: &[TrackedPosition],
    orders: &[TrackedOrder],
) -> Option<Matched> {
    if let Some(id) = &echoed.position_id {
        if positions.iter().any(|p| &p.id == id) {
            return Some(Matched::Position(id.clone()));
        }
    }
    if let Some(id) = &echoed.order_id {
        // 市价单的 orderId 通常就是新持仓的 id
        if positions.iter().any(|p| &p.id == id) {
            return Some(Matched::Position(id.clone()));
        }
        if orders.iter().any(|o| &o.id == id) {
            return Some(Matched::Order(id.clone()));
        }
    }

    let new_positions = || {
        positions
            .iter()
            .filter(|p| !baseline.position_ids.contains(&p.id))
    };

    if let Some(p) = new_positions().find(|p| p.correlation_tag() == Some(expect.tag.as_str())) {
        return Some(Matched::Position(p.id.clone()));
    }
    if let Some(o) = orders
        .iter()
        .filter(|o| !baseline.order_ids.contains(&o.id))
        .find(|o| o.correlation_tag() == Some(expect.tag.as_str()))
    {
        return Some(Matched::Order(o.id.clone()));
    }

    let earliest = expect.submitted_at - expect.window;
    new_positions()
        .find(|p| {
            p.symbol == expect.symbol
                && p.side == expect.side
                && p.volume == expect.volume
                && p.open_time.map(|t| t >= earliest).unwrap_or(true)
        })
        .map(|p| Matched::Position(p.id.clone()))
}

/// 平仓完成：持仓已不在账户状态中
pub fn is_closed(position_id: &str, positions: &[TrackedPosition]) -> bool {
    !positions.iter().any(|p| p.id == position_id)
}

/// 修改完成：请求中设置的止损止盈都已生效
pub fn is_modified(
    position: &TrackedPosition,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> bool {
    stop_loss.map_or(true, |sl| position.stop_loss == Some(sl))
        && take_profit.map_or(true, |tp| position.take_profit == Some(tp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::PositionRecord;
    use rust_decimal_macros::dec;

    fn position(id: &str, client_id: Option<&str>, open_time: Option<DateTime<Utc>>) -> TrackedPosition {
        TrackedPosition::from_record(PositionRecord {
            id: id.to_string(),
            side: TradeSide::Buy,
            symbol: "EURUSD".to_string(),
            volume: dec!(0.1),
            open_price: dec!(1.085),
            time: open_time,
            current_price: None,
            stop_loss: None,
            take_profit: None,
            comment: None,
            client_id: client_id.map(|s| s.to_string()),
            magic: None,
            profit: None,
            unrealized_profit: None,
            swap: None,
            commission: None,
        })
    }

    fn expectation(submitted_at: DateTime<Utc>) -> OpenExpectation {
        OpenExpectation {
            symbol: "EURUSD".to_string(),
            side: TradeSide::Buy,
            volume: dec!(0.1),
            tag: "TE_abc".to_string(),
            submitted_at,
            window: Duration::seconds(5),
        }
    }

    #[test]
    fn test_prefers_echoed_then_tag() {
        let now = Utc::now();
        let positions = vec![position("1", None, Some(now)), position("2", Some("TE_abc"), Some(now))];
        let baseline = Baseline::default();

        let echoed = EchoedIds {
            position_id: Some("1".to_string()),
            order_id: None,
        };
        assert_eq!(
            match_opened(&expectation(now), &baseline, &echoed, &positions, &[]),
            Some(Matched::Position("1".to_string()))
        );
        assert_eq!(
            match_opened(&expectation(now), &baseline, &EchoedIds::default(), &positions, &[]),
            Some(Matched::Position("2".to_string()))
        );
    }

    #[test]
    fn test_fallback_ignores_existing_and_stale_positions() {
        let now = Utc::now();
        let mut baseline = Baseline::default();
        baseline.position_ids.insert("old".to_string());

        let positions = vec![
            position("old", None, Some(now)),
            position("stale", None, Some(now - Duration::seconds(60))),
        ];
        assert_eq!(
            match_opened(&expectation(now), &baseline, &EchoedIds::default(), &positions, &[]),
            None
        );

        let positions = vec![position("new", None, Some(now - Duration::seconds(2)))];
        assert_eq!(
            match_opened(&expectation(now), &baseline, &EchoedIds::default(), &positions, &[]),
            Some(Matched::Position("new".to_string()))
        );
    }

    #[test]
    fn test_close_and_modify_checks() {
        let mut p = position("1", None, None);
        assert!(!is_closed("1", std::slice::from_ref(&p)));
        assert!(is_closed("2", std::slice::from_ref(&p)));

        assert!(!is_modified(&p, Some(dec!(1.08)), None));
        p.stop_loss = Some(dec!(1.08));
        assert!(is_modified(&p, Some(dec!(1.08)), None));
    }
}
