use rust_decimal::Decimal;
use serde::Serialize;

use crate::trading::model::TrackedPosition;

/// 持仓集合的汇总指标
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    pub position_count: usize,
    pub winning_count: usize,
    pub losing_count: usize,
    /// 胜率（百分比），空集合为 0
    pub win_rate: Decimal,
    /// 盈利持仓净盈亏均值
    pub average_win: Decimal,
    /// 亏损持仓净盈亏绝对值均值
    pub average_loss: Decimal,
    /// average_win / average_loss，没有亏损时为 0
    pub profit_factor: Decimal,
    pub total_net_pl: Decimal,
    pub total_unrealized_pl: Decimal,
    pub total_margin_used: Decimal,
}

impl PortfolioMetrics {
    pub fn compute<'a, I>(positions: I) -> Self
    where
        I: IntoIterator<Item = &'a TrackedPosition>,
    {
        let mut metrics = PortfolioMetrics::default();
        let mut win_sum = Decimal::ZERO;
        let mut loss_sum = Decimal::ZERO;

        for position in positions {
            metrics.position_count += 1;
            metrics.total_net_pl += position.net_pl;
            metrics.total_unrealized_pl += position.unrealized_pl;
            metrics.total_margin_used += position.margin_used;

            if position.net_pl > Decimal::ZERO {
                metrics.winning_count += 1;
                win_sum += position.net_pl;
            } else if position.net_pl < Decimal::ZERO {
                metrics.losing_count += 1;
                loss_sum += position.net_pl.abs();
            }
        }

        metrics.win_rate = ratio(metrics.winning_count, metrics.position_count) * Decimal::ONE_HUNDRED;
        metrics.average_win = mean(win_sum, metrics.winning_count);
        metrics.average_loss = mean(loss_sum, metrics.losing_count);
        metrics.profit_factor = if metrics.average_loss.is_zero() {
            Decimal::ZERO
        } else {
            metrics.average_win / metrics.average_loss
        };
        metrics
    }
}

fn ratio(part: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(part) / Decimal::from(total)
}

fn mean(sum: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    sum / Decimal::from(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::model::{PositionRecord, TradeSide};
    use rust_decimal_macros::dec;

    fn position_with_net(id: &str, net_pl: Decimal) -> TrackedPosition {
        let mut position = TrackedPosition::from_record(PositionRecord {
            id: id.to_string(),
            side: TradeSide::Buy,
            symbol: "EURUSD".to_string(),
            volume: dec!(0.1),
            open_price: dec!(1.1),
            time: None,
            current_price: None,
            stop_loss: None,
            take_profit: None,
            comment: None,
            client_id: None,
            magic: None,
            profit: None,
            unrealized_profit: None,
            swap: None,
            commission: None,
        });
        position.unrealized_pl = net_pl;
        position.net_pl = net_pl;
        position
    }

    #[test]
    fn test_empty_set_has_zero_rates() {
        let metrics = PortfolioMetrics::compute(&Vec::<TrackedPosition>::new());
        assert_eq!(metrics.win_rate, Decimal::ZERO);
        assert_eq!(metrics.profit_factor, Decimal::ZERO);
        assert_eq!(metrics.average_win, Decimal::ZERO);
    }

    #[test]
    fn test_no_losses_gives_zero_profit_factor() {
        let positions = vec![position_with_net("1", dec!(10)), position_with_net("2", dec!(30))];
        let metrics = PortfolioMetrics::compute(&positions);
        assert_eq!(metrics.win_rate, dec!(100));
        assert_eq!(metrics.average_win, dec!(20));
        assert_eq!(metrics.profit_factor, Decimal::ZERO);
    }

    #[test]
    fn test_mixed_positions() {
        let positions = vec![
            position_with_net("1", dec!(30)),
            position_with_net("2", dec!(-10)),
            position_with_net("3", dec!(-20)),
            position_with_net("4", dec!(10)),
        ];
        let metrics = PortfolioMetrics::compute(&positions);
        assert_eq!(metrics.win_rate, dec!(50));
        assert_eq!(metrics.average_win, dec!(20));
        assert_eq!(metrics.average_loss, dec!(15));
        assert_eq!(metrics.total_net_pl, dec!(10));
        assert_eq!(metrics.profit_factor.round_dp(4), dec!(1.3333));
    }
}
