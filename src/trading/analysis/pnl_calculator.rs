//! 持仓盈亏与风险计算
//!
//! 全部是无状态的纯函数，金额统一使用 `Decimal`，避免增量更新中累积二进制浮点误差。

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::trading::model::{PriceQuote, TrackedPosition, TradeSide};

/// 标准手合约单位
pub const CONTRACT_SIZE: Decimal = dec!(100000);

const JPY_PIP_SIZE: Decimal = dec!(0.01);
const DEFAULT_PIP_SIZE: Decimal = dec!(0.0001);

/// 点值大小：日元相关品种 0.01，其他 0.0001
pub fn pip_size(symbol: &str) -> Decimal {
    if symbol.to_uppercase().contains("JPY") {
        JPY_PIP_SIZE
    } else {
        DEFAULT_PIP_SIZE
    }
}

/// 每点价值 = volume × 合约单位 × 点值大小
pub fn pip_value(symbol: &str, volume: Decimal) -> Decimal {
    volume * CONTRACT_SIZE * pip_size(symbol)
}

/// 按方向计算的价格变化（对持仓有利为正）
fn signed_move(side: TradeSide, open_price: Decimal, current_price: Decimal) -> Decimal {
    match side {
        TradeSide::Buy => current_price - open_price,
        TradeSide::Sell => open_price - current_price,
    }
}

/// 价格变化盈亏
pub fn price_change_pl(
    side: TradeSide,
    open_price: Decimal,
    current_price: Decimal,
    volume: Decimal,
) -> Decimal {
    signed_move(side, open_price, current_price) * volume * CONTRACT_SIZE
}

/// 盈亏点数，与金额盈亏相互独立
pub fn pips_profit(
    symbol: &str,
    side: TradeSide,
    open_price: Decimal,
    current_price: Decimal,
) -> Decimal {
    signed_move(side, open_price, current_price) / pip_size(symbol)
}

/// 价格变动百分比
pub fn price_change_percent(side: TradeSide, open_price: Decimal, current_price: Decimal) -> Decimal {
    if open_price.is_zero() {
        return Decimal::ZERO;
    }
    signed_move(side, open_price, current_price) / open_price * Decimal::ONE_HUNDRED
}

/// 占用保证金 = volume × 合约单位 × 开仓价 / 杠杆；杠杆未知时无法计算
pub fn margin(volume: Decimal, open_price: Decimal, leverage: Decimal) -> Option<Decimal> {
    if leverage <= Decimal::ZERO {
        return None;
    }
    Some(volume * CONTRACT_SIZE * open_price / leverage)
}

/// 盈亏比 reward / risk，止损止盈任一缺失或风险为零时未定义
pub fn risk_reward_ratio(
    open_price: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Option<Decimal> {
    let (stop_loss, take_profit) = (stop_loss?, take_profit?);
    let risk = (open_price - stop_loss).abs();
    if risk.is_zero() {
        return None;
    }
    let reward = (take_profit - open_price).abs();
    Some(reward / risk)
}

/// 净盈亏 = 未实现盈亏 - |手续费| - |隔夜利息|
pub fn net_pl(unrealized_pl: Decimal, commission: Decimal, swap: Decimal) -> Decimal {
    unrealized_pl - commission.abs() - swap.abs()
}

/// 点差成本 = 点差 × volume × 合约单位
pub fn spread_cost(spread: Decimal, volume: Decimal) -> Decimal {
    spread * volume * CONTRACT_SIZE
}

/// 用最新报价更新持仓价格：多单按 bid 平仓，空单按 ask 平仓
pub fn apply_quote(position: &mut TrackedPosition, quote: &PriceQuote) {
    position.bid = quote.bid;
    position.ask = quote.ask;
    position.current_price = match position.side {
        TradeSide::Buy => quote.bid,
        TradeSide::Sell => quote.ask,
    };
    position.unrealized_pl = price_change_pl(
        position.side,
        position.open_price,
        position.current_price,
        position.volume,
    );
}

/// 重新计算持仓的全部派生字段，每次修改持仓后都必须调用
pub fn refresh_position(position: &mut TrackedPosition, leverage: Decimal) {
    position.net_pl = net_pl(position.unrealized_pl, position.commission, position.swap);
    position.unrealized_pl_percent =
        price_change_percent(position.side, position.open_price, position.current_price);
    position.pip_value = pip_value(&position.symbol, position.volume);
    position.pips_profit = pips_profit(
        &position.symbol,
        position.side,
        position.open_price,
        position.current_price,
    );
    position.spread = (position.ask - position.bid).max(Decimal::ZERO);
    position.spread_cost = spread_cost(position.spread, position.volume);
    position.margin_used =
        margin(position.volume, position.open_price, leverage).unwrap_or(Decimal::ZERO);
    position.risk_reward =
        risk_reward_ratio(position.open_price, position.stop_loss, position.take_profit);
}
