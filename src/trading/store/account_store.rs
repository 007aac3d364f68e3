use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::observers::Observers;
use crate::trading::analysis::pnl_calculator;
use crate::trading::analysis::PortfolioMetrics;
use crate::trading::model::{
    AccountDelta, AccountSnapshot, OrderDelta, OrderRecord, PositionDelta, PositionRecord,
    PriceQuote, TrackedOrder, TrackedPosition,
};

pub type PositionSet = Arc<Vec<TrackedPosition>>;
pub type OrderSet = Arc<Vec<TrackedOrder>>;

/// 账户状态的一次完整快照
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    pub account: Option<AccountSnapshot>,
    pub positions: HashMap<String, TrackedPosition>,
    pub orders: HashMap<String, TrackedOrder>,
    pub prices: HashMap<String, PriceQuote>,
}

impl AccountState {
    fn leverage(&self) -> Decimal {
        self.account
            .as_ref()
            .map(|a| a.leverage)
            .unwrap_or(Decimal::ZERO)
    }

    /// 由完整记录建立持仓；已有报价时按报价定价
    fn track(&self, record: PositionRecord, leverage: Decimal) -> TrackedPosition {
        let mut position = TrackedPosition::from_record(record);
        if let Some(quote) = self.prices.get(&position.symbol) {
            pnl_calculator::apply_quote(&mut position, quote);
        }
        pnl_calculator::refresh_position(&mut position, leverage);
        position
    }

    fn sorted_positions(&self) -> PositionSet {
        let mut positions: Vec<TrackedPosition> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.open_time.cmp(&b.open_time).then_with(|| a.id.cmp(&b.id)));
        Arc::new(positions)
    }

    fn sorted_orders(&self) -> OrderSet {
        let mut orders: Vec<TrackedOrder> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
        Arc::new(orders)
    }
}

/// `update` 事件携带的增量
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub account: Option<AccountDelta>,
    pub updated_positions: Vec<PositionDelta>,
    pub removed_position_ids: Vec<String>,
    pub updated_orders: Vec<OrderDelta>,
    pub completed_order_ids: Vec<String>,
}

/// 增量合并结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub ignored_position_ids: Vec<String>,
    pub ignored_order_ids: Vec<String>,
}

/// 账户状态存储
///
/// 单写多读：只有同步协议处理器可以修改（写方法为 `pub(crate)`），
/// 其他组件通过读方法或订阅流获取数据。每次修改在一把写锁内完成，
/// 派生字段（净盈亏等）与原始字段同时更新，读者不会看到中间状态。
pub struct AccountStore {
    state: RwLock<AccountState>,
    account_observers: Observers<AccountSnapshot>,
    position_observers: Observers<PositionSet>,
    order_observers: Observers<OrderSet>,
    price_observers: Observers<PriceQuote>,
    symbol_price_observers: Mutex<HashMap<String, Observers<PriceQuote>>>,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AccountState::default()),
            account_observers: Observers::new(),
            position_observers: Observers::new(),
            order_observers: Observers::new(),
            price_observers: Observers::new(),
            symbol_price_observers: Mutex::new(HashMap::new()),
        }
    }

    // ---------------------------------------------------------------- 读

    pub fn account(&self) -> Option<AccountSnapshot> {
        self.read().account.clone()
    }

    pub fn position(&self, id: &str) -> Option<TrackedPosition> {
        self.read().positions.get(id).cloned()
    }

    /// 按开仓时间排序的持仓列表
    pub fn positions(&self) -> PositionSet {
        self.read().sorted_positions()
    }

    pub fn position_ids(&self) -> HashSet<String> {
        self.read().positions.keys().cloned().collect()
    }

    pub fn order(&self, id: &str) -> Option<TrackedOrder> {
        self.read().orders.get(id).cloned()
    }

    pub fn orders(&self) -> OrderSet {
        self.read().sorted_orders()
    }

    pub fn order_ids(&self) -> HashSet<String> {
        self.read().orders.keys().cloned().collect()
    }

    /// 当前连接建立后收到过报价才返回，否则为 None（未知）
    pub fn price(&self, symbol: &str) -> Option<PriceQuote> {
        self.read().prices.get(symbol).cloned()
    }

    pub fn snapshot(&self) -> AccountState {
        self.read().clone()
    }

    /// 当前持仓集合的汇总指标
    pub fn metrics(&self) -> PortfolioMetrics {
        let state = self.read();
        PortfolioMetrics::compute(state.positions.values())
    }

    // ---------------------------------------------------------------- 订阅

    pub fn subscribe_account(&self) -> mpsc::UnboundedReceiver<AccountSnapshot> {
        self.account_observers.subscribe()
    }

    pub fn subscribe_positions(&self) -> mpsc::UnboundedReceiver<PositionSet> {
        self.position_observers.subscribe()
    }

    pub fn subscribe_orders(&self) -> mpsc::UnboundedReceiver<OrderSet> {
        self.order_observers.subscribe()
    }

    /// 所有品种的报价
    pub fn subscribe_prices(&self) -> mpsc::UnboundedReceiver<PriceQuote> {
        self.price_observers.subscribe()
    }

    /// 单个品种的报价
    pub fn subscribe_price(&self, symbol: &str) -> mpsc::UnboundedReceiver<PriceQuote> {
        let mut registry = self
            .symbol_price_observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registry
            .entry(symbol.to_string())
            .or_insert_with(Observers::new)
            .subscribe()
    }

    // ---------------------------------------------------------------- 写（仅限同步协议处理器）

    /// 整体替换账户信息
    pub(crate) fn replace_account(&self, account: AccountSnapshot) {
        let positions = {
            let mut state = self.write();
            let leverage_changed = state.leverage() != account.leverage;
            state.account = Some(account.clone());
            if leverage_changed {
                let leverage = state.leverage();
                for position in state.positions.values_mut() {
                    pnl_calculator::refresh_position(position, leverage);
                }
                Some(state.sorted_positions())
            } else {
                None
            }
        };
        self.account_observers.publish(&account);
        if let Some(positions) = positions {
            self.position_observers.publish(&positions);
        }
    }

    /// 全量同步持仓：不在列表中的持仓视为已平仓
    pub(crate) fn replace_positions(&self, records: Vec<PositionRecord>) {
        let positions = {
            let mut state = self.write();
            let leverage = state.leverage();
            let mut next = HashMap::with_capacity(records.len());
            for record in records {
                let position = state.track(record, leverage);
                if next.insert(position.id.clone(), position).is_some() {
                    warn!("全量持仓中存在重复id，保留最后一条");
                }
            }
            let removed = state.positions.keys().filter(|id| !next.contains_key(*id)).count();
            if removed > 0 {
                debug!("全量同步移除{}个已不存在的持仓", removed);
            }
            state.positions = next;
            state.sorted_positions()
        };
        self.position_observers.publish(&positions);
    }

    /// 全量同步挂单，终态订单不保留
    pub(crate) fn replace_orders(&self, records: Vec<OrderRecord>) {
        let orders = {
            let mut state = self.write();
            state.orders = records
                .into_iter()
                .filter(|r| !r.state.is_terminal())
                .map(|r| (r.id.clone(), TrackedOrder::from(r)))
                .collect();
            state.sorted_orders()
        };
        self.order_observers.publish(&orders);
    }

    /// 应用报价，同时刷新对应品种的持仓，并合并附带的账户字段
    pub(crate) fn apply_prices(&self, quotes: Vec<PriceQuote>, account_delta: Option<AccountDelta>) {
        let (positions, account) = {
            let mut state = self.write();
            let leverage = state.leverage();
            let mut positions_changed = false;
            for quote in &quotes {
                for position in state
                    .positions
                    .values_mut()
                    .filter(|p| p.symbol == quote.symbol)
                {
                    pnl_calculator::apply_quote(position, quote);
                    pnl_calculator::refresh_position(position, leverage);
                    positions_changed = true;
                }
                state.prices.insert(quote.symbol.clone(), quote.clone());
            }
            let account = merge_account_delta(&mut state, account_delta.as_ref());
            let positions = positions_changed.then(|| state.sorted_positions());
            (positions, account)
        };

        for quote in &quotes {
            self.publish_price(quote);
        }
        if let Some(positions) = positions {
            self.position_observers.publish(&positions);
        }
        if let Some(account) = account {
            self.account_observers.publish(&account);
        }
    }

    /// 合并增量事件：只覆盖增量中出现的字段
    ///
    /// 不认识的 id 一律忽略，以下一次全量同步为准；唯一的例外是在途开仓指令认领的新实体
    /// （`claimed(id, tag)` 返回 true），且增量带齐了开仓字段。
    pub(crate) fn apply_update<F>(&self, update: AccountUpdate, claimed: F) -> UpdateOutcome
    where
        F: Fn(&str, Option<&str>) -> bool,
    {
        let mut outcome = UpdateOutcome::default();
        let (positions, orders, account) = {
            let mut state = self.write();
            let leverage = state.leverage();
            let mut positions_changed = false;
            let mut orders_changed = false;

            for delta in &update.updated_positions {
                if let Some(position) = state.positions.get_mut(&delta.id) {
                    delta.merge_into(position);
                    pnl_calculator::refresh_position(position, leverage);
                    positions_changed = true;
                } else if let Some(record) = delta
                    .as_record()
                    .filter(|r| claimed(&r.id, r.client_id.as_deref().or(r.comment.as_deref())))
                {
                    let position = state.track(record, leverage);
                    debug!("新增在途指令的持仓: id={}, symbol={}", position.id, position.symbol);
                    state.positions.insert(position.id.clone(), position);
                    positions_changed = true;
                } else {
                    warn!("收到未知持仓的增量更新，已忽略: id={}", delta.id);
                    outcome.ignored_position_ids.push(delta.id.clone());
                }
            }

            for id in &update.removed_position_ids {
                if state.positions.remove(id).is_some() {
                    positions_changed = true;
                }
            }

            for delta in &update.updated_orders {
                if let Some(order) = state.orders.get_mut(&delta.id) {
                    delta.merge_into(order);
                    if order.state.is_terminal() {
                        state.orders.remove(&delta.id);
                    }
                    orders_changed = true;
                } else if let Some(record) = delta
                    .as_record()
                    .filter(|r| claimed(&r.id, r.client_id.as_deref().or(r.comment.as_deref())))
                {
                    if !record.state.is_terminal() {
                        state.orders.insert(record.id.clone(), TrackedOrder::from(record));
                        orders_changed = true;
                    }
                } else {
                    warn!("收到未知订单的增量更新，已忽略: id={}", delta.id);
                    outcome.ignored_order_ids.push(delta.id.clone());
                }
            }

            for id in &update.completed_order_ids {
                if state.orders.remove(id).is_some() {
                    orders_changed = true;
                }
            }

            let account = merge_account_delta(&mut state, update.account.as_ref());
            (
                positions_changed.then(|| state.sorted_positions()),
                orders_changed.then(|| state.sorted_orders()),
                account,
            )
        };

        if let Some(positions) = positions {
            self.position_observers.publish(&positions);
        }
        if let Some(orders) = orders {
            self.order_observers.publish(&orders);
        }
        if let Some(account) = account {
            self.account_observers.publish(&account);
        }
        outcome
    }

    /// 新连接建立时清空报价，重新等待网关推送
    pub(crate) fn reset_prices(&self) {
        self.write().prices.clear();
    }

    fn publish_price(&self, quote: &PriceQuote) {
        self.price_observers.publish(quote);
        let registry = self
            .symbol_price_observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(observers) = registry.get(&quote.symbol) {
            observers.publish(quote);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AccountState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AccountState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn merge_account_delta(
    state: &mut AccountState,
    delta: Option<&AccountDelta>,
) -> Option<AccountSnapshot> {
    let delta = delta.filter(|d| !d.is_empty())?;
    match state.account.as_mut() {
        Some(account) => {
            delta.merge_into(account);
            Some(account.clone())
        }
        None => {
            debug!("尚未收到账户信息，忽略账户增量");
            None
        }
    }
}
