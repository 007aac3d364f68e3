use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::observers::Observers;
use crate::trading::execution::execution_state::{ExecutionConfirmation, ExecutionState};
use crate::trading::execution::reconcile::{self, Baseline, EchoedIds, Matched, OpenExpectation};
use crate::trading::execution::validation;
use crate::trading::execution::ExecutionConfig;
use crate::trading::model::{ExecutionRequest, TrackedOrder, TrackedPosition, TradeSide};
use crate::trading::store::{AccountStore, OrderSet, PositionSet};
use crate::trading::sync::{PendingTrade, SynchronizationHandler, TradeAction, TradeCommand};

const CLIENT_TAG_PREFIX: &str = "TE_";

/// 交易执行协调器
///
/// 同一时间只允许一笔交易在途：第二个请求立即返回 `Busy`，不会排队。
/// 提交后以账户状态的变化作为成交确认，超时返回 `Timeout`；无论结果如何最终回到 `Idle`。
pub struct TradeExecutionCoordinator {
    handler: SynchronizationHandler,
    store: Arc<AccountStore>,
    config: ExecutionConfig,
    in_flight: AtomicBool,
    state: Mutex<ExecutionState>,
    observers: Observers<ExecutionState>,
}

/// 提交后要在账户状态中观察到的结果
enum Target {
    Opened(OpenExpectation),
    Closed { position_id: String },
    Modified {
        position_id: String,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
}

enum Intent {
    Open(ExecutionRequest),
    Close {
        position_id: String,
    },
    Modify {
        position_id: String,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
}

// 在途标记，离开作用域时清除；被中途取消时同样把状态恢复为 Idle
struct InFlightGuard<'a> {
    coordinator: &'a TradeExecutionCoordinator,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let coordinator = self.coordinator;
        {
            let mut state = coordinator.lock_state();
            if !state.is_idle() {
                *state = ExecutionState::Idle;
                coordinator.observers.publish(&state);
            }
        }
        coordinator.in_flight.store(false, Ordering::Release);
    }
}

impl TradeExecutionCoordinator {
    pub fn new(
        handler: SynchronizationHandler,
        store: Arc<AccountStore>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            handler,
            store,
            config,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ExecutionState::Idle),
            observers: Observers::new(),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.lock_state().clone()
    }

    /// 订阅执行状态变化
    pub fn subscribe_state(&self) -> mpsc::UnboundedReceiver<ExecutionState> {
        self.observers.subscribe()
    }

    pub async fn submit_execution(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        let _guard = self.begin()?;
        self.execute(Intent::Open(request)).await
    }

    /// 市价买入
    pub async fn quick_buy(
        &self,
        symbol: &str,
        volume: Decimal,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        self.submit_execution(ExecutionRequest::market(symbol, TradeSide::Buy, volume))
            .await
    }

    /// 市价卖出
    pub async fn quick_sell(
        &self,
        symbol: &str,
        volume: Decimal,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        self.submit_execution(ExecutionRequest::market(symbol, TradeSide::Sell, volume))
            .await
    }

    pub async fn close_position(
        &self,
        position_id: &str,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        let _guard = self.begin()?;
        self.execute(Intent::Close {
            position_id: position_id.to_string(),
        })
        .await
    }

    /// 修改持仓止损止盈，未传入的一侧保持不变
    pub async fn modify_position(
        &self,
        position_id: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        let _guard = self.begin()?;
        self.execute(Intent::Modify {
            position_id: position_id.to_string(),
            stop_loss,
            take_profit,
        })
        .await
    }

    fn begin(&self) -> Result<InFlightGuard<'_>, ExecutionError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!("已有交易在执行中，拒绝新的请求");
                ExecutionError::Busy
            })?;
        Ok(InFlightGuard { coordinator: self })
    }

    async fn execute(&self, intent: Intent) -> Result<ExecutionConfirmation, ExecutionError> {
        self.transition(ExecutionState::Validating);
        let result = self.run(intent).await;
        match &result {
            Ok(confirmation) => {
                info!(
                    "✅ 交易已确认: request_id={}, position_id={:?}, order_id={:?}",
                    confirmation.request_id, confirmation.position_id, confirmation.order_id
                );
                self.transition(ExecutionState::Confirmed(confirmation.clone()));
            }
            Err(e) => {
                warn!("交易被拒绝: {}", e);
                self.transition(ExecutionState::Rejected(e.clone()));
            }
        }
        self.transition(ExecutionState::Idle);
        result
    }

    async fn run(&self, intent: Intent) -> Result<ExecutionConfirmation, ExecutionError> {
        if let Intent::Open(request) = &intent {
            validation::validate_request(request)?;
        }
        if !self.handler.is_connected() || !self.handler.is_synchronized() {
            return Err(ExecutionError::NotConnected);
        }
        let (command, target) = self.prepare(intent)?;

        self.transition(ExecutionState::Submitting);
        // 先订阅再发送，避免漏掉回报之前到达的状态变化
        let positions = self.store.subscribe_positions();
        let orders = self.store.subscribe_orders();
        let baseline = Baseline {
            position_ids: self.store.position_ids(),
            order_ids: self.store.order_ids(),
        };

        let pending = self.handler.send_trade(command)?;
        let request_id = pending.request_id.clone();
        let result = self
            .await_confirmation(&target, &baseline, pending, positions, orders)
            .await;
        self.handler.release_trade(&request_id);
        result
    }

    /// 构造交易指令；平仓和修改需要持仓仍然存在
    fn prepare(&self, intent: Intent) -> Result<(TradeCommand, Target), ExecutionError> {
        match intent {
            Intent::Open(request) => {
                let tag = request
                    .tag
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", CLIENT_TAG_PREFIX, Uuid::new_v4().simple()));
                let action_type = match request.side {
                    TradeSide::Buy => TradeAction::Buy,
                    TradeSide::Sell => TradeAction::Sell,
                };
                let command = TradeCommand {
                    action_type,
                    symbol: Some(request.symbol.clone()),
                    volume: Some(request.volume),
                    stop_loss: request.stop_loss,
                    take_profit: request.take_profit,
                    position_id: None,
                    comment: request.comment.clone(),
                    client_id: Some(tag.clone()),
                };
                let window = chrono::Duration::from_std(self.config.reconciliation_window)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                let target = Target::Opened(OpenExpectation {
                    symbol: request.symbol,
                    side: request.side,
                    volume: request.volume,
                    tag,
                    submitted_at: Utc::now(),
                    window,
                });
                Ok((command, target))
            }
            Intent::Close { position_id } => {
                let position = self.require_position(&position_id)?;
                validation::validate_request(&ExecutionRequest::market(
                    &position.symbol,
                    position.side,
                    position.volume,
                ))?;
                Ok((
                    TradeCommand::close_position(&position_id),
                    Target::Closed { position_id },
                ))
            }
            Intent::Modify {
                position_id,
                stop_loss,
                take_profit,
            } => {
                let position = self.require_position(&position_id)?;
                // 只修改一侧时与持仓现有的另一侧比较
                validation::validate_protection(
                    position.side,
                    stop_loss.or(position.stop_loss),
                    take_profit.or(position.take_profit),
                )?;
                Ok((
                    TradeCommand::modify_position(&position_id, stop_loss, take_profit),
                    Target::Modified {
                        position_id,
                        stop_loss,
                        take_profit,
                    },
                ))
            }
        }
    }

    async fn await_confirmation(
        &self,
        target: &Target,
        baseline: &Baseline,
        pending: PendingTrade,
        mut positions: mpsc::UnboundedReceiver<PositionSet>,
        mut orders: mpsc::UnboundedReceiver<OrderSet>,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        let PendingTrade {
            request_id,
            mut reply,
        } = pending;
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout;
        let mut echoed = EchoedIds::default();
        let mut awaiting_reply = true;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(ExecutionError::Timeout);
                }
                outcome = &mut reply, if awaiting_reply => {
                    awaiting_reply = false;
                    match outcome {
                        Ok(Ok(result)) => {
                            if !result.is_success() {
                                return Err(ExecutionError::Gateway {
                                    code: result.code(),
                                    message: result.message.unwrap_or_default(),
                                });
                            }
                            debug!("网关已受理: request_id={}, code={}", request_id, result.code());
                            echoed = EchoedIds {
                                position_id: result.position_id,
                                order_id: result.order_id,
                            };
                        }
                        Ok(Err(e)) => return Err(e),
                        Err(_) => debug!("交易回报通道已关闭，继续等待账户状态"),
                    }
                    let positions_now = self.store.positions();
                    let orders_now = self.store.orders();
                    if let Some(done) = self.check(target, baseline, &echoed, &request_id, &positions_now, &orders_now)? {
                        return Ok(done);
                    }
                }
                Some(set) = positions.recv() => {
                    let orders_now = self.store.orders();
                    if let Some(done) = self.check(target, baseline, &echoed, &request_id, &set, &orders_now)? {
                        return Ok(done);
                    }
                }
                Some(set) = orders.recv() => {
                    let positions_now = self.store.positions();
                    if let Some(done) = self.check(target, baseline, &echoed, &request_id, &positions_now, &set)? {
                        return Ok(done);
                    }
                }
            }
        }
    }

    fn check(
        &self,
        target: &Target,
        baseline: &Baseline,
        echoed: &EchoedIds,
        request_id: &str,
        positions: &[TrackedPosition],
        orders: &[TrackedOrder],
    ) -> Result<Option<ExecutionConfirmation>, ExecutionError> {
        let confirmation = |position_id: Option<String>, order_id: Option<String>| {
            ExecutionConfirmation {
                request_id: request_id.to_string(),
                position_id,
                order_id,
            }
        };
        match target {
            Target::Opened(expect) => {
                Ok(
                    reconcile::match_opened(expect, baseline, echoed, positions, orders).map(
                        |matched| match matched {
                            Matched::Position(id) => confirmation(Some(id), echoed.order_id.clone()),
                            Matched::Order(id) => confirmation(None, Some(id)),
                        },
                    ),
                )
            }
            Target::Closed { position_id } => Ok(reconcile::is_closed(position_id, positions)
                .then(|| confirmation(Some(position_id.clone()), echoed.order_id.clone()))),
            Target::Modified {
                position_id,
                stop_loss,
                take_profit,
            } => match positions.iter().find(|p| &p.id == position_id) {
                Some(position) => Ok(reconcile::is_modified(position, *stop_loss, *take_profit)
                    .then(|| confirmation(Some(position_id.clone()), None))),
                None => Err(ExecutionError::PositionNotFound(position_id.clone())),
            },
        }
    }

    fn require_position(&self, position_id: &str) -> Result<TrackedPosition, ExecutionError> {
        self.store
            .position(position_id)
            .ok_or_else(|| ExecutionError::PositionNotFound(position_id.to_string()))
    }

    fn transition(&self, next: ExecutionState) {
        let mut state = self.lock_state();
        debug!("执行状态: {} -> {}", state, next);
        *state = next;
        self.observers.publish(&state);
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecutionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
