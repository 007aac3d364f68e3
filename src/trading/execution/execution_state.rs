use std::fmt;

use crate::error::ExecutionError;

/// 成交确认：账户状态中已经出现对应的变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfirmation {
    pub request_id: String,
    pub position_id: Option<String>,
    pub order_id: Option<String>,
}

/// 执行器状态：`Idle → Validating → Submitting → {Confirmed | Rejected} → Idle`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Validating,
    Submitting,
    Confirmed(ExecutionConfirmation),
    Rejected(ExecutionError),
}

impl ExecutionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ExecutionState::Idle)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Idle => write!(f, "Idle"),
            ExecutionState::Validating => write!(f, "Validating"),
            ExecutionState::Submitting => write!(f, "Submitting"),
            ExecutionState::Confirmed(c) => write!(f, "Confirmed({})", c.request_id),
            ExecutionState::Rejected(e) => write!(f, "Rejected({})", e),
        }
    }
}
