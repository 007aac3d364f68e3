use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::trading::model::{ExecutionRequest, TradeSide};

/// 开仓请求校验，在任何网络请求之前完成
pub fn validate_request(request: &ExecutionRequest) -> Result<(), ValidationError> {
    if request.symbol.trim().is_empty() {
        return Err(ValidationError::InvalidSymbol);
    }
    if request.volume <= Decimal::ZERO {
        return Err(ValidationError::InvalidVolume(request.volume.to_string()));
    }
    validate_protection(request.side, request.stop_loss, request.take_profit)
}

/// 止损止盈同时设置时：多单止损必须低于止盈，空单相反
pub fn validate_protection(
    side: TradeSide,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Result<(), ValidationError> {
    let (Some(stop_loss), Some(take_profit)) = (stop_loss, take_profit) else {
        return Ok(());
    };
    let ordered = match side {
        TradeSide::Buy => stop_loss < take_profit,
        TradeSide::Sell => stop_loss > take_profit,
    };
    if ordered {
        Ok(())
    } else {
        Err(ValidationError::InvalidStopLoss {
            side: side.to_string(),
            stop_loss: stop_loss.to_string(),
            take_profit: take_profit.to_string(),
        })
    }
}
