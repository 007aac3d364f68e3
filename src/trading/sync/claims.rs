use std::collections::HashMap;

use crate::trading::sync::protocol::TradeResult;

/// 开仓指令对新实体的认领依据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OpenClaim {
    tag: String,
    position_id: Option<String>,
    order_id: Option<String>,
}

/// 在途开仓指令的认领表，按 requestId 索引
///
/// `update` 中不认识的 id 只有被这里认领时才会进入账户状态，其余等待下一次全量同步。
#[derive(Debug, Default)]
pub(crate) struct OpenClaims {
    by_request: HashMap<String, OpenClaim>,
}

impl OpenClaims {
    pub(crate) fn register(&mut self, request_id: &str, tag: &str) {
        self.by_request.insert(
            request_id.to_string(),
            OpenClaim {
                tag: tag.to_string(),
                ..OpenClaim::default()
            },
        );
    }

    /// 记录网关回报中带回的持仓/订单 id
    pub(crate) fn record_echo(&mut self, request_id: &str, result: &TradeResult) {
        if let Some(claim) = self.by_request.get_mut(request_id) {
            claim.position_id = result.position_id.clone();
            claim.order_id = result.order_id.clone();
        }
    }

    pub(crate) fn release(&mut self, request_id: &str) {
        self.by_request.remove(request_id);
    }

    pub(crate) fn clear(&mut self) {
        self.by_request.clear();
    }

    pub(crate) fn claims(&self, id: &str, tag: Option<&str>) -> bool {
        self.by_request.values().any(|claim| {
            claim.position_id.as_deref() == Some(id)
                || claim.order_id.as_deref() == Some(id)
                || tag == Some(claim.tag.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_by_tag_or_echoed_id() {
        let mut claims = OpenClaims::default();
        assert!(!claims.claims("1", Some("TE_a")));

        claims.register("req-1", "TE_a");
        assert!(claims.claims("1", Some("TE_a")));
        assert!(!claims.claims("1", Some("TE_b")));
        assert!(!claims.claims("42", None));

        claims.record_echo(
            "req-1",
            &TradeResult {
                string_code: Some("TRADE_RETCODE_DONE".to_string()),
                position_id: Some("42".to_string()),
                ..TradeResult::default()
            },
        );
        assert!(claims.claims("42", None));

        claims.release("req-1");
        assert!(!claims.claims("42", Some("TE_a")));
    }
}
