mod common;

use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::time::timeout;

use common::*;
use rust_trade_sync::socket::ConnectionState;
use rust_trade_sync::trading::sync::SyncEvent;
use rust_trade_sync::trading::TradingCore;

#[tokio::test]
async fn test_handshake_wire_shape() {
    let (connector, mut sessions) = MockConnector::new(vec![], Outcome::Accept);
    let core = TradingCore::with_connector(test_config(), connector);
    core.connect();
    let mut session = next_session(&mut sessions).await;

    let subscribe = session.next_frame().await.unwrap();
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["accountId"], ACCOUNT_ID);
    assert_eq!(subscribe["application"], "MetaApi");
    assert_eq!(subscribe["instanceIndex"], 0);

    let synchronize = session.next_frame().await.unwrap();
    assert_eq!(synchronize["type"], "synchronize");
    assert_eq!(synchronize["accountId"], ACCOUNT_ID);
    assert_eq!(synchronize["host"], "ps-mpa-0");
    assert_eq!(synchronize["keepAlive"], true);
    assert!(!synchronize["synchronizationId"].as_str().unwrap().is_empty());
    assert!(!core.handler().is_synchronized());
}

#[tokio::test]
async fn test_synchronized_requires_matching_id() {
    let (connector, mut sessions) = MockConnector::new(vec![], Outcome::Accept);
    let core = TradingCore::with_connector(test_config(), connector);
    let mut events = core.subscribe_sync_events();
    core.connect();
    let mut session = next_session(&mut sessions).await;
    session.expect_type("subscribe").await;
    let sync_id = session.expect_type("synchronize").await["synchronizationId"]
        .as_str()
        .unwrap()
        .to_string();

    session.send_json(json!({
        "type": "synchronized", "accountId": ACCOUNT_ID, "synchronizationId": "someone-else"
    }));
    session.send_json(json!({
        "type": "synchronized", "accountId": "acct-2", "synchronizationId": sync_id
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!core.handler().is_synchronized());

    session.send_json(json!({
        "type": "synchronized", "accountId": ACCOUNT_ID, "synchronizationId": sync_id
    }));
    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(
        event,
        SyncEvent::Synchronized {
            synchronization_id: sync_id
        }
    );
    assert!(core.handler().is_synchronized());
}

#[tokio::test]
async fn test_full_sync_populates_store() {
    let positions = vec![
        position_json("1", "POSITION_TYPE_BUY", "EURUSD", 0.1, 1.0850),
        position_json("2", "POSITION_TYPE_SELL", "USDJPY", 1.0, 150.00),
    ];
    let (core, _session, _sessions, _connector) = connected_core(test_config(), positions).await;

    let account = core.store().account().unwrap();
    assert_eq!(account.leverage, dec!(100));
    assert_eq!(account.margin_level, None);

    let ids: HashSet<String> = core.store().position_ids();
    assert_eq!(ids, HashSet::from(["1".to_string(), "2".to_string()]));
    let jpy = core.store().position("2").unwrap();
    assert_eq!(jpy.pip_value, dec!(1000));
    assert_eq!(jpy.margin_used, dec!(150000));
}

#[tokio::test]
async fn test_update_for_unknown_position_is_ignored() {
    let positions = vec![position_json("1", "POSITION_TYPE_BUY", "EURUSD", 0.1, 1.0850)];
    let (core, session, _sessions, _connector) = connected_core(test_config(), positions).await;
    let mut position_sets = core.subscribe_positions();
    let before = core.store().position_ids();

    session.send_json(json!({
        "type": "update",
        "accountId": ACCOUNT_ID,
        "updatedPositions": [{"id": "404", "profit": 12.5}]
    }));
    // 字段齐全但没有在途指令认领，同样不能新建
    session.send_json(json!({
        "type": "update",
        "accountId": ACCOUNT_ID,
        "updatedPositions": [position_json("405", "POSITION_TYPE_BUY", "EURUSD", 0.1, 1.0850)]
    }));
    session.send_json(json!({
        "type": "update",
        "accountId": ACCOUNT_ID,
        "updatedPositions": [{"id": "1", "swap": -0.3}]
    }));

    let set = timeout(WAIT, position_sets.recv()).await.unwrap().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(core.store().position_ids(), before);
    assert!(core.store().position("404").is_none());
    assert!(core.store().position("405").is_none());
    assert_eq!(core.store().position("1").unwrap().swap, dec!(-0.3));
}

#[tokio::test]
async fn test_net_pl_invariant_after_updates() {
    let positions = vec![
        position_json("1", "POSITION_TYPE_BUY", "EURUSD", 0.1, 1.0850),
        position_json("2", "POSITION_TYPE_SELL", "GBPUSD", 0.2, 1.2700),
    ];
    let (core, session, _sessions, _connector) = connected_core(test_config(), positions).await;
    let mut position_sets = core.subscribe_positions();

    let updates = [
        json!({"updatedPositions": [{"id": "1", "profit": 15.2, "commission": -0.7}]}),
        json!({"updatedPositions": [{"id": "2", "swap": -1.25, "currentPrice": 1.2650, "profit": 100}]}),
        json!({"updatedPositions": [{"id": "1", "swap": 0.4}], "removedPositionIds": ["999"]}),
        json!({"updatedPositions": [{"id": "2", "commission": 2}]}),
    ];
    for mut update in updates {
        update["type"] = json!("update");
        update["accountId"] = json!(ACCOUNT_ID);
        session.send_json(update);
        timeout(WAIT, position_sets.recv()).await.unwrap().unwrap();

        for p in core.store().positions().iter() {
            assert_eq!(
                p.net_pl,
                p.unrealized_pl - p.commission.abs() - p.swap.abs(),
                "position {}",
                p.id
            );
        }
    }

    let first = core.store().position("1").unwrap();
    assert_eq!(first.net_pl, dec!(15.2) - dec!(0.7) - dec!(0.4));
}

#[tokio::test]
async fn test_price_unknown_until_received_and_reset_on_reconnect() {
    let positions = vec![position_json("1", "POSITION_TYPE_BUY", "EURUSD", 0.1, 1.0850)];
    let (core, session, mut sessions, _connector) = connected_core(test_config(), positions).await;
    let mut quotes = core.subscribe_prices("EURUSD");
    assert!(core.handler().price("EURUSD").is_none());

    session.send_json(json!({
        "type": "prices",
        "accountId": ACCOUNT_ID,
        "prices": [{"symbol": "EURUSD", "bid": 1.0870, "ask": 1.0872}],
        "equity": 10020
    }));
    let quote = timeout(WAIT, quotes.recv()).await.unwrap().unwrap();
    assert_eq!(quote.bid, dec!(1.0870));
    assert!(core.handler().price("EURUSD").is_some());

    let position = core.store().position("1").unwrap();
    assert_eq!(position.current_price, dec!(1.0870));
    assert_eq!(position.unrealized_pl, dec!(20));
    assert_eq!(core.store().account().unwrap().equity, dec!(10020));
    assert_eq!(core.store().account().unwrap().balance, dec!(10000));

    // 断线重连后旧报价不再可用
    drop(session);
    let mut session = next_session(&mut sessions).await;
    session.expect_type("synchronize").await;
    assert!(core.handler().price("EURUSD").is_none());
    assert!(!core.handler().is_synchronized());
}

#[tokio::test]
async fn test_symbols_resubscribed_after_reconnect() {
    let (core, mut session, mut sessions, _connector) = connected_core(test_config(), vec![]).await;

    core.subscribe_symbols(&["EURUSD".to_string(), "EURUSD".to_string()]);
    let frame = session.expect_type("subscribeToMarketData").await;
    assert_eq!(frame["symbol"], "EURUSD");
    assert_eq!(frame["accountId"], ACCOUNT_ID);
    session.assert_silent(Duration::from_millis(50)).await;

    drop(session);
    let mut session = next_session(&mut sessions).await;
    session.expect_type("subscribe").await;
    session.expect_type("synchronize").await;
    let frame = session.expect_type("subscribeToMarketData").await;
    assert_eq!(frame["symbol"], "EURUSD");
}

#[tokio::test]
async fn test_malformed_and_foreign_messages_are_dropped() {
    let (core, session, _sessions, _connector) = connected_core(test_config(), vec![]).await;
    let mut accounts = core.subscribe_account();

    session.send_text("{not json");
    session.send_json(json!({"accountId": ACCOUNT_ID}));
    session.send_json(json!({
        "type": "accountInformation",
        "accountId": "acct-2",
        "accountInformation": {"balance": 1, "equity": 1, "leverage": 1}
    }));
    session.send_json(json!({
        "type": "update",
        "accountId": ACCOUNT_ID,
        "accountInformation": {"balance": 10500}
    }));

    let account = timeout(WAIT, accounts.recv()).await.unwrap().unwrap();
    assert_eq!(account.balance, dec!(10500));
    assert_eq!(account.leverage, dec!(100));
    assert_eq!(core.channel().state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_history_events_are_forwarded() {
    let (core, session, _sessions, _connector) = connected_core(test_config(), vec![]).await;
    let mut events = core.subscribe_sync_events();

    session.send_json(json!({
        "type": "deals",
        "accountId": ACCOUNT_ID,
        "deals": [{
            "id": "d1", "type": "DEAL_TYPE_BUY", "symbol": "EURUSD", "volume": 0.1,
            "price": 1.085, "profit": 0, "commission": -0.7, "positionId": "1"
        }]
    }));

    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        SyncEvent::Deals(deals) => {
            assert_eq!(deals.len(), 1);
            assert_eq!(deals[0].commission, dec!(-0.7));
            assert_eq!(deals[0].swap, Decimal::ZERO);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_price_unknown_while_reconnecting() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let core = TradingCore::with_connector(test_config(), connector);
    let mut states = core.subscribe_connection_state();
    core.connect();
    let mut session = next_session(&mut sessions).await;
    synchronize(&core, &mut session, vec![]).await;

    let mut quotes = core.subscribe_prices("EURUSD");
    session.send_json(json!({
        "type": "prices",
        "accountId": ACCOUNT_ID,
        "prices": [{"symbol": "EURUSD", "bid": 1.0870, "ask": 1.0872}]
    }));
    timeout(WAIT, quotes.recv()).await.unwrap().unwrap();
    assert!(core.handler().price("EURUSD").is_some());

    drop(session);
    loop {
        if let ConnectionState::Reconnecting { .. } = next_state(&mut states).await {
            break;
        }
    }
    timeout(WAIT, async {
        while core.handler().price("EURUSD").is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stale quote still reported while reconnecting");
    assert!(!core.channel().state().is_connected());
}
