use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use proptest::prelude::*;

use notihub::notifications::{HandlerFailure, HandlerResult, NotificationHub, SubscriptionToken};

/// Subscribe a handler that appends `label` to `log`
fn subscribe_label(hub: &NotificationHub<u32>, kind: &str, label: usize, log: &Arc<Mutex<Vec<usize>>>) -> SubscriptionToken {
    let log = Arc::clone(log);
    hub.subscribe_fn(kind, move |_: &u32| {
        log.lock().push(label);
        Ok(())
    })
}

#[derive(Debug, Clone)]
enum Op {
    Subscribe,
    Unsubscribe(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Subscribe),
        1 => (0usize..32).prop_map(Op::Unsubscribe),
    ]
}

proptest! {
    /// Invocation order always equals registration order of the survivors
    #[test]
    fn prop_publish_order_matches_surviving_registrations(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let hub: NotificationHub<u32> = NotificationHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut live: Vec<(usize, SubscriptionToken)> = Vec::new();
        let mut next_label = 0;

        for op in ops {
            match op {
                Op::Subscribe => {
                    live.push((next_label, subscribe_label(&hub, "x", next_label, &log)));
                    next_label += 1;
                }
                Op::Unsubscribe(pick) if !live.is_empty() => {
                    let (_, token) = live.remove(pick % live.len());
                    prop_assert!(hub.unsubscribe(&token));
                    prop_assert!(!hub.unsubscribe(&token));
                }
                Op::Unsubscribe(_) => {}
            }
        }

        let report = hub.publish("x", &0);
        let expected: Vec<usize> = live.iter().map(|(label, _)| *label).collect();
        prop_assert_eq!(log.lock().clone(), expected);
        prop_assert_eq!(report.len(), live.len());
        prop_assert_eq!(hub.subscriber_count("x"), live.len());
        for (outcome, (_, token)) in report.outcomes().iter().zip(&live) {
            prop_assert_eq!(&outcome.token, token);
        }
    }

    /// Failures anywhere in the list never stop later handlers
    #[test]
    fn prop_failures_are_isolated(failing in prop::collection::vec(any::<bool>(), 1..20)) {
        let hub: NotificationHub<u32> = NotificationHub::new();
        let invoked = Arc::new(AtomicUsize::new(0));

        for fails in &failing {
            let invoked = Arc::clone(&invoked);
            let fails = *fails;
            hub.subscribe_fn("x", move |_: &u32| {
                invoked.fetch_add(1, Ordering::SeqCst);
                if fails { Err(HandlerFailure::failed("scripted")) } else { Ok(()) }
            });
        }

        let report = hub.publish("x", &1);
        prop_assert_eq!(invoked.load(Ordering::SeqCst), failing.len());
        let failed_indices: Vec<usize> = report.failures().map(|outcome| outcome.index).collect();
        let expected: Vec<usize> = failing.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect();
        prop_assert_eq!(failed_indices, expected);
    }
}

#[test]
fn test_concurrent_subscribe_and_publish() {
    let hub: NotificationHub<u32> = NotificationHub::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let publishers: Vec<_> = (0..4)
        .map(|_| {
            let hub = hub.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let report = hub.publish("x", &1);
                    assert!(report.all_succeeded());
                }
            })
        })
        .collect();

    let subscribers: Vec<_> = (0..4)
        .map(|_| {
            let hub = hub.clone();
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                let mut tokens = Vec::new();
                for _ in 0..50 {
                    let calls = Arc::clone(&calls);
                    tokens.push(hub.subscribe_fn("x", move |_: &u32| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }));
                }
                tokens
            })
        })
        .collect();

    for publisher in publishers {
        publisher.join().unwrap();
    }
    let tokens: Vec<SubscriptionToken> = subscribers
        .into_iter()
        .flat_map(|subscriber| subscriber.join().unwrap())
        .collect();

    assert_eq!(hub.subscriber_count("x"), 200);
    let mut ids: Vec<u64> = tokens.iter().map(|token| token.id().value()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 200);

    let before = calls.load(Ordering::Relaxed);
    let report = hub.publish("x", &1);
    assert_eq!(report.len(), 200);
    assert_eq!(calls.load(Ordering::Relaxed) - before, 200);
}

#[test]
fn test_handler_sees_payload_unchanged() {
    #[derive(Debug, PartialEq)]
    struct Order {
        id: u32,
        items: Vec<&'static str>,
    }

    let hub: NotificationHub<Order> = NotificationHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let seen = Arc::clone(&seen);
        hub.subscribe_fn("order.placed", move |order: &Order| -> HandlerResult {
            seen.lock().push((order.id, order.items.len()));
            Ok(())
        });
    }

    let order = Order { id: 7, items: vec!["tea", "milk"] };
    hub.publish("order.placed", &order);
    assert_eq!(*seen.lock(), vec![(7, 2); 3]);
    assert_eq!(order, Order { id: 7, items: vec!["tea", "milk"] });
}
