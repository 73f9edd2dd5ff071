#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Dispatch scenarios across listeners, listener beans, and executors.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use trellis_event::{
    ApplicationEvent, ApplicationListener, ContextEvent, ContextEventKind, EventType, FnListener,
    ListenerBeanTable, PayloadApplicationEvent, SimpleApplicationEventMulticaster,
    TokioTaskExecutor,
};

fn refreshed() -> Arc<dyn ApplicationEvent> {
    Arc::new(ContextEvent::new(ContextEventKind::Refreshed, "it"))
}

#[test]
fn newly_added_listener_sees_next_matching_event() {
    let hits = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let multicaster = SimpleApplicationEventMulticaster::new();

    let sink = Arc::clone(&hits);
    multicaster.add_application_listener(Arc::new(FnListener::new(
        "payload",
        EventType::payload_of::<String>(),
        move |_| {
            sink.lock().push("payload");
            Ok(())
        },
    )));
    multicaster.multicast_event(refreshed(), None).unwrap();
    assert!(hits.lock().is_empty());
    assert_eq!(multicaster.cached_entry_count(), 1);

    let sink = Arc::clone(&hits);
    multicaster.add_application_listener(Arc::new(FnListener::new(
        "refresh",
        EventType::context_refreshed(),
        move |_| {
            sink.lock().push("refresh");
            Ok(())
        },
    )));
    multicaster.multicast_event(refreshed(), None).unwrap();
    assert_eq!(*hits.lock(), vec!["refresh"]);
}

#[test]
fn removing_listener_bean_invalidates_cached_view() {
    let hits = Arc::new(Mutex::new(0_usize));
    let table = Arc::new(ListenerBeanTable::new());
    let sink = Arc::clone(&hits);
    table.register(
        "counter",
        true,
        Arc::new(move || {
            let sink = Arc::clone(&sink);
            let listener: Arc<dyn ApplicationListener> =
                Arc::new(FnListener::new("counter", EventType::root(), move |_| {
                    *sink.lock() += 1;
                    Ok(())
                }));
            Ok(listener)
        }),
    );

    let multicaster = SimpleApplicationEventMulticaster::new();
    multicaster.set_listener_bean_resolver(table);
    multicaster.add_application_listener_bean("counter");
    multicaster.multicast_event(refreshed(), None).unwrap();
    multicaster.multicast_event(refreshed(), None).unwrap();
    multicaster.remove_application_listener_bean("counter");
    multicaster.multicast_event(refreshed(), None).unwrap();
    assert_eq!(*hits.lock(), 2);
}

#[test]
fn remove_all_listeners_clears_everything() {
    let multicaster = SimpleApplicationEventMulticaster::new();
    multicaster.add_application_listener(Arc::new(FnListener::new(
        "any",
        EventType::root(),
        |_| Ok(()),
    )));
    let event = refreshed();
    assert_eq!(
        multicaster
            .application_listeners(event.as_ref(), &event.event_type())
            .unwrap()
            .len(),
        1
    );
    multicaster.remove_all_listeners();
    assert!(multicaster
        .application_listeners(event.as_ref(), &event.event_type())
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn executor_dispatch_keeps_synchronous_listeners_inline() {
    let executor = TokioTaskExecutor::from_current().expect("runtime");
    let multicaster = SimpleApplicationEventMulticaster::new().with_task_executor(Arc::new(executor));
    let caller = std::thread::current().id();
    let (tx, rx) = mpsc::channel();

    let inline_tx = tx.clone();
    multicaster.add_application_listener(Arc::new(
        FnListener::new("inline", EventType::payload(), move |_| {
            let _ = inline_tx.send(("inline", std::thread::current().id()));
            Ok(())
        })
        .synchronous(),
    ));
    multicaster.add_application_listener(Arc::new(FnListener::new(
        "pooled",
        EventType::payload(),
        move |_| {
            let _ = tx.send(("pooled", std::thread::current().id()));
            Ok(())
        },
    )));

    multicaster
        .multicast_event(Arc::new(PayloadApplicationEvent::new(7_i32)), None)
        .unwrap();

    let received = tokio::task::spawn_blocking(move || {
        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(rx.recv_timeout(Duration::from_secs(5)).expect("listener ran"));
        }
        seen
    })
    .await
    .unwrap();

    let inline = received.iter().find(|(name, _)| *name == "inline").unwrap();
    let pooled = received.iter().find(|(name, _)| *name == "pooled").unwrap();
    assert_eq!(inline.1, caller);
    assert_ne!(pooled.1, caller);
}
