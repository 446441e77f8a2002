//! End-to-end fan-out tests
//!
//! Exercises the coordinator under real thread contention and the
//! dispatcher against scripted and real TCP endpoints.

use anyhow::Result;
use dispatch::testing::MockTransport;
use dispatch::{
    DispatchRuntimeBuilder, Endpoint, FanoutDispatcher, TcpProbeTransport, TransportError,
};
use fanout_core::{DispatchConfig, Error, FanoutCoordinator};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tokio::net::TcpListener;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_arrival_order_reporting_under_contention() {
    init_tracing();
    const REPORTERS: usize = 100;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let coord = FanoutCoordinator::<usize>::builder(REPORTERS)
        .on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let start = Arc::new(Barrier::new(REPORTERS));
    let handles: Vec<_> = (0..REPORTERS)
        .map(|value| {
            let coord = Arc::clone(&coord);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                coord.report_next(value).unwrap()
            })
        })
        .collect();

    let slots: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(slots.len(), REPORTERS);

    assert!(coord.is_completed());
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let values: HashSet<usize> = coord.results().unwrap().into_iter().copied().collect();
    assert_eq!(values, (0..REPORTERS).collect::<HashSet<_>>());

    let err = coord.report_next(REPORTERS).unwrap_err();
    assert!(matches!(err, Error::OverReported { .. }));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_lost_wakeup_when_waiter_races_last_report() {
    for _ in 0..200 {
        let coord = FanoutCoordinator::<u32>::new(2);
        coord.report(0, 1).unwrap();

        let start = Arc::new(Barrier::new(2));
        let waiter = {
            let coord = Arc::clone(&coord);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                coord.wait_timeout(Duration::from_secs(5))
            })
        };

        start.wait();
        coord.report(1, 2).unwrap();

        assert!(waiter.join().unwrap(), "waiter missed the completion signal");
        assert_eq!(coord.results().unwrap(), vec![&1, &2]);
    }
}

#[test]
fn test_waiters_observe_fully_populated_results() {
    const SUB_REQUESTS: usize = 16;
    let coord = FanoutCoordinator::<Vec<u8>>::new(SUB_REQUESTS);

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let coord = Arc::clone(&coord);
            thread::spawn(move || {
                assert!(coord.wait_timeout(Duration::from_secs(5)));
                coord
                    .results()
                    .unwrap()
                    .iter()
                    .map(|payload| payload.len())
                    .sum::<usize>()
            })
        })
        .collect();

    let reporters: Vec<_> = (0..SUB_REQUESTS)
        .map(|slot| {
            let coord = Arc::clone(&coord);
            thread::spawn(move || coord.report(slot, vec![0u8; 64]).unwrap())
        })
        .collect();
    for reporter in reporters {
        reporter.join().unwrap();
    }

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), SUB_REQUESTS * 64);
    }
}

#[test]
fn test_wait_timeout_then_late_completion() {
    let coord = FanoutCoordinator::<&'static str>::new(1);

    let reporter = {
        let coord = Arc::clone(&coord);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            coord.report(0, "late").unwrap();
        })
    };

    assert!(!coord.wait_timeout(Duration::from_millis(10)));
    reporter.join().unwrap();
    assert!(coord.wait_timeout(Duration::from_millis(10)));
    assert_eq!(coord.get(0), Some(&"late"));
}

#[test]
fn test_dispatch_three_resolvers_with_callback() -> Result<()> {
    init_tracing();
    let runtime = DispatchRuntimeBuilder::new().io_threads(3).build()?;
    let transport = MockTransport::new()
        .respond("10.0.0.1:53", "A", Duration::from_millis(5))
        .respond("10.0.0.2:53", "B", Duration::from_millis(5))
        .respond("10.0.0.3:53", "C", Duration::from_millis(5));
    let dispatcher = runtime.dispatcher(transport);

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let fanout = dispatcher.dispatch_with(
        vec![
            Endpoint::new("resolver-1", "10.0.0.1:53"),
            Endpoint::new("resolver-2", "10.0.0.2:53"),
            Endpoint::new("resolver-3", "10.0.0.3:53"),
        ],
        "example.com".to_string(),
        "lookup-example",
        move |coord| {
            let answers: Vec<String> = coord
                .results()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|r| r.response().cloned())
                .collect();
            sink.lock().push((*coord.state(), answers));
        },
    )?;

    assert!(fanout.wait_timeout(Duration::from_secs(5)));

    // The callback runs after waiters are released
    for _ in 0..100 {
        if !delivered.lock().is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    let delivered = delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "lookup-example");
    assert_eq!(delivered[0].1, vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tcp_probe_fanout_with_one_dead_endpoint() -> Result<()> {
    init_tracing();

    let mut endpoints = Vec::new();
    let mut listeners = Vec::new();
    for i in 0..4 {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        endpoints.push(Endpoint::new(
            format!("live-{}", i),
            listener.local_addr()?.to_string(),
        ));
        listeners.push(listener);
    }

    let dead_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };
    endpoints.push(Endpoint::new("dead", dead_addr.to_string()));

    let dispatcher = FanoutDispatcher::from_current(
        TcpProbeTransport::new(),
        DispatchConfig {
            sub_request_timeout: Duration::from_secs(2),
            ..DispatchConfig::default()
        },
    )?;
    let fanout = dispatcher
        .dispatch_and_wait(endpoints, (), Duration::from_secs(5))
        .await?;

    let results = fanout.results().unwrap_or_default();
    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 4);
    assert!(matches!(
        results[4].error(),
        Some(TransportError::Connect { .. })
    ));
    for (slot, response) in results.iter().enumerate() {
        assert_eq!(response.slot, slot);
    }

    drop(listeners);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_and_blocking_waiters_together() -> Result<()> {
    let coord = FanoutCoordinator::<u8>::new(3);

    let async_waiter = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.wait_async_timeout(Duration::from_secs(5)).await })
    };
    let blocking_waiter = {
        let coord = Arc::clone(&coord);
        tokio::task::spawn_blocking(move || coord.wait_timeout(Duration::from_secs(5)))
    };

    for slot in 0..3u8 {
        let coord = Arc::clone(&coord);
        thread::spawn(move || coord.report(slot as usize, slot).unwrap());
    }

    assert!(async_waiter.await?);
    assert!(blocking_waiter.await?);
    assert_eq!(coord.results().unwrap(), vec![&0, &1, &2]);
    Ok(())
}
