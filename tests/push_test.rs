mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::channel,
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use async_demand_streams::{
    OverflowStrategy, Publisher, PushPublisher, Sink, SinkConfig, StreamError, UNBOUNDED,
};
use common::{Probe, Recorder};

/// Subscribe a recorder to a push publisher and hand out the sink the source received
fn subscribe<T: Clone + Send + 'static>(
    config: SinkConfig,
    (recorder, probe): (Recorder<T>, Arc<Probe<T>>),
) -> (Sink<T>, Arc<Probe<T>>) {
    let captured = Arc::new(Mutex::new(None));
    let publisher = PushPublisher::new(config, {
        let captured = captured.clone();
        move |sink| *captured.lock().unwrap() = Some(sink)
    });
    publisher.subscribe_with(recorder);
    let sink = captured.lock().unwrap().take().unwrap();
    (sink, probe)
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_buffer_until_requested() {
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(None));
    assert!(probe.subscribes() == 1);
    for n in 0..5 {
        assert!(sink.emit(n));
    }
    assert!(probe.items().is_empty());
    assert!(sink.buffered() == 5);
    probe.request(2);
    assert!(probe.items() == vec![0, 1]);
    probe.request(10);
    assert!(probe.items() == vec![0, 1, 2, 3, 4]);
    assert!(sink.buffered() == 0);
    assert!(sink.requested() == 7);
    // Outstanding demand is used right away
    assert!(sink.emit(5));
    assert!(probe.items().len() == 6);
    assert!(sink.requested() == 6);
}

#[test]
fn test_complete_after_buffered_items() {
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(None));
    sink.emit("a");
    sink.emit("b");
    sink.emit("c");
    sink.complete();
    assert!(!sink.emit("d"));
    probe.request(2);
    assert!(probe.items() == vec!["a", "b"]);
    assert!(probe.completions() == 0);
    probe.request(1);
    assert!(probe.items() == vec!["a", "b", "c"]);
    assert!(probe.completions() == 1);
    assert!(probe.terminal_is_last());
    assert!(sink.is_cancelled());
}

#[test]
fn test_empty_buffer_completes_without_demand() {
    let (sink, probe) = subscribe::<u8>(SinkConfig::default(), Recorder::new(None));
    sink.complete();
    sink.complete();
    assert!(probe.completions() == 1);
}

#[test]
fn test_error_after_buffered_items() {
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(None));
    sink.emit(1);
    sink.error(StreamError::from_source("device lost"));
    sink.complete();
    assert!(probe.terminals() == 0);
    probe.request(1);
    assert!(probe.items() == vec![1]);
    assert!(probe.errors() == 1);
    assert!(probe.error_matches(|e| e.to_string() == "source failed: device lost"));
    assert!(probe.terminal_is_last());
}

#[test]
fn test_cancel() {
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(Some(1)));
    let cancels = Arc::new(AtomicUsize::new(0));
    sink.on_cancel({
        let cancels = cancels.clone();
        move || {
            cancels.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert!(sink.emit(1));
    assert!(sink.emit(2));
    probe.cancel();
    probe.cancel();
    assert!(sink.is_cancelled());
    assert!(!sink.emit(3));
    probe.request(5);
    sink.complete();
    assert!(probe.items() == vec![1]);
    assert!(probe.terminals() == 0);
    assert!(cancels.load(Ordering::SeqCst) == 1);
    // Late registration runs immediately
    let late = Arc::new(AtomicUsize::new(0));
    sink.on_cancel({
        let late = late.clone();
        move || {
            late.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert!(late.load(Ordering::SeqCst) == 1);
}

#[test]
fn test_non_positive_request() {
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(None));
    let cancelled = Arc::new(AtomicUsize::new(0));
    sink.on_cancel({
        let cancelled = cancelled.clone();
        move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        }
    });
    sink.emit(1);
    probe.request(0);
    assert!(probe.error_matches(|e| matches!(e, StreamError::IllegalDemand(0))));
    assert!(!sink.emit(2));
    probe.request(1);
    assert!(probe.items().is_empty());
    assert!(probe.terminals() == 1);
    assert!(cancelled.load(Ordering::SeqCst) == 1);
}

#[test]
fn test_on_request_drives_source() {
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(None));
    let next = Arc::new(AtomicUsize::new(0));
    sink.on_request({
        let sink = sink.clone();
        let next = next.clone();
        move |n| {
            for _ in 0..n {
                let item = next.fetch_add(1, Ordering::SeqCst);
                if item == 5 {
                    sink.complete();
                    return;
                }
                sink.emit(item);
            }
        }
    });
    probe.request(2);
    assert!(probe.items() == vec![0, 1]);
    assert!(sink.buffered() == 0);
    probe.request(10);
    assert!(probe.items() == vec![0, 1, 2, 3, 4]);
    assert!(probe.completions() == 1);
}

#[test]
fn test_overflow_drop_newest() {
    let config = SinkConfig::bounded(2, OverflowStrategy::DropNewest);
    let (sink, probe) = subscribe(config, Recorder::new(None));
    let accepted: Vec<bool> = (0..4).map(|n| sink.emit(n)).collect();
    assert!(accepted == vec![true, true, false, false]);
    probe.request(10);
    assert!(probe.items() == vec![0, 1]);
    assert!(probe.errors() == 0);
}

#[test]
fn test_overflow_drop_oldest() {
    let config = SinkConfig::bounded(2, OverflowStrategy::DropOldest);
    let (sink, probe) = subscribe(config, Recorder::new(None));
    for n in 0..4 {
        assert!(sink.emit(n));
    }
    probe.request(10);
    assert!(probe.items() == vec![2, 3]);
}

#[test]
fn test_overflow_error() {
    let config = SinkConfig::bounded(2, OverflowStrategy::Error);
    let (sink, probe) = subscribe(config, Recorder::new(Some(1)));
    let cancelled = Arc::new(AtomicUsize::new(0));
    sink.on_cancel({
        let cancelled = cancelled.clone();
        move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        }
    });
    // First item goes straight to the consumer, the next two fill the buffer
    assert!(sink.emit(0));
    assert!(sink.emit(1));
    assert!(sink.emit(2));
    assert!(!sink.emit(3));
    assert!(probe.items() == vec![0]);
    assert!(probe.error_matches(|e| matches!(e, StreamError::Overflow { capacity: 2 })));
    assert!(sink.is_cancelled());
    assert!(cancelled.load(Ordering::SeqCst) == 1);
    probe.request(5);
    assert!(probe.items() == vec![0]);
    assert!(probe.terminals() == 1);
}

#[test]
fn test_overflow_block() {
    let config = SinkConfig::bounded(1, OverflowStrategy::Block);
    let (sink, probe) = subscribe(config, Recorder::new(None));
    let producer = thread::spawn({
        let sink = sink.clone();
        move || {
            let accepted = (0..100).filter(|n| sink.emit(*n)).count();
            sink.complete();
            accepted
        }
    });
    wait_until(|| sink.buffered() == 1);
    while probe.terminals() == 0 {
        assert!(sink.buffered() <= 1);
        probe.request(1);
        thread::sleep(Duration::from_micros(100));
    }
    assert!(producer.join().unwrap() == 100);
    assert!(probe.items() == (0..100).collect::<Vec<_>>());
    assert!(probe.completions() == 1);
}

#[test]
fn test_cancel_releases_blocked_emit() {
    let config = SinkConfig::bounded(1, OverflowStrategy::Block);
    let (sink, probe) = subscribe(config, Recorder::new(None));
    let (tx, rx) = channel();
    let producer = thread::spawn({
        let sink = sink.clone();
        move || {
            tx.send(sink.emit(0)).unwrap();
            tx.send(sink.emit(1)).unwrap();
        }
    });
    assert!(rx.recv().unwrap());
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    probe.cancel();
    assert!(!rx.recv().unwrap());
    producer.join().unwrap();
    assert!(probe.items().is_empty());
    assert!(probe.terminals() == 0);
}

#[test]
fn test_concurrent_emit() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 1000;
    let (sink, probe) = subscribe(SinkConfig::default(), Recorder::new(Some(UNBOUNDED)));
    let producers: Vec<_> = (0..THREADS)
        .map(|t| {
            let sink = sink.clone();
            thread::spawn(move || {
                for n in 0..PER_THREAD {
                    sink.emit(t * PER_THREAD + n);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    sink.complete();
    let items = probe.items();
    let mut sorted = items.clone();
    sorted.sort_unstable();
    assert!(sorted == (0..THREADS * PER_THREAD).collect::<Vec<_>>());
    // Order of every single producer is kept
    for t in 0..THREADS {
        let own: Vec<_> = items.iter().filter(|n| **n / PER_THREAD == t).collect();
        assert!(own.windows(2).all(|w| w[0] < w[1]));
    }
    assert!(probe.overlaps() == 0);
    assert!(probe.completions() == 1);
}

#[test]
fn test_concurrent_emit_with_reentrant_demand() {
    let recorder = Recorder::new(Some(1));
    let recorder = (
        recorder.0.with_hook(|_, subscription| subscription.request(1)),
        recorder.1,
    );
    let (sink, probe) = subscribe(SinkConfig::default(), recorder);
    let producers: Vec<_> = (0..3)
        .map(|t| {
            let sink = sink.clone();
            thread::spawn(move || {
                for n in 0..500u64 {
                    sink.emit(t * 500 + n);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    wait_until(|| probe.items().len() == 1500);
    assert!(probe.items().iter().sum::<u64>() == (0..1500).sum::<u64>());
    assert!(probe.overlaps() == 0);
}
