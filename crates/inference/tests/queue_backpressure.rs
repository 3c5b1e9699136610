use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use kinetrace_common::StopFlag;
use kinetrace_inference::queue::{stage_channel, Packet, Received};
use kinetrace_inference::{FrameTask, RawFrame};

fn frame(i: u64) -> Packet {
    Packet::Frame(FrameTask::new(i, RawFrame::new(1, 1, vec![0; 3])))
}

/// Receive frames until `End`, sleeping `work` after each one.
fn consume(rx: kinetrace_inference::queue::StageReceiver, work: Duration) -> Vec<u64> {
    let mut seen = Vec::new();
    loop {
        match rx.recv() {
            Received::Packet(Packet::Frame(task)) => {
                seen.push(task.frame_index);
                thread::sleep(work);
            }
            Received::Packet(Packet::End) => return seen,
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn test_full_queue_blocks_producer() {
    let (tx, rx) = stage_channel("test", 1, StopFlag::new(), Duration::from_millis(50));
    let consumer = thread::spawn(move || consume(rx, Duration::from_millis(100)));

    let started = Instant::now();
    for i in 1..=5 {
        tx.send(frame(i)).unwrap();
    }
    tx.send(Packet::End).unwrap();
    let seen = consumer.join().unwrap();

    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_depth_never_exceeds_capacity_plus_blocked_producer() {
    let (tx, rx) = stage_channel("test", 3, StopFlag::new(), Duration::from_millis(50));
    let gauge = tx.gauge();
    let producer = thread::spawn(move || {
        for i in 0..20 {
            tx.send(frame(i)).unwrap();
        }
        tx.send(Packet::End).unwrap();
    });

    let mut max_depth = 0;
    let mut seen = Vec::new();
    loop {
        max_depth = max_depth.max(gauge.depth());
        match rx.recv() {
            Received::Packet(Packet::Frame(task)) => seen.push(task.frame_index),
            _ => break,
        }
        thread::sleep(Duration::from_millis(2));
    }
    producer.join().unwrap();

    assert!(max_depth <= 4, "depth {max_depth}");
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_nothing_dropped_or_reordered(capacity in 1usize..6, count in 0u64..60) {
        let (tx, rx) = stage_channel("prop", capacity, StopFlag::new(), Duration::from_millis(20));
        let consumer = thread::spawn(move || consume(rx, Duration::ZERO));
        for i in 0..count {
            tx.send(frame(i)).unwrap();
        }
        tx.send(Packet::End).unwrap();
        let seen = consumer.join().unwrap();
        prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
    }
}
