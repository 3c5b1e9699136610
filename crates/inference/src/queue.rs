//! Bounded inter-stage queues with a stop-aware, never-dropping push.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kinetrace_common::StopFlag;

use crate::frame::FrameTask;

/// Pause between attempts to push into a full queue.
const PUSH_RETRY: Duration = Duration::from_millis(5);

/// What travels on a queue.
#[derive(Debug)]
pub enum Packet {
    Frame(FrameTask),
    /// Clean end of stream.
    End,
    /// An upstream stage failed or stopped; carries the reason.
    Abort(String),
}

/// Why a push did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// A stop was requested while the queue was full.
    Stopped,
    /// The consumer has exited.
    Closed,
}

/// Result of waiting on a queue.
#[derive(Debug)]
pub enum Received {
    Packet(Packet),
    Stopped,
}

/// Live depth of one queue, readable by the progress monitor.
#[derive(Debug)]
pub struct QueueGauge {
    name: &'static str,
    capacity: usize,
    depth: AtomicUsize,
}

impl QueueGauge {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets pushed and not yet taken, including one blocked producer.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    fn add(&self) {
        self.depth.fetch_add(1, Ordering::Relaxed);
    }

    fn sub(&self) {
        // Never wraps: every sub pairs with an earlier add.
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1));
    }
}

/// Producer half of a stage queue.
#[derive(Debug)]
pub struct StageSender {
    tx: SyncSender<Packet>,
    gauge: Arc<QueueGauge>,
    stop: StopFlag,
}

/// Consumer half of a stage queue.
#[derive(Debug)]
pub struct StageReceiver {
    rx: Receiver<Packet>,
    gauge: Arc<QueueGauge>,
    stop: StopFlag,
    poll_interval: Duration,
}

/// Create a queue holding at most `capacity` packets.
pub fn stage_channel(
    name: &'static str,
    capacity: usize,
    stop: StopFlag,
    poll_interval: Duration,
) -> (StageSender, StageReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = sync_channel(capacity);
    let gauge = Arc::new(QueueGauge {
        name,
        capacity,
        depth: AtomicUsize::new(0),
    });
    (
        StageSender {
            tx,
            gauge: Arc::clone(&gauge),
            stop: stop.clone(),
        },
        StageReceiver {
            rx,
            gauge,
            stop,
            poll_interval,
        },
    )
}

impl StageSender {
    /// Push a packet, blocking while the queue is full.
    ///
    /// Gives up only when a stop is requested or the consumer is gone.
    pub fn send(&self, packet: Packet) -> Result<(), PushError> {
        self.gauge.add();
        let mut packet = packet;
        loop {
            match self.tx.try_send(packet) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_)) => {
                    self.gauge.sub();
                    return Err(PushError::Closed);
                }
                Err(TrySendError::Full(returned)) => {
                    if self.stop.is_stopped() {
                        self.gauge.sub();
                        return Err(PushError::Stopped);
                    }
                    packet = returned;
                    thread::sleep(PUSH_RETRY);
                }
            }
        }
    }

    pub fn gauge(&self) -> Arc<QueueGauge> {
        Arc::clone(&self.gauge)
    }
}

impl StageReceiver {
    /// Wait for the next packet, waking every poll interval to check the stop
    /// flag. A producer that vanished without a sentinel reads as an abort.
    pub fn recv(&self) -> Received {
        loop {
            if self.stop.is_stopped() {
                return Received::Stopped;
            }
            match self.rx.recv_timeout(self.poll_interval) {
                Ok(packet) => {
                    self.gauge.sub();
                    return Received::Packet(packet);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Received::Packet(Packet::Abort(format!(
                        "{} producer exited without end of stream",
                        self.gauge.name
                    )));
                }
            }
        }
    }

    pub fn gauge(&self) -> Arc<QueueGauge> {
        Arc::clone(&self.gauge)
    }
}
