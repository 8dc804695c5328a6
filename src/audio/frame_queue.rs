// FrameQueue - bounded lock-free handoff from audio source to session
//
// The audio source runs on its own (possibly real-time) thread and must never
// block on the session. Frames travel through a single rtrb SPSC ring buffer:
//
// - Producer side (audio source): push() never waits. A full queue drops the
//   frame and bumps the shared missed-sample counter. Offline sources that
//   can afford to wait use try_push() and keep the frame instead.
// - Consumer side (session pump): poll() returns every queued frame plus the
//   terminal source signal, if one was raised.
//
// Terminal signals ("ended" / "failed") live outside the ring buffer so they
// cannot be lost to backpressure. The first signal wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rtrb::{Consumer, Producer, RingBuffer};

/// Default queue capacity (frames)
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One raw amplitude frame with its capture timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    pub amplitude: f64,
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(amplitude: f64, timestamp_ms: u64) -> Self {
        Self {
            amplitude,
            timestamp_ms,
        }
    }
}

/// Terminal notification from the audio source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSignal {
    /// Source finished normally (end of file, user released the mic)
    Ended,
    /// Source failed (device removed, permission revoked)
    Failed(String),
}

/// Frames drained by one poll, plus the terminal signal if present
#[derive(Debug, Default)]
pub struct FrameBatch {
    pub frames: Vec<AudioFrame>,
    pub signal: Option<SourceSignal>,
}

#[derive(Debug, Default)]
struct Shared {
    missed: AtomicU64,
    signal: OnceLock<SourceSignal>,
}

/// Constructor for linked producer/consumer halves
pub struct FrameQueue;

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> (FrameProducer, FrameConsumer) {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        let shared = Arc::new(Shared::default());
        (
            FrameProducer {
                producer,
                shared: Arc::clone(&shared),
            },
            FrameConsumer {
                consumer,
                shared,
                reported_missed: 0,
            },
        )
    }
}

/// Audio-source half of the queue
pub struct FrameProducer {
    producer: Producer<AudioFrame>,
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Push a frame without blocking
    ///
    /// # Returns
    /// `true` if queued. `false` if the queue was full (counted as missed) or
    /// the source already signalled completion (not counted).
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        if self.shared.signal.get().is_some() {
            return false;
        }
        match self.producer.push(frame) {
            Ok(()) => true,
            Err(_) => {
                self.shared.missed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Push a frame without counting a full queue as a drop
    ///
    /// For sources that hold on to the frame and retry once the session has
    /// drained the queue.
    ///
    /// # Errors
    /// Hands the frame back if the queue is full or the source already
    /// signalled completion.
    pub fn try_push(&mut self, frame: AudioFrame) -> Result<(), AudioFrame> {
        if self.shared.signal.get().is_some() {
            return Err(frame);
        }
        self.producer.push(frame).map_err(|rtrb::PushError::Full(frame)| frame)
    }

    /// Signal normal end of input
    pub fn finish(&self) {
        let _ = self.shared.signal.set(SourceSignal::Ended);
    }

    /// Signal an unrecoverable source failure
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.shared.signal.set(SourceSignal::Failed(reason.into()));
    }

    pub fn missed_samples(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// True once the consumer half has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Session half of the queue
pub struct FrameConsumer {
    consumer: Consumer<AudioFrame>,
    shared: Arc<Shared>,
    reported_missed: u64,
}

impl FrameConsumer {
    /// Drain all queued frames
    ///
    /// The signal is read before draining so every frame pushed ahead of the
    /// signal is part of the same batch.
    pub fn poll(&mut self) -> FrameBatch {
        let signal = self.shared.signal.get().cloned();
        let mut frames = Vec::with_capacity(self.consumer.slots());
        while let Ok(frame) = self.consumer.pop() {
            frames.push(frame);
        }
        FrameBatch { frames, signal }
    }

    /// Frames dropped because the queue was full
    pub fn missed_samples(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// Frames dropped since the previous call
    pub fn take_missed(&mut self) -> u64 {
        let total = self.missed_samples();
        let delta = total.saturating_sub(self.reported_missed);
        self.reported_missed = total;
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}
