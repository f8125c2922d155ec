//! Effect scheduler: per-hand haptic workers.
//!
//! Each hand owns a bounded queue of timed events `{start, end, duration}`
//! and a worker thread that wakes every few milliseconds, drives the
//! newest live event (interpolated over its lifetime), and purges expired
//! ones. Older events are pre-empted, never mixed. The main tick only
//! pushes into the queue; a slow tick cannot stall the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::InteractionConfig;
use crate::hand::Hand;
use crate::world::FeedbackSink;

// ── HapticEvent ────────────────────────────────────────────

/// One timed intensity ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticEvent {
    pub start: f32,
    pub end: f32,
    pub duration_ms: f64,
    /// Scheduler clock time the event was queued.
    pub queued_ms: f64,
}

impl HapticEvent {
    fn expired(&self, now_ms: f64) -> bool {
        now_ms >= self.queued_ms + self.duration_ms
    }

    /// Linear interpolation from `start` to `end` at `now_ms`.
    pub fn intensity_at(&self, now_ms: f64) -> f32 {
        if self.duration_ms <= 0.0 {
            return self.end;
        }
        let t = ((now_ms - self.queued_ms) / self.duration_ms).clamp(0.0, 1.0) as f32;
        self.start + (self.end - self.start) * t
    }
}

// ── HapticQueue ────────────────────────────────────────────

/// Bounded event list. Pure; the clock is passed in.
#[derive(Debug, Clone)]
pub struct HapticQueue {
    events: Vec<HapticEvent>,
    capacity: usize,
    dropped: u64,
}

impl HapticQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Queue a ramp. Returns false (and drops it) when the queue is full.
    pub fn push(&mut self, start: f32, end: f32, duration_ms: f64, now_ms: f64) -> bool {
        self.purge(now_ms);
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.events.push(HapticEvent {
            start: start.clamp(0.0, 1.0),
            end: end.clamp(0.0, 1.0),
            duration_ms: duration_ms.max(0.0),
            queued_ms: now_ms,
        });
        true
    }

    /// Intensity to output now: newest live event wins.
    pub fn sample(&mut self, now_ms: f64) -> Option<f32> {
        self.purge(now_ms);
        self.events.last().map(|e| e.intensity_at(now_ms))
    }

    fn purge(&mut self, now_ms: f64) {
        self.events.retain(|e| !e.expired(now_ms));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ── Output ─────────────────────────────────────────────────

/// Low-level pulse transmission to a controller.
pub trait PulseOutput: Send + Sync {
    fn pulse(&self, hand: Hand, intensity: f32);
}

// ── HapticWorker ───────────────────────────────────────────

/// Background loop for one hand.
pub struct HapticWorker {
    hand: Hand,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HapticWorker {
    /// Start the worker. `None` if the thread could not be created.
    pub fn spawn(
        hand: Hand,
        queue: Arc<Mutex<HapticQueue>>,
        output: Arc<dyn PulseOutput>,
        period: Duration,
        epoch: Instant,
    ) -> Option<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let spawned = std::thread::Builder::new()
            .name(format!("haptics-{}", hand.as_str()))
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    // Lock only long enough to read the queue.
                    let intensity = queue.lock().sample(now_ms);
                    if let Some(i) = intensity {
                        if i > 0.0 {
                            output.pulse(hand, i);
                        }
                    }
                    std::thread::sleep(period);
                }
            });
        match spawned {
            Ok(handle) => {
                debug!("Haptic worker started for {} hand", hand.as_str());
                Some(Self {
                    hand,
                    stop,
                    handle: Some(handle),
                })
            }
            Err(e) => {
                warn!("Haptic worker for {} hand failed to start: {}", hand.as_str(), e);
                None
            }
        }
    }

    pub fn hand(&self) -> Hand {
        self.hand
    }

    /// Signal the loop to exit and wait for it.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HapticWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Haptics ────────────────────────────────────────────────

/// Both hands' queues and workers behind the `FeedbackSink` interface.
pub struct Haptics {
    queues: [Arc<Mutex<HapticQueue>>; 2],
    workers: Vec<HapticWorker>,
    epoch: Instant,
    warned_full: [bool; 2],
}

impl Haptics {
    pub fn new(config: &InteractionConfig, output: Arc<dyn PulseOutput>) -> Self {
        let epoch = Instant::now();
        let queues = [
            Arc::new(Mutex::new(HapticQueue::new(config.haptic_queue_capacity))),
            Arc::new(Mutex::new(HapticQueue::new(config.haptic_queue_capacity))),
        ];
        let period = Duration::from_millis(config.haptic_period_ms.max(1));
        let workers: Vec<HapticWorker> = Hand::BOTH
            .into_iter()
            .filter_map(|hand| {
                HapticWorker::spawn(
                    hand,
                    Arc::clone(&queues[hand.index()]),
                    Arc::clone(&output),
                    period,
                    epoch,
                )
            })
            .collect();
        if workers.len() < 2 {
            warn!("Haptic feedback partially unavailable");
        }
        Self {
            queues,
            workers,
            epoch,
            warned_full: [false; 2],
        }
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Number of running workers.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop both workers and drop queued events.
    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.shutdown();
        }
        self.workers.clear();
        for q in &self.queues {
            q.lock().clear();
        }
    }
}

impl FeedbackSink for Haptics {
    fn emit_pulse(&mut self, hand: Hand, intensity: f32, duration_s: f32) {
        self.emit_ramp(hand, intensity, intensity, duration_s);
    }

    fn emit_ramp(&mut self, hand: Hand, start: f32, end: f32, duration_s: f32) {
        let now = self.now_ms();
        let accepted = self.queues[hand.index()]
            .lock()
            .push(start, end, f64::from(duration_s) * 1000.0, now);
        let warned = &mut self.warned_full[hand.index()];
        if !accepted && !*warned {
            warn!("Haptic queue full for {} hand, dropping requests", hand.as_str());
            *warned = true;
        } else if accepted {
            *warned = false;
        }
    }
}

impl Drop for Haptics {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_event_wins() {
        let mut q = HapticQueue::new(8);
        q.push(1.0, 1.0, 1000.0, 0.0);
        q.push(0.2, 0.2, 1000.0, 10.0);
        assert_eq!(q.sample(20.0), Some(0.2));
    }

    #[test]
    fn test_linear_interpolation() {
        let mut q = HapticQueue::new(8);
        q.push(0.0, 1.0, 100.0, 0.0);
        let mid = q.sample(50.0).unwrap();
        assert!((mid - 0.5).abs() < 1e-6);
        let late = q.sample(75.0).unwrap();
        assert!((late - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_expired_events_purged() {
        let mut q = HapticQueue::new(8);
        q.push(0.5, 0.5, 100.0, 0.0);
        q.push(0.9, 0.9, 20.0, 10.0);
        // Newer event expired at 30ms; the older one drives output again.
        assert_eq!(q.sample(40.0), Some(0.5));
        assert_eq!(q.len(), 1);
        assert_eq!(q.sample(100.0), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_queue_drops_request() {
        let mut q = HapticQueue::new(2);
        assert!(q.push(0.1, 0.1, 1000.0, 0.0));
        assert!(q.push(0.2, 0.2, 1000.0, 0.0));
        assert!(!q.push(0.3, 0.3, 1000.0, 0.0));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.sample(1.0), Some(0.2));
        // Space frees up once events expire.
        assert!(q.push(0.4, 0.4, 10.0, 1000.0));
    }

    #[test]
    fn test_intensity_clamped() {
        let mut q = HapticQueue::new(2);
        q.push(3.0, -1.0, 100.0, 0.0);
        assert_eq!(q.sample(0.0), Some(1.0));
    }

    struct Recorder(Mutex<Vec<(Hand, f32)>>);

    impl PulseOutput for Recorder {
        fn pulse(&self, hand: Hand, intensity: f32) {
            self.0.lock().push((hand, intensity));
        }
    }

    #[test]
    fn test_worker_drives_output() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut haptics = Haptics::new(&InteractionConfig::default(), recorder.clone());
        assert_eq!(haptics.active_workers(), 2);
        haptics.emit_pulse(Hand::Right, 0.5, 2.0);

        let deadline = Instant::now() + Duration::from_secs(2);
        while recorder.0.lock().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        haptics.shutdown();

        let pulses = recorder.0.lock();
        assert!(!pulses.is_empty());
        assert!(pulses.iter().all(|(h, i)| *h == Hand::Right && (*i - 0.5).abs() < 1e-6));
    }
}
