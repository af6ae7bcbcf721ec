use crate::detection::DetectionResult;
use crate::error::PipelineError;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;

/// Stream controller state (observable via watch channel)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Active,
}

/// Counters for the current capture session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub frame_count: u64,
    pub processed_count: u64,
    pub skipped_count: u64,
    pub error_count: u64,
    pub last_frame_at: Option<SystemTime>,
    pub fps: u32,
}

/// Everything a UI needs to render the stream.
#[derive(Clone, Debug)]
pub struct StreamStatus {
    pub state: StreamState,
    pub session: Option<SessionStats>,
    pub latest: Option<DetectionResult>,
    pub annotated: Option<Arc<RgbImage>>,
    pub loading: bool,
    pub last_error: Option<String>,
    last_applied: Option<u64>,
}

impl StreamStatus {
    fn idle() -> Self {
        Self {
            state: StreamState::Idle,
            session: None,
            latest: None,
            annotated: None,
            loading: false,
            last_error: None,
            last_applied: None,
        }
    }
}

/// Rolling one-second frame rate counter
#[derive(Debug)]
struct FpsCounter {
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Count a frame; returns the finished window's rate once a second has passed.
    fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            let fps = self.frames;
            self.frames = 0;
            self.window_start = now;
            Some(fps)
        } else {
            None
        }
    }
}

/// Writer side of the stream status. Only the stream controller holds one.
pub struct StateStore {
    tx: watch::Sender<StreamStatus>,
    fps: FpsCounter,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StreamStatus::idle());
        Self {
            tx,
            fps: FpsCounter::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StreamStatus {
        self.tx.borrow().clone()
    }

    pub fn activate(&mut self) {
        self.fps = FpsCounter::new();
        self.tx.send_modify(|status| {
            *status = StreamStatus {
                state: StreamState::Active,
                session: Some(SessionStats::default()),
                ..StreamStatus::idle()
            };
        });
    }

    /// Drop the session and everything derived from it.
    pub fn deactivate(&mut self) {
        self.tx.send_replace(StreamStatus::idle());
    }

    pub fn record_submitted(&self, captured_at: Option<SystemTime>) {
        self.tx.send_modify(|status| {
            status.loading = true;
            if let Some(session) = status.session.as_mut() {
                session.frame_count += 1;
                session.last_frame_at = captured_at;
            }
        });
    }

    pub fn record_skipped(&self) {
        self.tx.send_modify(|status| {
            if let Some(session) = status.session.as_mut() {
                session.skipped_count += 1;
            }
        });
    }

    /// Whether a result from a later submission than `sequence` has been applied.
    pub fn is_superseded(&self, sequence: u64) -> bool {
        self.tx
            .borrow()
            .last_applied
            .is_some_and(|last| sequence <= last)
    }

    /// Count a failure. `sequence` is the submission it belongs to, if any;
    /// a superseded submission is counted without replacing `last_error`.
    pub fn record_error(&self, error: &PipelineError, sequence: Option<u64>, in_flight: usize) {
        let current = !sequence.is_some_and(|seq| self.is_superseded(seq));
        self.tx.send_modify(|status| {
            status.loading = in_flight > 0;
            if current {
                status.last_error = Some(error.to_string());
            }
            if let Some(session) = status.session.as_mut() {
                session.error_count += 1;
            }
        });
    }

    /// Apply the result of submission `sequence`.
    ///
    /// Returns `false` (and changes nothing but the loading flag) when a
    /// result from a later submission has already been applied.
    pub fn apply_result(
        &mut self,
        sequence: u64,
        result: DetectionResult,
        annotated: Arc<RgbImage>,
        in_flight: usize,
    ) -> bool {
        if self.is_superseded(sequence) {
            self.tx.send_modify(|status| status.loading = in_flight > 0);
            return false;
        }

        let fps = self.fps.tick(Instant::now());
        self.tx.send_modify(|status| {
            status.loading = in_flight > 0;
            status.last_applied = Some(sequence);
            status.latest = Some(result);
            status.annotated = Some(annotated);
            status.last_error = None;
            if let Some(session) = status.session.as_mut() {
                session.processed_count += 1;
                if let Some(fps) = fps {
                    session.fps = fps;
                }
            }
        });
        true
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
