use crate::config::{Config, InFlightPolicy};
use crate::detection::DetectionResult;
use crate::encoder::{FrameEncoder, SnapshotWriter};
use crate::error::PipelineError;
use crate::hooks;
use crate::messages::{StreamCommand, Transition};
use crate::overlay;
use crate::sampler::Sampler;
use crate::store::{StateStore, StreamState, StreamStatus};
use crate::transport::DetectorClient;
use anyhow::Result;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

/// Knobs for the capture loop, lifted out of `Config`.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub interval: Duration,
    pub camera_id: Option<String>,
    pub policy: InFlightPolicy,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_quality: u8,
    pub on_start: Option<String>,
    pub on_stop: Option<String>,
    pub on_detect: Option<String>,
}

impl StreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.interval(),
            camera_id: config.camera_id.clone(),
            policy: config.in_flight,
            snapshot_path: config.snapshot_path.clone(),
            snapshot_quality: config.jpeg_quality,
            on_start: config.on_start.clone(),
            on_stop: config.on_stop.clone(),
            on_detect: config.on_detect.clone(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            camera_id: None,
            policy: InFlightPolicy::Skip,
            snapshot_path: None,
            snapshot_quality: 80,
            on_start: None,
            on_stop: None,
            on_detect: None,
        }
    }
}

/// A start..stop span. Dropping it cancels the timer.
struct Session {
    id: u64,
    ticker: Interval,
    in_flight: usize,
    next_sequence: u64,
}

/// An analyze request coming back to the controller.
struct Completion {
    session: u64,
    sequence: u64,
    image: Arc<RgbImage>,
    result: Result<DetectionResult, PipelineError>,
}

/// Drives the capture → encode → analyze → overlay loop.
///
/// This service:
/// - Owns the capture source (through the Sampler) and the raster buffer
/// - Samples on a fixed interval while Active
/// - Submits frames as spawned requests and applies their results in order
/// - Handles start/stop commands
///
/// All state lives in this task; request tasks report back over a channel.
pub struct StreamController {
    cmd_rx: mpsc::Receiver<StreamCommand>,
    done_tx: mpsc::Sender<Completion>,
    done_rx: mpsc::Receiver<Completion>,
    sampler: Sampler,
    encoder: Arc<dyn FrameEncoder>,
    client: Arc<DetectorClient>,
    store: StateStore,
    settings: StreamSettings,
    session: Option<Session>,
    sessions_started: u64,
    snapshots: Option<SnapshotWriter>,
}

impl StreamController {
    pub fn new(
        cmd_rx: mpsc::Receiver<StreamCommand>,
        sampler: Sampler,
        encoder: Arc<dyn FrameEncoder>,
        client: Arc<DetectorClient>,
        settings: StreamSettings,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel(32);
        Self {
            cmd_rx,
            done_tx,
            done_rx,
            sampler,
            encoder,
            client,
            store: StateStore::new(),
            settings,
            session: None,
            sessions_started: 0,
            snapshots: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.store.subscribe()
    }

    pub async fn run(mut self) {
        self.snapshots = self
            .settings
            .snapshot_path
            .clone()
            .map(|path| SnapshotWriter::spawn(path, self.settings.snapshot_quality));

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                // Sampling timer (only while a session is active)
                _ = next_tick(&mut self.session) => {
                    self.on_tick().await;
                }

                Some(done) = self.done_rx.recv() => {
                    self.on_completion(done);
                }
            }
        }

        self.stop();
        tracing::debug!("Stream controller exiting");
    }

    async fn handle_command(&mut self, cmd: StreamCommand) {
        match cmd {
            StreamCommand::Start(reply) => {
                let _ = reply.send(self.start().await);
            }
            StreamCommand::Stop(reply) => {
                let _ = reply.send(self.stop());
            }
        }
    }

    async fn start(&mut self) -> Result<Transition, PipelineError> {
        if self.session.is_some() {
            tracing::debug!("Capture already active, ignoring start");
            return Ok(Transition::Unchanged);
        }

        if let Err(e) = self.sampler.activate().await {
            tracing::error!("Failed to acquire {}: {}", self.sampler.describe(), e);
            return Err(e);
        }

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.sessions_started += 1;
        self.session = Some(Session {
            id: self.sessions_started,
            ticker,
            in_flight: 0,
            next_sequence: 0,
        });
        self.store.activate();

        tracing::info!(
            "Capture started from {} every {:?}",
            self.sampler.describe(),
            self.settings.interval
        );
        if let Some(command) = &self.settings.on_start {
            hooks::run_hook("start", command, Vec::new());
        }
        Ok(Transition::Started)
    }

    fn stop(&mut self) -> Transition {
        let Some(session) = self.session.take() else {
            return Transition::Unchanged;
        };

        let frames = self
            .store
            .snapshot()
            .session
            .map_or(0, |stats| stats.frame_count);

        // Requests still in flight are left to finish; their results are discarded
        self.sampler.deactivate();
        self.store.deactivate();

        tracing::info!(
            "Capture stopped after {} frames ({} requests abandoned)",
            frames,
            session.in_flight
        );
        if let Some(command) = &self.settings.on_stop {
            hooks::run_hook("stop", command, Vec::new());
        }
        Transition::Stopped
    }

    async fn on_tick(&mut self) {
        let in_flight = match &self.session {
            Some(session) => session.in_flight,
            None => return,
        };

        if self.settings.policy == InFlightPolicy::Skip && in_flight > 0 {
            tracing::debug!("Analyze request still pending, skipping tick");
            self.store.record_skipped();
            return;
        }

        match self.sampler.sample().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Source not ready, nothing sampled");
                return;
            }
            Err(e) => {
                tracing::warn!("Sampling failed: {}", e);
                self.store.record_error(&e, None, in_flight);
                return;
            }
        }

        let frame = self.sampler.frame();
        let captured_at = frame.captured_at;
        let image = Arc::new(frame.pixels().clone());

        let payload = match self.encoder.encode(image.clone()).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Encoding frame failed: {}", e);
                self.store.record_error(&e, None, in_flight);
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.in_flight += 1;
        session.next_sequence += 1;
        let (session_id, sequence) = (session.id, session.next_sequence);
        self.store.record_submitted(captured_at);

        tracing::debug!(
            "Submitting frame {} ({} bytes, {} in flight)",
            sequence,
            payload.len(),
            session.in_flight
        );

        let client = self.client.clone();
        let done_tx = self.done_tx.clone();
        let camera_id = self.settings.camera_id.clone();
        let content_type = self.encoder.content_type();
        tokio::spawn(async move {
            let result = client
                .analyze(payload, content_type, camera_id.as_deref())
                .await;
            let _ = done_tx
                .send(Completion {
                    session: session_id,
                    sequence,
                    image,
                    result,
                })
                .await;
        });
    }

    fn on_completion(&mut self, done: Completion) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == done.session) else {
            tracing::debug!("Discarding result {} from a stopped session", done.sequence);
            return;
        };
        session.in_flight = session.in_flight.saturating_sub(1);
        let in_flight = session.in_flight;

        let result = match done.result {
            Ok(result) => result,
            Err(e) => {
                match e.status() {
                    Some(status) => tracing::warn!(
                        "Detector rejected frame {} with HTTP {}",
                        done.sequence,
                        status
                    ),
                    None => tracing::warn!("Analysis of frame {} failed: {}", done.sequence, e),
                }
                self.store.record_error(&e, Some(done.sequence), in_flight);
                return;
            }
        };

        let mut image = Arc::unwrap_or_clone(done.image);
        overlay::render(&mut image, &result);
        let annotated = Arc::new(image);

        let detection = result.detected.then(|| hooks::detection_env(&result));
        let summary = format!("{}% ({} objects)", result.percent(), result.object_count);

        if !self
            .store
            .apply_result(done.sequence, result, annotated.clone(), in_flight)
        {
            tracing::debug!("Dropping out-of-order result {}", done.sequence);
            return;
        }

        if let Some(env) = detection {
            tracing::info!("Detection in frame {}: {}", done.sequence, summary);
            if let Some(command) = &self.settings.on_detect {
                hooks::run_hook("detect", command, env);
            }
        } else {
            tracing::debug!("Nothing detected in frame {}", done.sequence);
        }

        if let Some(writer) = &self.snapshots {
            writer.publish(annotated);
        }
    }
}

async fn next_tick(session: &mut Option<Session>) {
    match session {
        Some(session) => {
            session.ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handle for communicating with the StreamController
#[derive(Clone)]
pub struct StreamHandle {
    tx: mpsc::Sender<StreamCommand>,
    status: watch::Receiver<StreamStatus>,
}

impl StreamHandle {
    pub fn new(tx: mpsc::Sender<StreamCommand>, status: watch::Receiver<StreamStatus>) -> Self {
        Self { tx, status }
    }

    pub async fn start(&self) -> Result<Transition> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StreamCommand::Start(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send start command: {}", e))?;

        let transition = rx
            .await
            .map_err(|e| anyhow::anyhow!("Failed to receive start response: {}", e))??;
        Ok(transition)
    }

    pub async fn stop(&self) -> Result<Transition> {
        let (reply, rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StreamCommand::Stop(reply))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send stop command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive stop response: {}", e))
    }

    /// Start when idle, stop when active.
    pub async fn toggle(&self) -> Result<Transition> {
        match self.status().state {
            StreamState::Idle => self.start().await,
            StreamState::Active => self.stop().await,
        }
    }

    pub fn status(&self) -> StreamStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }
}
