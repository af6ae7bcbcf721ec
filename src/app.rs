use crate::capture;
use crate::cli;
use crate::config::Config;
use crate::encoder::JpegFrameEncoder;
use crate::messages::Transition;
use crate::sampler::Sampler;
use crate::services::{StreamController, StreamHandle, StreamSettings};
use crate::shortcuts;
use crate::store::{StreamState, StreamStatus};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};

/// The capture daemon: wires triggers to the stream controller.
pub struct App {
    config: Config,
    stream: StreamHandle,
    shortcut_rx: mpsc::Receiver<()>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let stream = Self::setup_stream(&config)?;
        let shortcut_rx = Self::setup_keyboard_monitoring(config.shortcut.as_deref())?;

        tokio::spawn(log_status_changes(stream.subscribe()));

        match &config.shortcut {
            Some(shortcut) => tracing::info!(
                "Ready! Press {} or send SIGUSR1 to start/stop capture",
                shortcut
            ),
            None => tracing::info!("Ready! Send SIGUSR1 to start/stop capture"),
        }

        Ok(Self {
            config,
            stream,
            shortcut_rx,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let mut usr1 = signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;

        if self.config.auto_start {
            self.handle_toggle().await;
        }

        loop {
            tracing::debug!("Main loop: waiting for event");
            tokio::select! {
                Some(_) = self.shortcut_rx.recv() => {
                    tracing::debug!("Main loop: received shortcut signal");
                    self.handle_toggle().await;
                }
                _ = usr1.recv() => {
                    tracing::debug!("Main loop: received SIGUSR1");
                    self.handle_toggle().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        if let Err(e) = self.stream.stop().await {
            tracing::warn!("Failed to stop capture cleanly: {}", e);
        }
        tracing::info!("Beltwatch shutdown complete");
        Ok(())
    }

    async fn handle_toggle(&mut self) {
        match self.stream.toggle().await {
            Ok(Transition::Started) => tracing::debug!("handle_toggle: capture started"),
            Ok(Transition::Stopped) => tracing::debug!("handle_toggle: capture stopped"),
            Ok(Transition::Unchanged) => tracing::debug!("handle_toggle: nothing to do"),
            Err(e) => tracing::error!("Error handling toggle: {:#}", e),
        }
    }

    fn setup_stream(config: &Config) -> Result<StreamHandle> {
        let source = capture::from_config(&config.source, config.request_timeout());
        let client = cli::detector_client(config)?;

        let (stream_tx, stream_rx) = mpsc::channel(10);
        let controller = StreamController::new(
            stream_rx,
            Sampler::new(source),
            Arc::new(JpegFrameEncoder::new(config.jpeg_quality)),
            Arc::new(client),
            StreamSettings::from_config(config),
        );
        let handle = StreamHandle::new(stream_tx, controller.subscribe());
        tokio::spawn(controller.run());

        Ok(handle)
    }

    fn setup_keyboard_monitoring(shortcut: Option<&str>) -> Result<mpsc::Receiver<()>> {
        let (shortcut_tx, shortcut_rx) = mpsc::channel(10);
        let Some(shortcut) = shortcut else {
            return Ok(shortcut_rx);
        };

        let chord = shortcuts::parse_shortcut(shortcut)?;
        tokio::spawn(async move {
            if let Err(e) = shortcuts::monitor_keyboards(chord, shortcut_tx).await {
                tracing::warn!("Keyboard shortcut disabled: {:#}", e);
            }
        });
        Ok(shortcut_rx)
    }
}

/// Log state transitions and each newly applied result.
async fn log_status_changes(mut rx: watch::Receiver<StreamStatus>) {
    let mut state = StreamState::Idle;
    let mut processed = 0;

    while rx.changed().await.is_ok() {
        let status = rx.borrow_and_update().clone();
        if status.state != state {
            tracing::info!("Stream {:?} -> {:?}", state, status.state);
            state = status.state;
            processed = 0;
        }

        let Some(session) = &status.session else {
            continue;
        };
        if session.processed_count != processed {
            processed = session.processed_count;
            if let Some(latest) = &status.latest {
                tracing::debug!(
                    "Frame {} processed: detected={} confidence={}% fps={}",
                    session.frame_count,
                    latest.detected,
                    latest.percent(),
                    session.fps
                );
            }
        }
    }
}
