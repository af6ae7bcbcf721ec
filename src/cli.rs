use crate::capture::{CaptureSource, PatternStyle, TestPattern};
use crate::config::Config;
use crate::encoder::{FrameEncoder, JpegFrameEncoder};
use crate::frame::Frame;
use crate::overlay;
use crate::transport::{DetectorClient, DetectorConfig};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "beltwatch", version, about = "Conveyor-belt object detection client")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/beltwatch/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the detector API base URL
    #[arg(long, global = true, env = "BELTWATCH_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the capture daemon (default)
    Run,

    /// Send one test-pattern frame and report the result and latency
    Probe,

    /// Have the backend process a video file and save the returned frames
    ProcessVideo {
        /// Path of the video as seen by the backend
        video_path: String,

        /// Directory for the decoded frames
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the backend's system status
    Status,

    /// Print historical throughput
    Historical {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

pub fn detector_client(config: &Config) -> Result<DetectorClient> {
    DetectorClient::new(DetectorConfig {
        base_url: config.api_url.clone(),
        analyze_path: config.analyze_path.clone(),
        timeout: config.request_timeout(),
    })
    .context("Failed to build HTTP client")
}

pub async fn probe(config: &Config) -> Result<()> {
    let client = detector_client(config)?;
    let encoder = JpegFrameEncoder::new(config.jpeg_quality);

    if !client.health_check().await {
        tracing::warn!("Health check failed, trying the frame anyway");
    }

    let mut source = TestPattern::new(640, 480, PatternStyle::Belt);
    let mut frame = Frame::new();
    source.open().await?;
    let grabbed = source.grab(&mut frame).await?;
    source.close();
    if !grabbed || frame.is_empty() {
        bail!("Test pattern produced no frame");
    }

    let image = Arc::new(frame.pixels().clone());
    let payload = encoder.encode(image).await?;

    let started = Instant::now();
    let result = client
        .analyze(payload, encoder.content_type(), config.camera_id.as_deref())
        .await
        .with_context(|| format!("Probe against {} failed", config.api_url))?;
    let latency = started.elapsed();

    if result.detected {
        println!(
            "detected: {} ({} objects), latency {} ms",
            overlay::label(&result),
            result.object_count,
            latency.as_millis()
        );
    } else {
        println!("nothing detected, latency {} ms", latency.as_millis());
    }
    Ok(())
}

pub async fn process_video(config: &Config, video_path: &str, out: &Path) -> Result<()> {
    let client = detector_client(config)?;
    tracing::info!("Requesting processing of {}", video_path);

    let result = client
        .process_video(video_path)
        .await
        .with_context(|| format!("Failed to process {}", video_path))?;

    let frames = result.decode_frames()?;
    let written = write_frames(out, &frames)?;

    println!(
        "{} of {} frames processed, {} saved to {}",
        result.processed_frames_count,
        result.total_frames,
        written.len(),
        out.display()
    );
    if let Some(url) = &result.original_video_url {
        println!("original video: {}", url);
    }
    Ok(())
}

/// Write decoded frames as `frame_0001.jpg`, `frame_0002.jpg`, ...
pub fn write_frames(dir: &Path, frames: &[Vec<u8>]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    frames
        .iter()
        .enumerate()
        .map(|(index, bytes)| {
            let path = dir.join(format!("frame_{:04}.jpg", index + 1));
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write frame: {:?}", path))?;
            Ok(path)
        })
        .collect()
}

pub async fn status(config: &Config) -> Result<()> {
    let status = detector_client(config)?
        .system_status()
        .await
        .context("Failed to fetch system status")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn historical(config: &Config, days: u32) -> Result<()> {
    let history = detector_client(config)?
        .historical(days)
        .await
        .context("Failed to fetch historical data")?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["beltwatch"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_process_video_args() {
        let cli = Cli::try_parse_from([
            "beltwatch",
            "--api-url",
            "http://belt:8000/api/camera/",
            "process-video",
            "/app/video/test.mp4",
            "--out",
            "/tmp/frames",
        ])
        .unwrap();

        assert_eq!(cli.api_url.as_deref(), Some("http://belt:8000/api/camera/"));
        assert_eq!(
            cli.command,
            Some(Command::ProcessVideo {
                video_path: "/app/video/test.mp4".to_string(),
                out: PathBuf::from("/tmp/frames"),
            })
        );
    }

    #[test]
    fn test_historical_default_days() {
        let cli = Cli::try_parse_from(["beltwatch", "historical"]).unwrap();
        assert_eq!(cli.command, Some(Command::Historical { days: 7 }));
    }

    #[test]
    fn test_write_frames_numbers_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");

        let written = write_frames(&out, &[b"one".to_vec(), b"two".to_vec()]).unwrap();

        assert_eq!(written, vec![out.join("frame_0001.jpg"), out.join("frame_0002.jpg")]);
        assert_eq!(std::fs::read(&written[1]).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_probe_reports_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/camera/stream/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "detected": true,
                "confidence": 0.64,
                "bbox": [1, 2, 3, 4]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            api_url: format!("{}/api/camera/", server.uri()),
            ..Config::default()
        };
        probe(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = Config {
            api_url: format!("{}/api/camera/", server.uri()),
            ..Config::default()
        };
        assert!(probe(&config).await.is_err());
    }
}
