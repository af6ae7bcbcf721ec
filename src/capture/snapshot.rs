use super::source::CaptureSource;
use crate::error::PipelineError;
use crate::frame::Frame;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// HTTP camera that serves a still JPEG/PNG per request.
pub struct SnapshotSource {
    url: String,
    timeout: Duration,
    http: Option<Client>,
}

impl SnapshotSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            http: None,
        }
    }

    async fn fetch(http: &Client, url: &str) -> Result<Vec<u8>, PipelineError> {
        let response = http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Acquisition(format!("camera unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Acquisition(format!(
                "camera returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Acquisition(format!("camera read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CaptureSource for SnapshotSource {
    fn describe(&self) -> String {
        format!("snapshot camera {}", self.url)
    }

    async fn open(&mut self) -> Result<(), PipelineError> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::Acquisition(format!("http client: {}", e)))?;

        // Camera must answer once before the session starts
        Self::fetch(&http, &self.url).await?;

        tracing::info!("Connected to snapshot camera {}", self.url);
        self.http = Some(http);
        Ok(())
    }

    async fn grab(&mut self, frame: &mut Frame) -> Result<bool, PipelineError> {
        let Some(http) = &self.http else {
            return Ok(false);
        };

        let bytes = Self::fetch(http, &self.url).await?;
        let decoded = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes)
                .map(|img| img.to_rgb8())
                .map_err(|e| format!("camera sent undecodable image: {}", e))
        })
        .await
        .map_err(|e| PipelineError::Acquisition(format!("decode task failed: {}", e)))?
        .map_err(PipelineError::Acquisition)?;

        frame.load(&decoded);
        Ok(true)
    }

    fn close(&mut self) {
        self.http = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::from_pixel(16, 12, Rgb([0, 128, 255]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_grab_decodes_camera_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/capture"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .mount(&server)
            .await;

        let mut source =
            SnapshotSource::new(format!("{}/capture", server.uri()), Duration::from_secs(2));
        source.open().await.unwrap();

        let mut frame = Frame::new();
        assert!(source.grab(&mut frame).await.unwrap());
        assert_eq!((frame.width(), frame.height()), (16, 12));
        assert_eq!(frame.pixels().get_pixel(5, 5), &Rgb([0, 128, 255]));
    }

    #[tokio::test]
    async fn test_open_fails_when_camera_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut source = SnapshotSource::new(server.uri(), Duration::from_secs(2));
        assert!(matches!(
            source.open().await,
            Err(PipelineError::Acquisition(_))
        ));
    }

    #[tokio::test]
    async fn test_grab_before_open_is_not_ready() {
        let mut source = SnapshotSource::new("http://127.0.0.1:9/none", Duration::from_secs(1));
        let mut frame = Frame::new();
        assert!(!source.grab(&mut frame).await.unwrap());
    }
}
