//! HTTP client for the detection backend.

use crate::detection::{DetectionResult, ProcessVideoRequest, VideoProcessingResult};
use crate::error::PipelineError;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base URL of the camera API
    pub base_url: String,
    /// Path of the frame analysis endpoint, relative to `base_url`
    pub analyze_path: String,
    pub timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/camera/".to_string(),
            analyze_path: "stream/".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Client for the detection backend. Performs no retries; callers decide.
pub struct DetectorClient {
    http: Client,
    config: DetectorConfig,
}

impl DetectorClient {
    pub fn new(config: DetectorConfig) -> Result<Self, PipelineError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Submit an encoded frame for analysis.
    pub async fn analyze(
        &self,
        payload: Vec<u8>,
        content_type: &str,
        camera_id: Option<&str>,
    ) -> Result<DetectionResult, PipelineError> {
        let url = self.endpoint(&self.config.analyze_path);
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let part = Part::bytes(payload)
            .file_name(format!("frame_{}.jpg", stamp))
            .mime_str(content_type)?;
        let mut form = Form::new().part("frame", part);
        if let Some(camera_id) = camera_id {
            form = form.text("camera_id", camera_id.to_string());
        }

        debug!("Submitting frame to {}", url);
        let response = self.http.post(&url).multipart(form).send().await?;
        let body = Self::success_body(response).await?;
        DetectionResult::from_json(&body)
    }

    /// Ask the backend to process a video file it can see on disk.
    pub async fn process_video(
        &self,
        video_path: &str,
    ) -> Result<VideoProcessingResult, PipelineError> {
        let url = self.endpoint("process-video/");
        let request = ProcessVideoRequest {
            video_path: video_path.to_string(),
        };

        let response = self.http.post(&url).json(&request).send().await?;
        let body = Self::success_body(response).await?;
        serde_json::from_slice(&body).map_err(|e| PipelineError::InvalidResponse(e.to_string()))
    }

    pub async fn system_status(&self) -> Result<serde_json::Value, PipelineError> {
        self.get_json(&self.endpoint("status/"), &[]).await
    }

    pub async fn historical(&self, days: u32) -> Result<serde_json::Value, PipelineError> {
        self.get_json(&self.endpoint("historical/"), &[("days", days.to_string())])
            .await
    }

    /// Check if the backend answers at all.
    pub async fn health_check(&self) -> bool {
        match self.http.get(self.endpoint("health/")).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Detector health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Detector health check error: {}", e);
                false
            }
        }
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, PipelineError> {
        let response = self.http.get(url).query(query).send().await?;
        let body = Self::success_body(response).await?;
        serde_json::from_slice(&body).map_err(|e| PipelineError::InvalidResponse(e.to_string()))
    }

    async fn success_body(response: reqwest::Response) -> Result<Vec<u8>, PipelineError> {
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(PipelineError::Request {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> DetectorClient {
        DetectorClient::new(DetectorConfig {
            base_url: format!("{}/api/camera/", server.uri()),
            analyze_path: "stream/".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/api/camera/");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_analyze_sends_multipart_frame() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/camera/stream/"))
            .and(body_string_contains("name=\"frame\""))
            .and(body_string_contains("name=\"camera_id\""))
            .and(body_string_contains("belt_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "detected": true,
                "confidence": 0.87,
                "bbox": [10, 10, 50, 50]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .analyze(b"jpeg-bytes".to_vec(), "image/jpeg", Some("belt_1"))
            .await
            .unwrap();

        assert!(result.detected);
        assert_eq!(result.percent(), 87);
    }

    #[tokio::test]
    async fn test_analyze_without_camera_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/camera/stream/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "coffee_detected": false,
                "confidence": 0.0,
                "bbox": null
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .analyze(vec![1, 2, 3], "image/jpeg", None)
            .await
            .unwrap();

        assert_eq!(result, DetectionResult::empty());
    }

    #[tokio::test]
    async fn test_server_error_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Analysis error"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .analyze(vec![1], "image/jpeg", None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("Analysis error"));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "Invalid image"})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .analyze(vec![1], "image/jpeg", None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let client = DetectorClient::new(DetectorConfig {
            base_url: "http://127.0.0.1:9/api/camera/".to_string(),
            analyze_path: "stream/".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = client.analyze(vec![1], "image/jpeg", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport(_)));
    }

    #[tokio::test]
    async fn test_process_video() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/camera/process-video/"))
            .and(body_json(json!({"video_path": "/app/video/test.mp4"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "frames": ["aGVsbG8="],
                "total_frames": 120,
                "processed_frames_count": 1,
                "original_video_url": "/media/test.mp4"
            })))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .process_video("/app/video/test.mp4")
            .await
            .unwrap();

        assert_eq!(result.total_frames, 120);
        assert_eq!(result.processed_frames_count, 1);
        assert_eq!(result.decode_frames().unwrap(), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn test_process_video_missing_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/camera/process-video/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "Video file not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).process_video("/nope.mp4").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_status_and_historical() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/camera/status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "overall_health": "good",
                "active_cameras": 4
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/camera/historical/"))
            .and(query_param("days", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "throughput": [{"date": "2024-01-01", "count": 2500}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let status = client.system_status().await.unwrap();
        assert_eq!(status["active_cameras"], 4);

        let history = client.historical(3).await.unwrap();
        assert_eq!(history["throughput"][0]["count"], 2500);
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/camera/health/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        assert!(client_for(&server).health_check().await);

        let down = DetectorClient::new(DetectorConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..DetectorConfig::default()
        })
        .unwrap();
        assert!(!down.health_check().await);
    }
}
