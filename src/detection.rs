//! Detector request/response types.
//!
//! The detector speaks loosely-typed JSON: the `stream/` endpoint answers with
//! `coffee_detected`/`detected`, `confidence` and `bbox`, the `analyze/`
//! endpoint with an `objects` list. Responses are parsed into `WireDetection`
//! and then validated into a `DetectionResult`; anything that does not fit is
//! rejected instead of defaulted.

use crate::error::PipelineError;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    fn from_wire(coords: &[f32]) -> Result<Self, PipelineError> {
        let [x1, y1, x2, y2] = <[f32; 4]>::try_from(coords).map_err(|_| {
            PipelineError::InvalidResponse(format!(
                "bbox must have 4 coordinates, got {}",
                coords.len()
            ))
        })?;

        if ![x1, y1, x2, y2].iter().all(|c| c.is_finite()) {
            return Err(PipelineError::InvalidResponse(
                "bbox coordinates must be finite".to_string(),
            ));
        }
        if x1 > x2 || y1 > y2 {
            return Err(PipelineError::InvalidResponse(format!(
                "bbox corners out of order: [{}, {}, {}, {}]",
                x1, y1, x2, y2
            )));
        }

        Ok(Self { x1, y1, x2, y2 })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedObject {
    pub id: Option<u32>,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: f32,
    pub bbox: Option<BoundingBox>,
    pub objects: Vec<DetectedObject>,
    pub object_count: u32,
    pub camera_id: Option<String>,
}

impl DetectionResult {
    /// A result with nothing found.
    pub fn empty() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            bbox: None,
            objects: Vec::new(),
            object_count: 0,
            camera_id: None,
        }
    }

    /// Confidence as a whole percentage, the way labels show it.
    pub fn percent(&self) -> u32 {
        percent(self.confidence)
    }

    /// Parse and validate a detector response body.
    pub fn from_json(body: &[u8]) -> Result<Self, PipelineError> {
        let wire: WireDetection = serde_json::from_slice(body)
            .map_err(|e| PipelineError::InvalidResponse(e.to_string()))?;
        Self::try_from(wire)
    }
}

pub(crate) fn percent(confidence: f32) -> u32 {
    (confidence * 100.0).round() as u32
}

fn check_confidence(value: f32) -> Result<f32, PipelineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(PipelineError::InvalidResponse(format!(
            "confidence {} outside [0, 1]",
            value
        )))
    }
}

#[derive(Debug, Deserialize)]
struct WireObject {
    #[serde(default)]
    id: Option<u32>,
    bbox: Vec<f32>,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(default, alias = "coffee_detected")]
    detected: Option<bool>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    bbox: Option<Vec<f32>>,
    #[serde(default)]
    objects: Option<Vec<WireObject>>,
    #[serde(default)]
    object_count: Option<u32>,
    #[serde(default)]
    camera_id: Option<String>,
}

impl TryFrom<WireDetection> for DetectionResult {
    type Error = PipelineError;

    fn try_from(wire: WireDetection) -> Result<Self, Self::Error> {
        let objects = wire
            .objects
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|obj| {
                Ok(DetectedObject {
                    id: obj.id,
                    bbox: BoundingBox::from_wire(&obj.bbox)?,
                    confidence: check_confidence(obj.confidence)?,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let detected = match (wire.detected, &wire.objects) {
            (Some(detected), _) => detected,
            (None, Some(_)) => !objects.is_empty(),
            (None, None) => {
                return Err(PipelineError::InvalidResponse(
                    "response has neither `detected` nor `objects`".to_string(),
                ));
            }
        };

        let confidence = match wire.confidence {
            Some(value) => check_confidence(value)?,
            None => objects.iter().map(|o| o.confidence).fold(0.0, f32::max),
        };

        let bbox = wire.bbox.as_deref().map(BoundingBox::from_wire).transpose()?;
        let object_count = wire.object_count.unwrap_or(objects.len() as u32);

        Ok(DetectionResult {
            detected,
            confidence,
            bbox,
            objects,
            object_count,
            camera_id: wire.camera_id,
        })
    }
}

/// Request body for the video-processing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessVideoRequest {
    pub video_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoProcessingResult {
    pub frames: Vec<String>,
    pub total_frames: u64,
    pub processed_frames_count: u64,
    #[serde(default)]
    pub original_video_url: Option<String>,
}

impl VideoProcessingResult {
    /// Decode the base64 frames (bare or `data:` URLs) into image bytes.
    pub fn decode_frames(&self) -> Result<Vec<Vec<u8>>, PipelineError> {
        self.frames
            .iter()
            .enumerate()
            .map(|(index, frame)| {
                let encoded = match frame.split_once(";base64,") {
                    Some((_, data)) => data,
                    None => frame.as_str(),
                };
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| {
                        PipelineError::InvalidResponse(format!("frame {}: {}", index, e))
                    })
            })
            .collect()
    }
}
