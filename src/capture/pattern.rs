use super::source::CaptureSource;
use crate::error::PipelineError;
use crate::frame::Frame;
use async_trait::async_trait;
use image::Rgb;
use serde::{Deserialize, Serialize};

const BELT_GREY: Rgb<u8> = Rgb([0x37, 0x47, 0x4f]);

// (x, y, width, height, colour) at 640x480, scaled to the configured size.
const BLOCKS: [(u32, u32, u32, u32, Rgb<u8>); 3] = [
    (100, 100, 50, 50, Rgb([0xff, 0x00, 0x00])),
    (200, 200, 60, 40, Rgb([0x00, 0x00, 0xff])),
    (300, 150, 40, 60, Rgb([0xff, 0xff, 0x00])),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStyle {
    /// Coloured blocks travelling across a grey belt
    Belt,
    Black,
}

/// Synthetic source, always ready. Used for probing the backend and in tests.
pub struct TestPattern {
    width: u32,
    height: u32,
    style: PatternStyle,
    open: bool,
    ticks: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, style: PatternStyle) -> Self {
        Self {
            width,
            height,
            style,
            open: false,
            ticks: 0,
        }
    }

    /// Render the pattern as it looks after `ticks` samples.
    pub fn render(&self, frame: &mut Frame, ticks: u32) {
        let (width, height) = (self.width, self.height);
        let buffer = frame.ensure_size(width, height);

        match self.style {
            PatternStyle::Black => {
                buffer.fill(0);
            }
            PatternStyle::Belt => {
                for pixel in buffer.pixels_mut() {
                    *pixel = BELT_GREY;
                }
                if width == 0 || height == 0 {
                    return;
                }

                let shift = ticks.wrapping_mul(8) % width;
                for (x, y, w, h, colour) in BLOCKS {
                    let x = (x * width / 640 + shift) % width;
                    let y = y * height / 480;
                    let w = (w * width / 640).max(1);
                    let h = (h * height / 480).max(1);
                    for py in y..(y + h).min(height) {
                        for dx in 0..w {
                            buffer.put_pixel((x + dx) % width, py, colour);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl CaptureSource for TestPattern {
    fn describe(&self) -> String {
        format!("test pattern {:?} {}x{}", self.style, self.width, self.height)
    }

    async fn open(&mut self) -> Result<(), PipelineError> {
        self.open = true;
        self.ticks = 0;
        Ok(())
    }

    async fn grab(&mut self, frame: &mut Frame) -> Result<bool, PipelineError> {
        if !self.open {
            return Ok(false);
        }
        self.render(frame, self.ticks);
        self.ticks = self.ticks.wrapping_add(1);
        Ok(true)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grab_requires_open() {
        let mut source = TestPattern::new(64, 48, PatternStyle::Belt);
        let mut frame = Frame::new();

        assert!(!source.grab(&mut frame).await.unwrap());
        assert!(frame.is_empty());

        source.open().await.unwrap();
        assert!(source.grab(&mut frame).await.unwrap());
        assert_eq!((frame.width(), frame.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_black_pattern_is_all_zero() {
        let mut source = TestPattern::new(640, 480, PatternStyle::Black);
        let mut frame = Frame::new();
        source.open().await.unwrap();
        source.grab(&mut frame).await.unwrap();

        assert!(frame.pixels().as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_belt_blocks_move_between_ticks() {
        let source = TestPattern::new(640, 480, PatternStyle::Belt);
        let mut first = Frame::new();
        let mut second = Frame::new();

        source.render(&mut first, 0);
        source.render(&mut second, 1);

        assert_eq!(first.pixels().get_pixel(100, 100), &Rgb([0xff, 0x00, 0x00]));
        assert_ne!(first.pixels().as_raw(), second.pixels().as_raw());
    }
}
