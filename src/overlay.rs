//! Detection overlay drawn onto the sampled frame.
//!
//! Only opaque colours are written, so drawing the same result twice leaves
//! the buffer exactly as after the first pass.

use crate::detection::{BoundingBox, DetectionResult, percent};
use image::{Rgb, RgbImage};

pub const BOX_COLOUR: Rgb<u8> = Rgb([0x00, 0xff, 0x88]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0x10, 0x10, 0x10]);
const STROKE: i32 = 3;
const GLYPH_ADVANCE: i32 = 6;
const LABEL_HEIGHT: i32 = 11;
/// How far outside the buffer a box edge may sit; edges beyond are pinned here.
const EDGE_MARGIN: f32 = 32.0;

/// Label text for a single-box result, e.g. "87%".
pub fn label(result: &DetectionResult) -> String {
    format!("{}%", result.percent())
}

/// Draw `result` onto `image`. Does nothing when nothing was detected.
pub fn render(image: &mut RgbImage, result: &DetectionResult) {
    if !result.detected {
        return;
    }

    if let Some(bbox) = &result.bbox {
        draw_box(image, bbox, &label(result));
    }

    for (index, object) in result.objects.iter().enumerate() {
        let id = object.id.unwrap_or(index as u32 + 1);
        let text = format!("{} {}%", id, percent(object.confidence));
        draw_box(image, &object.bbox, &text);
    }

    if result.object_count > 0 {
        let banner = format!("{} OBJECTS", result.object_count);
        draw_label(image, 4, 4, &banner);
    }
}

/// Pin a coordinate to just outside the buffer so off-screen edges stay
/// off-screen without walking far past it.
fn pin(value: f32, extent: u32) -> i32 {
    value.clamp(-EDGE_MARGIN, extent as f32 + EDGE_MARGIN).round() as i32
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, text: &str) {
    let left = pin(bbox.x1, image.width());
    let top = pin(bbox.y1, image.height());
    let right = pin(bbox.x2, image.width());
    let bottom = pin(bbox.y2, image.height());

    // Stroke centred on the box edge, like a canvas strokeRect
    for offset in -(STROKE / 2)..=(STROKE / 2) {
        stroke_rect(
            image,
            left + offset,
            top + offset,
            right - offset,
            bottom - offset,
            BOX_COLOUR,
        );
    }

    let above = top - STROKE / 2 - 2 - LABEL_HEIGHT;
    if above >= 0 {
        draw_label(image, left, above, text);
    } else {
        // No room above the box: tuck the label inside its top-left corner
        draw_label(image, left + STROKE / 2 + 1, top + STROKE / 2 + 2, text);
    }
}

/// Label box with text, top-left corner at (`x`, `y`).
fn draw_label(image: &mut RgbImage, x: i32, y: i32, text: &str) {
    let text_width = text.chars().count() as i32 * GLYPH_ADVANCE;
    fill_rect(
        image,
        x,
        y,
        x + text_width + 3,
        y + LABEL_HEIGHT - 1,
        LABEL_BACKGROUND,
    );
    draw_text(image, x + 2, y + 2, text, BOX_COLOUR);
}

fn put(image: &mut RgbImage, x: i32, y: i32, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, colour);
    }
}

fn stroke_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, colour: Rgb<u8>) {
    if left > right || top > bottom {
        return;
    }
    for x in left..=right {
        put(image, x, top, colour);
        put(image, x, bottom, colour);
    }
    for y in top..=bottom {
        put(image, left, y, colour);
        put(image, right, y, colour);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, colour: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if right < 0 || bottom < 0 || left >= width || top >= height {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, colour);
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, colour: Rgb<u8>) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        put(image, x + col, y + row as i32, colour);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

// 5x7 bitmap font; unknown characters render as blanks.
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'B' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110,
        ]),
        'C' => Some([
            0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'J' => Some([
            0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        'T' => Some([
            0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '%' => Some([
            0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011,
        ]),
        _ => None,
    }
}
