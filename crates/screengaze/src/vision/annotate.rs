//! Debug annotation of detection results

use crate::types::Quadrilateral;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const NO_SCREEN: Rgb<u8> = Rgb([255, 0, 0]);
/// TL, TR, BR, BL
const CORNER_COLORS: [Rgb<u8>; 4] = [
    Rgb([255, 0, 0]),
    Rgb([255, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 0, 255]),
];
const CORNER_RADIUS: i32 = 5;
const BANNER_HEIGHT: u32 = 12;

/// Copy of `frame` with the detected outline and corners drawn on it, or a
/// red banner along the top edge when nothing was found.
pub fn annotate_detection(frame: &RgbImage, quad: Option<&Quadrilateral>) -> RgbImage {
    let mut out = frame.clone();

    let Some(quad) = quad else {
        let (width, height) = (out.width(), BANNER_HEIGHT.min(out.height()));
        if width > 0 && height > 0 {
            draw_filled_rect_mut(&mut out, Rect::at(0, 0).of_size(width, height), NO_SCREEN);
        }
        return out;
    };

    let corners = quad.corners();
    for i in 0..corners.len() {
        let a = corners[i];
        let b = corners[(i + 1) % corners.len()];
        // 3px wide outline
        for offset in [-1.0f32, 0.0, 1.0] {
            draw_line_segment_mut(
                &mut out,
                (a.x as f32 + offset, a.y as f32),
                (b.x as f32 + offset, b.y as f32),
                OUTLINE,
            );
            draw_line_segment_mut(
                &mut out,
                (a.x as f32, a.y as f32 + offset),
                (b.x as f32, b.y as f32 + offset),
                OUTLINE,
            );
        }
    }

    for (corner, color) in corners.iter().zip(CORNER_COLORS) {
        draw_filled_circle_mut(
            &mut out,
            (corner.x.round() as i32, corner.y.round() as i32),
            CORNER_RADIUS,
            color,
        );
    }

    out
}
