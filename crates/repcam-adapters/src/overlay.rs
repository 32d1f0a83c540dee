//! Result overlays burned into recorded frames.
//!
//! Text rendering is out of scope; results are drawn as shapes. A coloured
//! border identifies the top label, bars show the top-k scores and a row of
//! pips per counter shows its count.

// Pixel geometry is small and non-negative
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use image::{Rgb, RgbImage};
use repcam_core::RunResult;

const BAND: u32 = 4;
const BAR_HEIGHT: u32 = 6;
const PIP: u32 = 5;
const GAP: u32 = 2;
const MAX_PIPS: u32 = 30;

const TRACK: Rgb<u8> = Rgb([40, 40, 40]);
const PIP_ON: Rgb<u8> = Rgb([255, 255, 255]);

/// Colours cycled through by label index.
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([255, 225, 25]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
    Rgb([240, 50, 230]),
];

/// Colour used for label `index`.
#[must_use]
pub const fn label_colour(index: usize) -> Rgb<u8> {
    PALETTE[index % PALETTE.len()]
}

/// Draws a result on top of a copy of `frame`.
#[must_use]
pub fn render(frame: &RgbImage, result: &RunResult) -> RgbImage {
    let mut canvas = frame.clone();

    if let Some(top) = result.top_label() {
        draw_border(&mut canvas, label_colour(top.index));
    }

    let inner_width = canvas.width().saturating_sub(4 * BAND);
    let mut y = canvas.height().saturating_sub(2 * BAND);
    for score in result.top_k.iter().rev() {
        y = y.saturating_sub(BAR_HEIGHT + GAP);
        let filled = (score.score.clamp(0.0, 1.0) * inner_width as f32).round() as u32;
        fill_rect(&mut canvas, 2 * BAND, y, inner_width, BAR_HEIGHT, TRACK);
        fill_rect(&mut canvas, 2 * BAND, y, filled, BAR_HEIGHT, label_colour(score.index));
    }

    let mut y = 2 * BAND;
    for (_, count) in result.counts.iter() {
        let shown = count.min(MAX_PIPS);
        for i in 0..shown {
            fill_rect(&mut canvas, 2 * BAND + i * (PIP + GAP), y, PIP, PIP, PIP_ON);
        }
        y += PIP + GAP;
    }

    canvas
}

fn draw_border(canvas: &mut RgbImage, colour: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    fill_rect(canvas, 0, 0, w, BAND, colour);
    fill_rect(canvas, 0, h.saturating_sub(BAND), w, BAND, colour);
    fill_rect(canvas, 0, 0, BAND, h, colour);
    fill_rect(canvas, w.saturating_sub(BAND), 0, BAND, h, colour);
}

/// Fills a rectangle, clipped to the canvas.
fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, colour: Rgb<u8>) {
    let x_end = x.saturating_add(w).min(canvas.width());
    let y_end = y.saturating_add(h).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, colour);
        }
    }
}
