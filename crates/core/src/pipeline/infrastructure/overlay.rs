use std::ops::Range;

use ndarray::{s, ArrayViewMut3};

use crate::shared::frame::Frame;
use crate::shared::inference_result::{BoundingBox, InferenceResult, LandmarkSet};

pub const DETECTION_COLOR: [u8; 3] = [0, 255, 0];
pub const LANDMARK_COLOR: [u8; 3] = [255, 64, 64];

const BOX_THICKNESS: u32 = 2;
const POINT_RADIUS: usize = 1;

/// Draws every detection box and landmark set of `result` onto `frame`.
pub fn draw_result(frame: &mut Frame, result: &InferenceResult) {
    for detection in &result.detections {
        draw_box(frame, &detection.bbox, DETECTION_COLOR, BOX_THICKNESS);
    }
    for set in &result.landmarks {
        draw_landmarks(frame, set, LANDMARK_COLOR);
    }
}

/// Draws the outline of a normalized box. Boxes that clamp to nothing are
/// skipped.
pub fn draw_box(frame: &mut Frame, bbox: &BoundingBox, color: [u8; 3], thickness: u32) {
    let (fw, fh) = frame.dimensions();
    let (x, y, w, h) = bbox.to_pixels(fw, fh);
    if w == 0 || h == 0 {
        return;
    }
    let t = thickness.max(1).min(w).min(h) as usize;
    let (x0, y0) = (x as usize, y as usize);
    let (x1, y1) = (x0 + w as usize, y0 + h as usize);

    let mut view = frame.as_ndarray_mut();
    fill(&mut view, y0..y0 + t, x0..x1, color);
    fill(&mut view, y1 - t..y1, x0..x1, color);
    fill(&mut view, y0..y1, x0..x0 + t, color);
    fill(&mut view, y0..y1, x1 - t..x1, color);
}

/// Draws landmark points as small squares and their connections as lines.
pub fn draw_landmarks(frame: &mut Frame, set: &LandmarkSet, color: [u8; 3]) {
    let (fw, fh) = frame.dimensions();
    if fw == 0 || fh == 0 {
        return;
    }
    let to_pixel = |x: f64, y: f64| -> (usize, usize) {
        let px = (x * fw as f64).round().clamp(0.0, (fw - 1) as f64);
        let py = (y * fh as f64).round().clamp(0.0, (fh - 1) as f64);
        (px as usize, py as usize)
    };
    let mut view = frame.as_ndarray_mut();

    if let Some(connections) = &set.connections {
        for &(a, b) in connections {
            let (Some(pa), Some(pb)) = (set.points.get(a), set.points.get(b)) else {
                continue;
            };
            draw_line(&mut view, to_pixel(pa.x, pa.y), to_pixel(pb.x, pb.y), color);
        }
    }

    for point in &set.points {
        let (px, py) = to_pixel(point.x, point.y);
        let rows = py.saturating_sub(POINT_RADIUS)..(py + POINT_RADIUS + 1).min(fh as usize);
        let cols = px.saturating_sub(POINT_RADIUS)..(px + POINT_RADIUS + 1).min(fw as usize);
        fill(&mut view, rows, cols, color);
    }
}

fn draw_line(
    view: &mut ArrayViewMut3<'_, u8>,
    (x0, y0): (usize, usize),
    (x1, y1): (usize, usize),
    color: [u8; 3],
) {
    let dx = x1 as f64 - x0 as f64;
    let dy = y1 as f64 - y0 as f64;
    let steps = dx.abs().max(dy.abs()).max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let x = (x0 as f64 + dx * t).round() as usize;
        let y = (y0 as f64 + dy * t).round() as usize;
        fill(view, y..y + 1, x..x + 1, color);
    }
}

fn fill(view: &mut ArrayViewMut3<'_, u8>, rows: Range<usize>, cols: Range<usize>, color: [u8; 3]) {
    let channels = view.shape()[2].min(color.len());
    for (c, value) in color.iter().take(channels).enumerate() {
        view.slice_mut(s![rows.clone(), cols.clone(), c]).fill(*value);
    }
}
