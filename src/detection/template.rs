//! Normalized cross-correlation template matching, with and without a
//! scale sweep. Used when the object image is a near-exact crop of the
//! scene (e.g. locating a browser viewport inside a desktop screenshot).

use crate::detection::{DetectedZone, Rotation};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use image::{imageops, GrayImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use tracing::debug;

/// Scale sweep bounds and step for [`detect_with_scale`].
const MIN_SCALE: f64 = 0.5;
const MAX_SCALE: f64 = 2.0;
const SCALE_STEP: f64 = 0.1;

/// Best NCC match of `object` inside `scene`, or `None` when the object
/// does not fit or the score map is degenerate.
fn best_match(scene: &GrayImage, object: &GrayImage) -> Option<(Rect, f32)> {
    if object.width() == 0
        || object.height() == 0
        || object.width() > scene.width()
        || object.height() > scene.height()
    {
        return None;
    }

    let scores = match_template(
        scene,
        object,
        MatchTemplateMethod::CrossCorrelationNormalized,
    );
    let extremes = find_extremes(&scores);
    if !extremes.max_value.is_finite() {
        return None;
    }

    let (x, y) = extremes.max_value_location;
    let rect = Rect::new(
        x as i32,
        y as i32,
        object.width() as i32,
        object.height() as i32,
    );
    Some((rect, extremes.max_value))
}

/// Single-scale exact matching.
pub(crate) fn detect_without_scale(
    scene: &GrayImage,
    object: &GrayImage,
    acceptance: f32,
) -> Result<DetectedZone> {
    let (rect, score) = best_match(scene, object).ok_or_else(|| {
        Error::ImageSearch("Cannot find exact zone: object does not fit inside the scene".into())
    })?;

    debug!(%rect, score, "template match");
    if score < acceptance {
        return Err(Error::ImageSearch(format!(
            "Cannot find exact zone: best score {:.3} is below the acceptance threshold {:.3}",
            score, acceptance
        )));
    }

    Ok(DetectedZone {
        rectangle: rect,
        rotation: Rotation::R0,
        size_ratio: 1.0,
    })
}

/// Exact matching over a bounded scale sweep of the object image; the
/// highest-scoring factor wins.
pub(crate) fn detect_with_scale(
    scene: &GrayImage,
    object: &GrayImage,
    acceptance: f32,
) -> Result<DetectedZone> {
    let mut best: Option<(Rect, f32, f64)> = None;

    let steps = ((MAX_SCALE - MIN_SCALE) / SCALE_STEP).round() as u32;
    for step in 0..=steps {
        let factor = MIN_SCALE + SCALE_STEP * step as f64;
        let width = ((object.width() as f64 * factor).round() as u32).max(1);
        let height = ((object.height() as f64 * factor).round() as u32).max(1);
        let scaled = imageops::resize(object, width, height, imageops::FilterType::Lanczos3);

        if let Some((rect, score)) = best_match(scene, &scaled) {
            debug!(factor, score, "template match at scale");
            if best.map_or(true, |(_, s, _)| score > s) {
                best = Some((rect, score, factor));
            }
        }
    }

    match best {
        Some((rect, score, factor)) if score >= acceptance => Ok(DetectedZone {
            rectangle: rect,
            rotation: Rotation::R0,
            size_ratio: factor,
        }),
        Some((_, score, _)) => Err(Error::ImageSearch(format!(
            "Cannot find exact zone at any scale: best score {:.3} is below the acceptance threshold {:.3}",
            score, acceptance
        ))),
        None => Err(Error::ImageSearch(
            "Cannot find exact zone at any scale: object does not fit inside the scene".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Deterministic high-contrast texture.
    fn textured(width: u32, height: u32, salt: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ salt.wrapping_mul(101))
                .wrapping_add(x * y);
            Luma([if v % 5 < 2 { 255 } else { 0 }])
        })
    }

    fn embed(scene: &mut GrayImage, object: &GrayImage, at_x: u32, at_y: u32) {
        for (x, y, p) in object.enumerate_pixels() {
            scene.put_pixel(at_x + x, at_y + y, *p);
        }
    }

    #[test]
    fn finds_embedded_crop() {
        let object = textured(40, 30, 7);
        let mut scene = GrayImage::from_pixel(300, 200, Luma([128]));
        embed(&mut scene, &object, 120, 60);

        let zone = detect_without_scale(&scene, &object, 0.9).unwrap();
        assert_eq!(zone.rectangle, Rect::new(120, 60, 40, 30));
        assert_eq!(zone.rotation, Rotation::R0);
        assert_eq!(zone.size_ratio, 1.0);
    }

    #[test]
    fn rejects_object_larger_than_scene() {
        let object = textured(100, 100, 1);
        let scene = textured(50, 50, 2);
        let err = detect_without_scale(&scene, &object, 0.9).unwrap_err();
        assert!(matches!(err, Error::ImageSearch(_)));
    }

    #[test]
    fn scale_sweep_reports_factor() {
        let object = textured(40, 40, 3);
        // embed an unscaled copy; the sweep should settle on factor 1.0
        let mut scene = GrayImage::from_pixel(200, 200, Luma([128]));
        embed(&mut scene, &object, 80, 80);

        let zone = detect_with_scale(&scene, &object, 0.9).unwrap();
        assert_eq!(zone.rectangle, Rect::new(80, 80, 40, 40));
        assert!((zone.size_ratio - 1.0).abs() < 1e-9);
    }
}
