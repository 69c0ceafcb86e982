//! Locating a reference "object" image inside a larger "scene" image.
//!
//! Two modes: feature-based registration ([`ImageDetector::detect_corresponding_zone`])
//! tolerating uniform scaling and quarter-turn rotation, and exact template
//! matching ([`ImageDetector::detect_exact_zone_without_scale`],
//! [`ImageDetector::detect_exact_zone_with_scale`]) for near-exact crops.

pub mod registration;
mod template;

use crate::config::DetectionSettings;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Rotation of the detected zone relative to the object image, restricted
/// to quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rotation {
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Width and height swap roles at quarter turns.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// Successful detection: where the object sits in the scene, how it is
/// rotated, and the uniform scale factor between the two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectedZone {
    pub rectangle: Rect,
    pub rotation: Rotation,
    pub size_ratio: f64,
}

/// One detection session over a fixed scene/object image pair.
///
/// Not reusable across image pairs; construct a new detector per search.
/// Instances are independent of each other.
#[derive(Debug)]
pub struct ImageDetector {
    scene: GrayImage,
    object: GrayImage,
    settings: DetectionSettings,
    detected_zone: Option<DetectedZone>,
}

impl ImageDetector {
    /// Build a detector from image files, failing fast when either file
    /// is missing or unreadable.
    pub fn from_paths(scene: &Path, object: &Path, detection_threshold: f64) -> Result<Self> {
        let scene_image = image::open(scene).map_err(|e| {
            Error::ImageSearch(format!("Cannot read scene image {}: {}", scene.display(), e))
        })?;
        let object_image = image::open(object).map_err(|e| {
            Error::ImageSearch(format!(
                "Cannot read object image {}: {}",
                object.display(),
                e
            ))
        })?;
        Ok(Self::from_images(
            &scene_image,
            &object_image,
            detection_threshold,
        ))
    }

    pub fn from_images(
        scene: &DynamicImage,
        object: &DynamicImage,
        detection_threshold: f64,
    ) -> Self {
        Self {
            scene: scene.to_luma8(),
            object: object.to_luma8(),
            settings: DetectionSettings {
                detection_threshold,
                ..DetectionSettings::default()
            },
            detected_zone: None,
        }
    }

    /// Override the tolerance settings (keeps the detection threshold
    /// passed at construction).
    pub fn with_settings(mut self, settings: DetectionSettings) -> Self {
        let threshold = self.settings.detection_threshold;
        self.settings = settings;
        self.settings.detection_threshold = threshold;
        self
    }

    /// Result of the last successful detection, if any.
    pub fn detected_zone(&self) -> Option<DetectedZone> {
        self.detected_zone
    }

    /// Feature-based registration of the object inside the scene.
    ///
    /// Finds keypoint correspondences, estimates a least-squares transform
    /// over the good matches, then validates that the mapped region is an
    /// axis-aligned rectangle rotated by a multiple of 90° and uniformly
    /// scaled.
    pub fn detect_corresponding_zone(&mut self) -> Result<DetectedZone> {
        let object_features = registration::detect_features(&self.object);
        let scene_features = registration::detect_features(&self.scene);
        debug!(
            object_keypoints = object_features.len(),
            scene_keypoints = scene_features.len(),
            "detected keypoints"
        );

        let matches = registration::match_features(&object_features, &scene_features);
        let good: Vec<_> = matches
            .iter()
            .filter(|m| m.distance < self.settings.detection_threshold)
            .collect();
        debug!(total = matches.len(), good = good.len(), "matched descriptors");
        if good.is_empty() {
            return Err(Error::ImageSearch("Cannot find matching zone".into()));
        }

        let pairs: Vec<_> = good
            .iter()
            .map(|m| {
                (
                    object_features.keypoints[m.object_index],
                    scene_features.keypoints[m.scene_index],
                )
            })
            .collect();
        let transform = registration::estimate_affine(&pairs).ok_or_else(|| {
            Error::ImageSearch("Cannot find matching zone: match geometry is degenerate".into())
        })?;

        let width = self.object.width() as f64;
        let height = self.object.height() as f64;
        let object_corners = [
            (0.0, 0.0),
            (width, 0.0),
            (width, height),
            (0.0, height),
        ];
        let scene_corners = object_corners.map(|(x, y)| transform.apply(x, y));

        let rotation = check_rotation_angle(
            &scene_corners,
            &object_corners,
            self.settings.rotation_tolerance_degrees,
        )?;
        let corrected = correct_corner_points(scene_corners, rotation);

        let min_x = corrected.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corrected
            .iter()
            .map(|c| c.0)
            .fold(f64::NEG_INFINITY, f64::max);
        let min_y = corrected.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corrected
            .iter()
            .map(|c| c.1)
            .fold(f64::NEG_INFINITY, f64::max);

        let size_ratio = check_detection_zone_aspect_ratio(
            max_x - min_x,
            max_y - min_y,
            width,
            height,
            rotation,
            self.settings.aspect_ratio_tolerance,
        )?;

        let zone = DetectedZone {
            rectangle: Rect::new(
                min_x.round() as i32,
                min_y.round() as i32,
                (max_x - min_x).round() as i32,
                (max_y - min_y).round() as i32,
            ),
            rotation,
            size_ratio,
        };
        debug!(rect = %zone.rectangle, rotation = zone.rotation.degrees(), size_ratio = zone.size_ratio, "zone detected");
        self.detected_zone = Some(zone);
        Ok(zone)
    }

    /// Exact pixel-pattern matching at the object's own scale.
    pub fn detect_exact_zone_without_scale(&mut self) -> Result<DetectedZone> {
        let zone = template::detect_without_scale(
            &self.scene,
            &self.object,
            self.settings.template_acceptance_threshold,
        )?;
        self.detected_zone = Some(zone);
        Ok(zone)
    }

    /// Exact pixel-pattern matching across a bounded range of scale factors.
    pub fn detect_exact_zone_with_scale(&mut self) -> Result<DetectedZone> {
        let zone = template::detect_with_scale(
            &self.scene,
            &self.object,
            self.settings.template_acceptance_threshold,
        )?;
        self.detected_zone = Some(zone);
        Ok(zone)
    }
}

/// Angle, in degrees within [0, 360), by which the object edge
/// `object_from -> object_to` must rotate to align with the scene edge.
fn edge_rotation_degrees(
    scene_from: (f64, f64),
    scene_to: (f64, f64),
    object_from: (f64, f64),
    object_to: (f64, f64),
) -> f64 {
    let (vx, vy) = (scene_to.0 - scene_from.0, scene_to.1 - scene_from.1);
    let (ux, uy) = (object_to.0 - object_from.0, object_to.1 - object_from.1);
    let cross = ux * vy - uy * vx;
    let dot = ux * vx + uy * vy;
    let mut degrees = cross.atan2(dot).to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    degrees
}

/// Round an edge angle to the nearest degree and snap it onto the nearest
/// multiple of 90 when within `tolerance_degrees` of it.
fn snap_to_quadrant(degrees: f64, tolerance_degrees: f64) -> Result<i32> {
    let rounded = degrees.round();
    let nearest = (rounded / 90.0).round() * 90.0;
    if (rounded - nearest).abs() > tolerance_degrees {
        return Err(Error::ImageSearch(format!(
            "Rotation angle {}° is not a multiple of 90°",
            rounded
        )));
    }
    Ok((nearest as i32).rem_euclid(360))
}

/// Validate that all four corresponding edge pairs rotate by the same
/// multiple of 90°, confirming the detected zone is a quarter-turn
/// rotated rectangle rather than an arbitrary quadrilateral.
pub fn check_rotation_angle(
    scene_corners: &[(f64, f64); 4],
    object_corners: &[(f64, f64); 4],
    tolerance_degrees: f64,
) -> Result<Rotation> {
    let edge = |i: usize| {
        let j = (i + 1) % 4;
        edge_rotation_degrees(
            scene_corners[i],
            scene_corners[j],
            object_corners[i],
            object_corners[j],
        )
    };

    let first = snap_to_quadrant(edge(0), tolerance_degrees)?;
    for i in 1..4 {
        let angle = snap_to_quadrant(edge(i), tolerance_degrees)?;
        if angle != first {
            return Err(Error::ImageSearch(format!(
                "Detected zone is not a rectangle: edge rotations differ ({}° vs {}°)",
                first, angle
            )));
        }
    }

    Ok(match first {
        0 => Rotation::R0,
        90 => Rotation::R90,
        180 => Rotation::R180,
        _ => Rotation::R270,
    })
}

/// Force collinearity of the matched corners by averaging paired
/// coordinates, producing an exact axis-aligned rectangle. Which corners
/// pair up depends on whether the rotation swaps the axes.
pub fn correct_corner_points(corners: [(f64, f64); 4], rotation: Rotation) -> [(f64, f64); 4] {
    let [p1, p2, p3, p4] = corners;
    if !rotation.swaps_axes() {
        // p1-p2 and p3-p4 are the horizontal edges
        let y12 = (p1.1 + p2.1) / 2.0;
        let y34 = (p3.1 + p4.1) / 2.0;
        let x14 = (p1.0 + p4.0) / 2.0;
        let x23 = (p2.0 + p3.0) / 2.0;
        [(x14, y12), (x23, y12), (x23, y34), (x14, y34)]
    } else {
        // p1-p2 and p3-p4 are the vertical edges
        let x12 = (p1.0 + p2.0) / 2.0;
        let x34 = (p3.0 + p4.0) / 2.0;
        let y14 = (p1.1 + p4.1) / 2.0;
        let y23 = (p2.1 + p3.1) / 2.0;
        [(x12, y14), (x12, y23), (x34, y23), (x34, y14)]
    }
}

/// Validate uniform scaling between the detected zone and the object
/// image; the accepted ratio becomes the zone's size ratio.
pub fn check_detection_zone_aspect_ratio(
    scene_width: f64,
    scene_height: f64,
    object_width: f64,
    object_height: f64,
    rotation: Rotation,
    tolerance: f64,
) -> Result<f64> {
    let (width_ratio, height_ratio) = if rotation.swaps_axes() {
        (scene_width / object_height, scene_height / object_width)
    } else {
        (scene_width / object_width, scene_height / object_height)
    };

    if (width_ratio - height_ratio).abs() > tolerance {
        return Err(Error::ImageSearch(format!(
            "Aspect ratio of the detected zone is not the same in both dimensions: {:.2} vs {:.2}",
            width_ratio, height_ratio
        )));
    }
    Ok((width_ratio + height_ratio) / 2.0)
}
