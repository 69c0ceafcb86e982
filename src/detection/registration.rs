//! Image registration backend: keypoint detection, patch descriptors,
//! nearest-neighbour matching and least-squares transform estimation.
//!
//! The seam is deliberately small (detect, match, estimate, apply) so the
//! backend can be swapped for any keypoint/homography library. The built-in
//! backend uses FAST-9 corners with mean-normalized grayscale patch
//! descriptors; descriptor distance is the mean squared difference of the
//! [0,1]-scaled patches, minimized over the four 90° rotations of the
//! counterpart patch so that quarter-turn rotated copies still match.

use image::GrayImage;
use imageproc::corners::corners_fast9;
use std::cmp::Ordering;

/// Side length of the square descriptor patch. Odd, so a keypoint sits on
/// the center pixel.
const PATCH_SIZE: usize = 9;
const PATCH_RADIUS: i64 = (PATCH_SIZE as i64) / 2;
/// FAST corner score threshold.
const FAST_THRESHOLD: u8 = 20;
/// Strongest-first cap on keypoints per image, keeps matching tractable.
const MAX_KEYPOINTS: usize = 800;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
}

/// Mean-centered grayscale patch, stored with its four quarter-turn
/// rotations so matching against a rotated counterpart is a table lookup.
#[derive(Debug, Clone)]
pub struct Descriptor {
    rotations: [Vec<f32>; 4],
}

impl Descriptor {
    fn from_patch(patch: Vec<f32>) -> Self {
        let r1 = rotate_patch(&patch, PATCH_SIZE);
        let r2 = rotate_patch(&r1, PATCH_SIZE);
        let r3 = rotate_patch(&r2, PATCH_SIZE);
        Self {
            rotations: [patch, r1, r2, r3],
        }
    }

    /// Distance in [0, ~1]: mean squared difference of the canonical patch
    /// against the closest rotation of `other`.
    pub fn distance(&self, other: &Descriptor) -> f64 {
        other
            .rotations
            .iter()
            .map(|rotated| mean_squared_difference(&self.rotations[0], rotated))
            .fold(f64::INFINITY, f64::min)
    }
}

/// 90° clockwise rotation of a row-major square patch.
fn rotate_patch(patch: &[f32], n: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; n * n];
    for row in 0..n {
        for col in 0..n {
            out[row * n + col] = patch[(n - 1 - col) * n + row];
        }
    }
    out
}

fn mean_squared_difference(a: &[f32], b: &[f32]) -> f64 {
    let mut acc = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = (*x - *y) as f64;
        acc += d * d;
    }
    acc / a.len() as f64
}

/// Keypoints plus their descriptors for one image.
pub struct FeatureSet {
    pub keypoints: Vec<KeyPoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detect FAST corners and describe the strongest ones.
///
/// Corners too close to the border for a full patch are dropped.
pub fn detect_features(image: &GrayImage) -> FeatureSet {
    let mut corners = corners_fast9(image, FAST_THRESHOLD);
    corners.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keypoints = Vec::new();
    let mut descriptors = Vec::new();
    for corner in corners {
        if keypoints.len() >= MAX_KEYPOINTS {
            break;
        }
        let (cx, cy) = (corner.x as i64, corner.y as i64);
        if cx < PATCH_RADIUS
            || cy < PATCH_RADIUS
            || cx + PATCH_RADIUS >= image.width() as i64
            || cy + PATCH_RADIUS >= image.height() as i64
        {
            continue;
        }
        descriptors.push(describe(image, cx, cy));
        keypoints.push(KeyPoint {
            x: corner.x as f64,
            y: corner.y as f64,
        });
    }

    FeatureSet {
        keypoints,
        descriptors,
    }
}

fn describe(image: &GrayImage, cx: i64, cy: i64) -> Descriptor {
    let mut patch = Vec::with_capacity(PATCH_SIZE * PATCH_SIZE);
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            let px = image.get_pixel((cx + dx) as u32, (cy + dy) as u32).0[0];
            patch.push(px as f32 / 255.0);
        }
    }
    let mean = patch.iter().sum::<f32>() / patch.len() as f32;
    for value in &mut patch {
        *value -= mean;
    }
    Descriptor::from_patch(patch)
}

/// One object-to-scene correspondence.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMatch {
    pub object_index: usize,
    pub scene_index: usize,
    pub distance: f64,
}

/// Nearest-neighbour match of every object descriptor against the scene set.
pub fn match_features(object: &FeatureSet, scene: &FeatureSet) -> Vec<FeatureMatch> {
    let mut matches = Vec::with_capacity(object.len());
    for (object_index, descriptor) in object.descriptors.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (scene_index, candidate) in scene.descriptors.iter().enumerate() {
            let distance = descriptor.distance(candidate);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((scene_index, distance));
            }
        }
        if let Some((scene_index, distance)) = best {
            matches.push(FeatureMatch {
                object_index,
                scene_index,
                distance,
            });
        }
    }
    matches
}

/// Affine transform `x' = a·x + b·y + c`, `y' = d·x + e·y + f`.
#[derive(Debug, Clone, Copy)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

/// Least-squares affine estimation over matched point pairs.
///
/// Returns `None` when fewer than three pairs are available or the pairs
/// are (near-)collinear, leaving the normal equations singular.
pub fn estimate_affine(pairs: &[(KeyPoint, KeyPoint)]) -> Option<AffineTransform> {
    if pairs.len() < 3 {
        return None;
    }

    let n = pairs.len() as f64;
    let (mut sxx, mut sxy, mut syy, mut sx, mut sy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let mut rhs_x = [0.0f64; 3];
    let mut rhs_y = [0.0f64; 3];
    for (from, to) in pairs {
        sxx += from.x * from.x;
        sxy += from.x * from.y;
        syy += from.y * from.y;
        sx += from.x;
        sy += from.y;
        rhs_x[0] += from.x * to.x;
        rhs_x[1] += from.y * to.x;
        rhs_x[2] += to.x;
        rhs_y[0] += from.x * to.y;
        rhs_y[1] += from.y * to.y;
        rhs_y[2] += to.y;
    }

    let m = [[sxx, sxy, sx], [sxy, syy, sy], [sx, sy, n]];
    let [a, b, c] = solve3(&m, &rhs_x)?;
    let [d, e, f] = solve3(&m, &rhs_y)?;
    Some(AffineTransform { a, b, c, d, e, f })
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn solve3(m: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let det = det3(m);
    if det.abs() < 1e-9 {
        return None;
    }
    let mut out = [0.0f64; 3];
    for col in 0..3 {
        let mut replaced = *m;
        for row in 0..3 {
            replaced[row][col] = b[row];
        }
        out[col] = det3(&replaced) / det;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn kp(x: f64, y: f64) -> KeyPoint {
        KeyPoint { x, y }
    }

    #[test]
    fn affine_recovers_pure_translation() {
        let pairs: Vec<_> = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (7.0, 3.0)]
            .iter()
            .map(|&(x, y)| (kp(x, y), kp(x + 40.0, y + 25.0)))
            .collect();
        let t = estimate_affine(&pairs).unwrap();
        let (x, y) = t.apply(5.0, 5.0);
        assert!((x - 45.0).abs() < 1e-6);
        assert!((y - 30.0).abs() < 1e-6);
    }

    #[test]
    fn affine_recovers_uniform_scale() {
        let pairs: Vec<_> = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]
            .iter()
            .map(|&(x, y)| (kp(x, y), kp(x * 1.5, y * 1.5)))
            .collect();
        let t = estimate_affine(&pairs).unwrap();
        let (x, y) = t.apply(10.0, 10.0);
        assert!((x - 15.0).abs() < 1e-6);
        assert!((y - 15.0).abs() < 1e-6);
    }

    #[test]
    fn affine_rejects_collinear_points() {
        let pairs: Vec<_> = [(0.0, 5.0), (10.0, 5.0), (20.0, 5.0)]
            .iter()
            .map(|&(x, y)| (kp(x, y), kp(x, y)))
            .collect();
        assert!(estimate_affine(&pairs).is_none());
    }

    #[test]
    fn affine_rejects_too_few_points() {
        let pairs = vec![(kp(0.0, 0.0), kp(1.0, 1.0)), (kp(5.0, 5.0), kp(6.0, 6.0))];
        assert!(estimate_affine(&pairs).is_none());
    }

    #[test]
    fn patch_rotation_is_a_quarter_turn() {
        let n = 3;
        let patch: Vec<f32> = (0..9).map(|v| v as f32).collect();
        // 0 1 2        6 3 0
        // 3 4 5   ->   7 4 1
        // 6 7 8        8 5 2
        let rotated = rotate_patch(&patch, n);
        assert_eq!(rotated, vec![6.0, 3.0, 0.0, 7.0, 4.0, 1.0, 8.0, 5.0, 2.0]);

        // four turns return to the original
        let back = rotate_patch(
            &rotate_patch(&rotate_patch(&rotated, n), n),
            n,
        );
        assert_eq!(back, patch);
    }

    #[test]
    fn identical_patches_have_zero_distance() {
        let mut img = GrayImage::new(32, 32);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Luma([((x * 7 + y * 13) % 251) as u8]);
        }
        let a = describe(&img, 10, 10);
        let b = describe(&img, 10, 10);
        assert!(a.distance(&b) < 1e-9);
    }

    #[test]
    fn distinct_patches_have_large_distance() {
        let mut img = GrayImage::new(64, 32);
        for (x, y, p) in img.enumerate_pixels_mut() {
            // high-contrast pseudo-random texture
            let v = if (x * 31 + y * 17 + x * y) % 5 < 2 { 255 } else { 0 };
            *p = Luma([v]);
        }
        let a = describe(&img, 10, 10);
        let b = describe(&img, 40, 20);
        assert!(a.distance(&b) > 0.05);
    }
}
