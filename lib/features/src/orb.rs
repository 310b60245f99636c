//! Oriented FAST keypoints with rotated BRIEF descriptors (single scale).

use crate::imaging::{gaussian_blur_5x5, reflect101};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bresenham circle of radius 3 used by FAST.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -3),
    (-1, -3),
];

const PATCH_RADIUS: i32 = 15;
const PAIR_RADIUS: i32 = 13;
const HARRIS_BLOCK: i32 = 7;
const HARRIS_K: f64 = 0.04;
const PAIR_SEED: u64 = 0x0b1e_5eed;

#[derive(Debug, Clone)]
pub struct OrbParams {
    pub max_keypoints: usize,
    pub fast_threshold: i32,
    /// Minimum distance between a keypoint and the image border.
    pub edge_threshold: u32,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            max_keypoints: 500,
            fast_threshold: 20,
            edge_threshold: 31,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: u32,
    pub y: u32,
    /// Scaled Harris corner measure.
    pub response: f64,
    /// Orientation in radians.
    pub angle: f64,
}

pub type Descriptor = [u8; 32];

#[inline]
fn px(gray: &GrayImage, x: i32, y: i32) -> i32 {
    let xi = reflect101(x as isize, gray.width() as usize) as u32;
    let yi = reflect101(y as isize, gray.height() as usize) as u32;
    i32::from(gray.get_pixel(xi, yi).0[0])
}

/// FAST-9 score: the largest threshold at which the pixel is still a corner,
/// or 0 when it is not a corner at `threshold`.
fn fast_score(gray: &GrayImage, x: i32, y: i32, threshold: i32) -> i32 {
    let center = px(gray, x, y);
    let ring: Vec<i32> = CIRCLE.iter().map(|(dx, dy)| px(gray, x + dx, y + dy) - center).collect();

    let arc_min = |sign: i32| -> i32 {
        // Longest contiguous run (wrapping) measured by its weakest pixel.
        let mut best = 0;
        for start in 0..16 {
            let mut weakest = i32::MAX;
            for k in 0..9 {
                weakest = weakest.min(sign * ring[(start + k) % 16]);
            }
            best = best.max(weakest);
        }
        best
    };

    let score = arc_min(1).max(arc_min(-1));
    if score > threshold {
        score
    } else {
        0
    }
}

fn harris_response(gray: &GrayImage, x: i32, y: i32) -> f64 {
    let r = HARRIS_BLOCK / 2;
    let (mut a, mut b, mut c) = (0i64, 0i64, 0i64);
    for yy in y - r..=y + r {
        for xx in x - r..=x + r {
            let dx = (px(gray, xx + 1, yy - 1) - px(gray, xx - 1, yy - 1)) * 2
                + (px(gray, xx + 1, yy) - px(gray, xx - 1, yy)) * 4
                + (px(gray, xx + 1, yy + 1) - px(gray, xx - 1, yy + 1)) * 2;
            let dy = (px(gray, xx - 1, yy + 1) - px(gray, xx - 1, yy - 1)) * 2
                + (px(gray, xx, yy + 1) - px(gray, xx, yy - 1)) * 4
                + (px(gray, xx + 1, yy + 1) - px(gray, xx + 1, yy - 1)) * 2;
            a += i64::from(dx) * i64::from(dx);
            b += i64::from(dy) * i64::from(dy);
            c += i64::from(dx) * i64::from(dy);
        }
    }
    let scale = 1.0 / (4.0 * f64::from(HARRIS_BLOCK) * 255.0);
    let scale4 = scale.powi(4);
    let (a, b, c) = (a as f64, b as f64, c as f64);
    (a * b - c * c - HARRIS_K * (a + b) * (a + b)) * scale4
}

/// Intensity-centroid orientation over a disc of radius 15.
fn orientation(gray: &GrayImage, x: i32, y: i32) -> f64 {
    let (mut m01, mut m10) = (0i64, 0i64);
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            if dx * dx + dy * dy > PATCH_RADIUS * PATCH_RADIUS {
                continue;
            }
            let v = i64::from(px(gray, x + dx, y + dy));
            m10 += i64::from(dx) * v;
            m01 += i64::from(dy) * v;
        }
    }
    (m01 as f64).atan2(m10 as f64)
}

fn test_pairs() -> Vec<[(i32, i32); 2]> {
    let mut rng = StdRng::seed_from_u64(PAIR_SEED);
    let mut coord = || rng.random_range(-PAIR_RADIUS..=PAIR_RADIUS);
    (0..256)
        .map(|_| [(coord(), coord()), (coord(), coord())])
        .collect()
}

/// Detect up to `params.max_keypoints` corners and describe them.
#[must_use]
pub fn detect_and_describe(gray: &GrayImage, params: &OrbParams) -> (Vec<Keypoint>, Vec<Descriptor>) {
    let (w, h) = (gray.width() as i32, gray.height() as i32);
    let border = params.edge_threshold as i32;
    if w <= 2 * border || h <= 2 * border {
        return (Vec::new(), Vec::new());
    }

    let mut scores = vec![0i32; (w * h) as usize];
    for y in border..h - border {
        for x in border..w - border {
            scores[(y * w + x) as usize] = fast_score(gray, x, y, params.fast_threshold);
        }
    }

    // 3x3 non-maximum suppression on the FAST score.
    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let s = scores[(y * w + x) as usize];
            if s == 0 {
                continue;
            }
            let is_max = (-1..=1).all(|dy: i32| {
                (-1..=1).all(|dx: i32| {
                    let n = scores[((y + dy) * w + x + dx) as usize];
                    (dx == 0 && dy == 0) || s > n || (s == n && (dy, dx) > (0, 0))
                })
            });
            if is_max {
                corners.push((x, y));
            }
        }
    }

    let mut keypoints: Vec<Keypoint> = corners
        .into_iter()
        .map(|(x, y)| Keypoint {
            x: x as u32,
            y: y as u32,
            response: harris_response(gray, x, y),
            angle: 0.0,
        })
        .collect();
    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((a.y, a.x).cmp(&(b.y, b.x)))
    });
    keypoints.truncate(params.max_keypoints);

    let smoothed = gaussian_blur_5x5(gray);
    let pairs = test_pairs();
    let mut descriptors = Vec::with_capacity(keypoints.len());
    for kp in &mut keypoints {
        let (x, y) = (kp.x as i32, kp.y as i32);
        kp.angle = orientation(gray, x, y);
        let (sin, cos) = kp.angle.sin_cos();
        let rotate = |(px_, py_): (i32, i32)| -> (i32, i32) {
            let rx = (f64::from(px_) * cos - f64::from(py_) * sin).round() as i32;
            let ry = (f64::from(px_) * sin + f64::from(py_) * cos).round() as i32;
            (x + rx, y + ry)
        };

        let mut desc = [0u8; 32];
        for (bit, [p, q]) in pairs.iter().enumerate() {
            let (ax, ay) = rotate(*p);
            let (bx, by) = rotate(*q);
            if px(&smoothed, ax, ay) < px(&smoothed, bx, by) {
                desc[bit / 8] |= 1 << (bit % 8);
            }
        }
        descriptors.push(desc);
    }

    (keypoints, descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(size: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            Luma([if ((x / cell) + (y / cell)) % 2 == 0 { 30 } else { 220 }])
        })
    }

    #[test]
    fn test_flat_image_has_no_keypoints() {
        let gray = GrayImage::from_pixel(128, 128, Luma([128]));
        let (kps, descs) = detect_and_describe(&gray, &OrbParams::default());
        assert!(kps.is_empty());
        assert!(descs.is_empty());
    }

    #[test]
    fn test_small_image_has_no_keypoints() {
        let (kps, _) = detect_and_describe(&checkerboard(40, 8), &OrbParams::default());
        assert!(kps.is_empty());
    }

    #[test]
    fn test_corners_are_found_and_capped() {
        let gray = GrayImage::from_fn(160, 160, |x, y| {
            let inside = (50..110).contains(&x) && (50..110).contains(&y);
            Luma([if inside { 220 } else { 20 }])
        });
        let (kps, descs) = detect_and_describe(&gray, &OrbParams::default());
        assert!(!kps.is_empty());
        assert_eq!(kps.len(), descs.len());
        assert!(kps.iter().all(|k| (31..129).contains(&k.x) && (31..129).contains(&k.y)));

        let params = OrbParams {
            max_keypoints: 2,
            ..Default::default()
        };
        let (capped, _) = detect_and_describe(&gray, &params);
        assert!(capped.len() <= 2);
    }

    #[test]
    fn test_deterministic() {
        let gray = checkerboard(128, 16);
        let (a, da) = detect_and_describe(&gray, &OrbParams::default());
        let (b, db) = detect_and_describe(&gray, &OrbParams::default());
        assert_eq!(a, b);
        assert_eq!(da, db);
    }
}
