//! Low-level image operations shared by the extractors.
//!
//! 8-bit planes use `image::GrayImage`; derivative responses use [`Plane`]
//! (f64). Neighborhood operations reflect at the border without repeating the
//! edge pixel (`dcb|abcd|cba`).

use image::{GrayImage, Luma, RgbImage};

/// A single-channel f64 raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Plane {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| f64::from(v)).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.data[y * self.width + x] = value;
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    #[must_use]
    pub fn zip_map(&self, other: &Plane, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }
}

/// Population mean.
#[must_use]
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Population variance.
#[must_use]
pub fn variance<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let m = mean(iter.clone());
    mean(iter.map(|v| (v - m) * (v - m)))
}

#[must_use]
pub fn std_dev<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    variance(values).sqrt()
}

#[must_use]
pub fn gray_values(gray: &GrayImage) -> impl Iterator<Item = f64> + Clone + '_ {
    gray.as_raw().iter().map(|&v| f64::from(v))
}

/// Border index for reflect-101 extrapolation.
#[inline]
#[must_use]
pub fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Luma with BT.601 weights in 14-bit fixed point, rounded.
#[must_use]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = src.0;
        let y = (u32::from(r) * 4899 + u32::from(g) * 9617 + u32::from(b) * 1868 + 8192) >> 14;
        *dst = Luma([y.min(255) as u8]);
    }
    gray
}

/// HSV on the 8-bit scale: hue in [0, 180), saturation and value in [0, 255].
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
}

#[must_use]
pub fn to_hsv(image: &RgbImage) -> HsvPlanes {
    let (w, h) = image.dimensions();
    let mut hue = GrayImage::new(w, h);
    let mut saturation = GrayImage::new(w, h);
    let mut value = GrayImage::new(w, h);

    for (x, y, px) in image.enumerate_pixels() {
        let [r, g, b] = px.0.map(f64::from);
        let v = r.max(g).max(b);
        let min = r.min(g).min(b);
        let diff = v - min;

        let s = if v > 0.0 { (255.0 * diff / v).round() } else { 0.0 };
        let mut hdeg = if diff == 0.0 {
            0.0
        } else if v == r {
            60.0 * (g - b) / diff
        } else if v == g {
            120.0 + 60.0 * (b - r) / diff
        } else {
            240.0 + 60.0 * (r - g) / diff
        };
        if hdeg < 0.0 {
            hdeg += 360.0;
        }
        let hv = (hdeg / 2.0).round() as u32 % 180;

        hue.put_pixel(x, y, Luma([hv as u8]));
        saturation.put_pixel(x, y, Luma([s as u8]));
        value.put_pixel(x, y, Luma([v as u8]));
    }

    HsvPlanes {
        hue,
        saturation,
        value,
    }
}

/// 5x5 Gaussian blur with the binomial kernel [1 4 6 4 1] / 16.
#[must_use]
pub fn gaussian_blur_5x5(gray: &GrayImage) -> GrayImage {
    const K: [u32; 5] = [1, 4, 6, 4, 1];
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let src = gray.as_raw();

    let mut rows = vec![0u32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0;
            for (i, k) in K.iter().enumerate() {
                let sx = reflect101(x as isize + i as isize - 2, w);
                acc += k * u32::from(src[y * w + sx]);
            }
            rows[y * w + x] = acc;
        }
    }

    let mut out = GrayImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0;
            for (j, k) in K.iter().enumerate() {
                let sy = reflect101(y as isize + j as isize - 2, h);
                acc += k * rows[sy * w + x];
            }
            out.put_pixel(x as u32, y as u32, Luma([((acc + 128) >> 8).min(255) as u8]));
        }
    }
    out
}

const SMOOTH: [f64; 3] = [1.0, 2.0, 1.0];
const DERIV: [f64; 3] = [-1.0, 0.0, 1.0];

/// 3x3 Sobel derivative of order `dx` in x and `dy` in y (each 0 or 1).
#[must_use]
pub fn sobel(gray: &GrayImage, dx: u8, dy: u8) -> Plane {
    let kx = if dx == 1 { DERIV } else { SMOOTH };
    let ky = if dy == 1 { DERIV } else { SMOOTH };
    separable_3x3(&Plane::from_gray(gray), &kx, &ky)
}

fn separable_3x3(src: &Plane, kx: &[f64; 3], ky: &[f64; 3]) -> Plane {
    let (w, h) = (src.width, src.height);
    let mut rows = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, k) in kx.iter().enumerate() {
                acc += k * src.get(reflect101(x as isize + i as isize - 1, w), y);
            }
            rows.set(x, y, acc);
        }
    }

    let mut out = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (j, k) in ky.iter().enumerate() {
                acc += k * rows.get(x, reflect101(y as isize + j as isize - 1, h));
            }
            out.set(x, y, acc);
        }
    }
    out
}

/// Gradient magnitude sqrt(gx^2 + gy^2) from first-order Sobel responses.
#[must_use]
pub fn gradient_magnitude(gray: &GrayImage) -> Plane {
    let gx = sobel(gray, 1, 0);
    let gy = sobel(gray, 0, 1);
    gx.zip_map(&gy, |a, b| (a * a + b * b).sqrt())
}

/// 4-neighbour Laplacian (aperture 1).
#[must_use]
pub fn laplacian(gray: &GrayImage) -> Plane {
    let src = Plane::from_gray(gray);
    let (w, h) = (src.width, src.height);
    let mut out = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as isize, y as isize);
            let sum = src.get(reflect101(xi - 1, w), y)
                + src.get(reflect101(xi + 1, w), y)
                + src.get(x, reflect101(yi - 1, h))
                + src.get(x, reflect101(yi + 1, h));
            out.set(x, y, sum - 4.0 * src.get(x, y));
        }
    }
    out
}

/// Canny edge map (0 or 255) with L1 gradient magnitude, non-maximum
/// suppression and hysteresis between `low` and `high`.
#[must_use]
pub fn canny(gray: &GrayImage, low: f64, high: f64) -> GrayImage {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let gx = sobel(gray, 1, 0);
    let gy = sobel(gray, 0, 1);
    let mag = gx.zip_map(&gy, |a, b| a.abs() + b.abs());

    let at = |x: isize, y: isize| -> f64 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            mag.get(x as usize, y as usize)
        }
    };

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut state = vec![0u8; w * h];
    let tan22 = std::f64::consts::FRAC_PI_8.tan();
    let tan67 = (3.0 * std::f64::consts::FRAC_PI_8).tan();

    for y in 0..h {
        for x in 0..w {
            let m = mag.get(x, y);
            if m <= low {
                continue;
            }
            let (dx, dy) = (gx.get(x, y), gy.get(x, y));
            let (ax, ay) = (dx.abs(), dy.abs());
            let (xi, yi) = (x as isize, y as isize);

            let is_max = if ay < ax * tan22 {
                m > at(xi - 1, yi) && m >= at(xi + 1, yi)
            } else if ay > ax * tan67 {
                m > at(xi, yi - 1) && m >= at(xi, yi + 1)
            } else {
                let s: isize = if (dx < 0.0) != (dy < 0.0) { -1 } else { 1 };
                m > at(xi - s, yi - 1) && m > at(xi + s, yi + 1)
            };

            if is_max {
                state[y * w + x] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut stack: Vec<usize> = (0..w * h).filter(|&i| state[i] == 2).collect();
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if state[j] == 1 {
                    state[j] = 2;
                    stack.push(j);
                }
            }
        }
    }

    let mut edges = GrayImage::new(w as u32, h as u32);
    for (i, px) in edges.pixels_mut().enumerate() {
        if state[i] == 2 {
            *px = Luma([255]);
        }
    }
    edges
}

/// Fraction of non-zero pixels.
#[must_use]
pub fn nonzero_fraction(mask: &GrayImage) -> f64 {
    let total = mask.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    mask.as_raw().iter().filter(|&&v| v > 0).count() as f64 / total as f64
}

/// Otsu's threshold: the level maximizing between-class variance.
#[must_use]
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut hist = [0usize; 256];
    for &v in gray.as_raw() {
        hist[v as usize] += 1;
    }
    let total = gray.as_raw().len() as f64;
    if total == 0.0 {
        return 0;
    }

    let mu_total: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum::<f64>() / total;
    let (mut q1, mut mu1) = (0.0f64, 0.0f64);
    let (mut best, mut best_sigma) = (0u8, 0.0f64);

    for (i, &count) in hist.iter().enumerate() {
        let p = count as f64 / total;
        let q1_next = q1 + p;
        if q1_next > 0.0 {
            mu1 = (mu1 * q1 + i as f64 * p) / q1_next;
        }
        q1 = q1_next;

        let q2 = 1.0 - q1;
        if q1 < f64::EPSILON || q2 < f64::EPSILON {
            continue;
        }
        let mu2 = (mu_total - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > best_sigma {
            best_sigma = sigma;
            best = i as u8;
        }
    }
    best
}

/// Pixels strictly above `threshold` become 255, the rest 0.
#[must_use]
pub fn threshold_binary(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for px in out.pixels_mut() {
        px.0[0] = if px.0[0] > threshold { 255 } else { 0 };
    }
    out
}
