//! Discrete Fourier transform for the frequency-domain descriptors.
//!
//! Power-of-two lengths use iterative radix-2; other lengths go through
//! Bluestein's chirp-z reduction to a power-of-two convolution.

use crate::imaging::Plane;
use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    #[inline]
    #[must_use]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    #[inline]
    #[must_use]
    pub fn from_polar(r: f64, theta: f64) -> Self {
        Self::new(r * theta.cos(), r * theta.sin())
    }

    #[inline]
    #[must_use]
    pub fn conj(self) -> Self {
        Self::new(self.re, -self.im)
    }

    #[inline]
    #[must_use]
    pub fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl Add for Complex {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

/// Forward transform, unnormalized.
pub fn fft(data: &mut [Complex]) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    if n.is_power_of_two() {
        radix2(data, false);
    } else {
        bluestein(data);
    }
}

fn radix2(data: &mut [Complex], inverse: bool) {
    let n = data.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            data.swap(i, j);
        }
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut len = 2;
    while len <= n {
        let w_len = Complex::from_polar(1.0, sign * 2.0 * PI / len as f64);
        for start in (0..n).step_by(len) {
            let mut w = Complex::new(1.0, 0.0);
            for k in 0..len / 2 {
                let u = data[start + k];
                let v = data[start + k + len / 2] * w;
                data[start + k] = u + v;
                data[start + k + len / 2] = u - v;
                w = w * w_len;
            }
        }
        len <<= 1;
    }

    if inverse {
        let scale = 1.0 / n as f64;
        for c in data.iter_mut() {
            *c = Complex::new(c.re * scale, c.im * scale);
        }
    }
}

fn bluestein(data: &mut [Complex]) {
    let n = data.len();
    let m = (2 * n - 1).next_power_of_two();

    // chirp[k] = exp(-i*pi*k^2/n); k^2 is reduced mod 2n to keep the angle small.
    let chirp: Vec<Complex> = (0..n)
        .map(|k| {
            let k2 = (k as u128 * k as u128 % (2 * n as u128)) as f64;
            Complex::from_polar(1.0, -PI * k2 / n as f64)
        })
        .collect();

    let mut a = vec![Complex::default(); m];
    for k in 0..n {
        a[k] = data[k] * chirp[k];
    }
    let mut b = vec![Complex::default(); m];
    b[0] = chirp[0].conj();
    for k in 1..n {
        b[k] = chirp[k].conj();
        b[m - k] = chirp[k].conj();
    }

    radix2(&mut a, false);
    radix2(&mut b, false);
    for (x, y) in a.iter_mut().zip(&b) {
        *x = *x * *y;
    }
    radix2(&mut a, true);

    for k in 0..n {
        data[k] = a[k] * chirp[k];
    }
}

/// Magnitude of the 2D transform of `plane`, with the zero frequency moved
/// to the center.
#[must_use]
pub fn shifted_magnitude(plane: &Plane) -> Plane {
    let (w, h) = (plane.width(), plane.height());
    let mut grid: Vec<Complex> = plane.data().iter().map(|&v| Complex::new(v, 0.0)).collect();

    for row in grid.chunks_mut(w.max(1)) {
        fft(row);
    }
    let mut column = vec![Complex::default(); h];
    for x in 0..w {
        for y in 0..h {
            column[y] = grid[y * w + x];
        }
        fft(&mut column);
        for y in 0..h {
            grid[y * w + x] = column[y];
        }
    }

    let mut out = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let sy = (y + h - h / 2) % h;
            let sx = (x + w - w / 2) % w;
            out.set(x, y, grid[sy * w + sx].abs());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dft(input: &[Complex]) -> Vec<Complex> {
        let n = input.len();
        (0..n)
            .map(|k| {
                input.iter().enumerate().fold(Complex::default(), |acc, (t, &x)| {
                    let angle = -2.0 * PI * (k * t) as f64 / n as f64;
                    acc + x * Complex::from_polar(1.0, angle)
                })
            })
            .collect()
    }

    fn assert_close(a: &[Complex], b: &[Complex]) {
        for (x, y) in a.iter().zip(b) {
            assert!((x.re - y.re).abs() < 1e-6, "{x:?} vs {y:?}");
            assert!((x.im - y.im).abs() < 1e-6, "{x:?} vs {y:?}");
        }
    }

    #[test]
    fn test_power_of_two_matches_dft() {
        let input: Vec<Complex> = (0..16).map(|i| Complex::new((i * 7 % 5) as f64, 0.0)).collect();
        let mut out = input.clone();
        fft(&mut out);
        assert_close(&out, &naive_dft(&input));
    }

    #[test]
    fn test_odd_length_matches_dft() {
        for n in [3usize, 5, 12, 27] {
            let input: Vec<Complex> = (0..n)
                .map(|i| Complex::new((i as f64 * 0.7).sin(), (i % 3) as f64))
                .collect();
            let mut out = input.clone();
            fft(&mut out);
            assert_close(&out, &naive_dft(&input));
        }
    }

    #[test]
    fn test_constant_plane_peaks_at_center() {
        let mut plane = Plane::new(6, 5);
        for y in 0..5 {
            for x in 0..6 {
                plane.set(x, y, 2.0);
            }
        }
        let mag = shifted_magnitude(&plane);
        assert!((mag.get(3, 2) - 60.0).abs() < 1e-6);
        let off_center: f64 = mag.data().iter().sum::<f64>() - mag.get(3, 2);
        assert!(off_center.abs() < 1e-6);
    }
}
