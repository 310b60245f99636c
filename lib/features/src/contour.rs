//! Outer contours of binary images and polygon measurements.
//!
//! Foreground is 8-connected, background 4-connected. Only outermost
//! boundaries are reported: components sitting inside a hole of another
//! component are skipped. Boundaries are traced clockwise with Moore
//! neighbour tracing and compressed to the end points of straight runs.

use image::GrayImage;
use std::collections::VecDeque;

pub type Point = (i32, i32);

/// Clockwise on screen (y grows downwards), starting east.
const DIRS: [Point; 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

#[inline]
fn dir_index(delta: Point) -> Option<usize> {
    DIRS.iter().position(|&d| d == delta)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Enclosed polygon area (shoelace), always non-negative.
    #[must_use]
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Closed perimeter length.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        arc_length(&self.points, true)
    }

    /// Closed polygon approximation with tolerance `epsilon`.
    #[must_use]
    pub fn approximate(&self, epsilon: f64) -> Vec<Point> {
        approx_poly_dp(&self.points, epsilon, true)
    }
}

#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, &(x0, y0)) in points.iter().enumerate() {
        let (x1, y1) = points[(i + 1) % points.len()];
        twice += i64::from(x0) * i64::from(y1) - i64::from(x1) * i64::from(y0);
    }
    (twice as f64).abs() / 2.0
}

#[inline]
fn distance(a: Point, b: Point) -> f64 {
    let dx = f64::from(a.0 - b.0);
    let dy = f64::from(a.1 - b.1);
    (dx * dx + dy * dy).sqrt()
}

#[must_use]
pub fn arc_length(points: &[Point], closed: bool) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let open: f64 = points.windows(2).map(|w| distance(w[0], w[1])).sum();
    if closed {
        open + distance(points[points.len() - 1], points[0])
    } else {
        open
    }
}

/// Douglas-Peucker simplification. Closed curves are split at the point
/// farthest from the first one and each half is simplified separately.
#[must_use]
pub fn approx_poly_dp(points: &[Point], epsilon: f64, closed: bool) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    if !closed {
        let mut keep = vec![false; points.len()];
        keep[0] = true;
        keep[points.len() - 1] = true;
        douglas_peucker(points, 0, points.len() - 1, epsilon, &mut keep);
        return points
            .iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(*p))
            .collect();
    }

    let far = (1..points.len())
        .max_by(|&a, &b| {
            distance(points[0], points[a])
                .partial_cmp(&distance(points[0], points[b]))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.cmp(&a))
        })
        .unwrap_or(0);
    if far == 0 {
        return vec![points[0]];
    }

    // Walk 0..=far, then far..=len (wrapping back to point 0).
    let mut ring: Vec<Point> = points.to_vec();
    ring.push(points[0]);
    let mut keep = vec![false; ring.len()];
    keep[0] = true;
    keep[far] = true;
    douglas_peucker(&ring, 0, far, epsilon, &mut keep);
    douglas_peucker(&ring, far, ring.len() - 1, epsilon, &mut keep);

    ring[..ring.len() - 1]
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

fn douglas_peucker(points: &[Point], first: usize, last: usize, epsilon: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let (a, b) = (points[first], points[last]);
    let seg = distance(a, b);

    let mut max_dist = -1.0;
    let mut split = first;
    for (i, &p) in points.iter().enumerate().take(last).skip(first + 1) {
        let d = if seg == 0.0 {
            distance(a, p)
        } else {
            let cross = f64::from(b.0 - a.0) * f64::from(a.1 - p.1) - f64::from(a.0 - p.0) * f64::from(b.1 - a.1);
            cross.abs() / seg
        };
        if d > max_dist {
            max_dist = d;
            split = i;
        }
    }

    if max_dist > epsilon {
        keep[split] = true;
        douglas_peucker(points, first, split, epsilon, keep);
        douglas_peucker(points, split, last, epsilon, keep);
    }
}

/// Outermost contours of all non-zero regions, in raster order of their
/// top-left pixel.
#[must_use]
pub fn find_external_contours(binary: &GrayImage) -> Vec<Contour> {
    let (w, h) = (binary.width() as i32, binary.height() as i32);
    let raw = binary.as_raw();
    let idx = |x: i32, y: i32| (y * w + x) as usize;
    let inside = |x: i32, y: i32| x >= 0 && y >= 0 && x < w && y < h;
    let fg = |x: i32, y: i32| inside(x, y) && raw[idx(x, y)] != 0;

    // Background reachable from the frame.
    let mut outside = vec![false; raw.len()];
    let mut queue = VecDeque::new();
    for y in 0..h {
        for x in 0..w {
            let on_frame = x == 0 || y == 0 || x == w - 1 || y == h - 1;
            if on_frame && !fg(x, y) && !outside[idx(x, y)] {
                outside[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let (nx, ny) = (x + dx, y + dy);
            if inside(nx, ny) && !fg(nx, ny) && !outside[idx(nx, ny)] {
                outside[idx(nx, ny)] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    let mut labelled = vec![false; raw.len()];
    let mut contours = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if !fg(x, y) || labelled[idx(x, y)] {
                continue;
            }

            let mut external = false;
            labelled[idx(x, y)] = true;
            queue.push_back((x, y));
            while let Some((cx, cy)) = queue.pop_front() {
                for &(dx, dy) in &DIRS {
                    let (nx, ny) = (cx + dx, cy + dy);
                    let four = dx == 0 || dy == 0;
                    if !inside(nx, ny) {
                        external |= four;
                    } else if fg(nx, ny) {
                        if !labelled[idx(nx, ny)] {
                            labelled[idx(nx, ny)] = true;
                            queue.push_back((nx, ny));
                        }
                    } else if four && outside[idx(nx, ny)] {
                        external = true;
                    }
                }
            }

            if external {
                let traced = trace_boundary((x, y), &fg, (w as usize) * (h as usize) * 4 + 8);
                contours.push(Contour {
                    points: compress_runs(traced),
                });
            }
        }
    }
    contours
}

/// Moore neighbour tracing from the raster-first pixel of a component.
fn trace_boundary(start: Point, fg: &impl Fn(i32, i32) -> bool, max_steps: usize) -> Vec<Point> {
    let step = |cur: Point, back: usize| -> Option<(Point, usize)> {
        for k in 1..=8 {
            let d = (back + k) % 8;
            let next = (cur.0 + DIRS[d].0, cur.1 + DIRS[d].1);
            if fg(next.0, next.1) {
                let prev_d = (d + 7) % 8;
                let prev = (cur.0 + DIRS[prev_d].0, cur.1 + DIRS[prev_d].1);
                let new_back = dir_index((prev.0 - next.0, prev.1 - next.1)).unwrap_or((d + 4) % 8);
                return Some((next, new_back));
            }
        }
        None
    };

    let mut contour = vec![start];
    let Some(first) = step(start, 4) else {
        return contour;
    };

    let (mut cur, mut back) = first;
    for _ in 0..max_steps {
        let Some((next, next_back)) = step(cur, back) else {
            break;
        };
        if cur == start && next == first.0 {
            break;
        }
        contour.push(cur);
        cur = next;
        back = next_back;
    }
    contour
}

/// Drop points that continue a straight run in the same chain direction.
fn compress_runs(points: Vec<Point>) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    let delta = |a: Point, b: Point| (b.0 - a.0, b.1 - a.1);
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            delta(prev, points[i]) != delta(points[i], next)
        })
        .map(|i| points[i])
        .collect()
}
