// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric predicates on two-point segments
//!
//! All functions are pure. A segment is `[start, end]`; its "normal" is the
//! unit direction from start to end, not a perpendicular.

use nalgebra::{Point2, Vector2};

/// Two-point segment
pub type Line = [Point2<f64>; 2];

/// Lines closer than this angle (ignoring direction) count as parallel
pub const PARALLEL_ANGLE_DEGREES: f64 = 15.0;

const PARALLEL_EPSILON: f64 = 1e-5;
const DIRECTION_EPSILON: f64 = 1e-2;

/// Unit direction from `start` to `end`, `None` if the points coincide
pub fn normal(start: &Point2<f64>, end: &Point2<f64>) -> Option<Vector2<f64>> {
    (end - start).try_normalize(0.0)
}

pub fn length(start: &Point2<f64>, end: &Point2<f64>) -> f64 {
    nalgebra::distance(start, end)
}

/// Angle between two directions under 15 degrees, either orientation
pub fn is_parallel(n1: &Vector2<f64>, n2: &Vector2<f64>) -> bool {
    let f = n1.dot(n2).abs();
    let angle = f.min(1.0).acos().to_degrees();
    angle < PARALLEL_ANGLE_DEGREES || (f - 1.0).abs() < PARALLEL_EPSILON
}

/// Distance from `p` to the closest point of segment `a`–`b`
pub fn point_segment_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let length_sq = ab.norm_squared();

    if length_sq < 1e-20 {
        return nalgebra::distance(p, a);
    }

    let t = ((p - a).dot(&ab) / length_sq).clamp(0.0, 1.0);
    nalgebra::distance(p, &(a + ab * t))
}

/// Perpendicular projection of `p` onto the infinite line through `a` and `b`
pub fn perpendicular_foot(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    let ab = b - a;
    let length_sq = ab.norm_squared();

    if length_sq < 1e-20 {
        return *a;
    }

    let t = (p - a).dot(&ab) / length_sq;
    a + ab * t
}

/// Distances from each endpoint of `src` to segment `dest`
pub fn endpoint_distances(src: &Line, dest: &Line) -> (f64, f64) {
    (
        point_segment_distance(&src[0], &dest[0], &dest[1]),
        point_segment_distance(&src[1], &dest[0], &dest[1]),
    )
}

/// Cosines between `p - x1` and `x2 - x1`, and between `p - x2` and `x1 - x2`
///
/// `None` when `p` sits on either endpoint or the segment is degenerate.
fn endpoint_cosines(p: &Point2<f64>, x1: &Point2<f64>, x2: &Point2<f64>) -> Option<(f64, f64)> {
    let v1 = p - x1;
    let v2 = p - x2;

    if v1 == Vector2::zeros() || v2 == Vector2::zeros() {
        return None;
    }

    let v3 = (x2 - x1).try_normalize(0.0)?;
    let v4 = -v3;

    Some((v1.normalize().dot(&v3), v2.normalize().dot(&v4)))
}

/// True when the perpendicular foot of `p` falls strictly inside `x1`–`x2`
///
/// This is an alongside test, not a crossing test.
pub fn projects_inside(p: &Point2<f64>, x1: &Point2<f64>, x2: &Point2<f64>) -> bool {
    match endpoint_cosines(p, x1, x2) {
        Some((f1, f2)) => f1 > DIRECTION_EPSILON && f2 > DIRECTION_EPSILON,
        None => false,
    }
}

/// True when `p` lies (almost) square to either end of `x1`–`x2`
pub fn projects_on_boundary(p: &Point2<f64>, x1: &Point2<f64>, x2: &Point2<f64>) -> bool {
    match endpoint_cosines(p, x1, x2) {
        Some((f1, f2)) => f1.abs() < DIRECTION_EPSILON || f2.abs() < DIRECTION_EPSILON,
        None => false,
    }
}

/// Whether `l1` runs alongside `l2`
///
/// Either endpoint of `l1` must project inside `l2`, or both endpoints must
/// sit square to its ends (equal-length side-by-side segments).
pub fn segments_run_alongside(l1: &Line, l2: &Line) -> bool {
    let [x1, x2] = l2;
    if projects_inside(&l1[0], x1, x2) || projects_inside(&l1[1], x1, x2) {
        return true;
    }
    projects_on_boundary(&l1[0], x1, x2) && projects_on_boundary(&l1[1], x1, x2)
}
