//! Hilbert ordering for bulk loading.
//!
//! Entries are sorted by the Hilbert value of their box centers, measured on
//! a grid laid over the extent of the whole dataset. Consecutive entries in
//! that order are spatially close, so packing them into leaves bottom-up gives
//! tight, mostly disjoint node boxes.

use crate::bounding_box::BoundingBox;
use crate::dataset::RowId;

/// Grid resolution used when sorting: `2^16` cells per axis.
pub const HILBERT_ORDER: u32 = 16;

const MAX_HILBERT_ORDER: u32 = 32;

/// Hilbert distance of a point already normalized to the unit square.
pub fn hilbert_index(x: f64, y: f64, order: u32) -> u64 {
    debug_assert!((0.0..=1.0).contains(&x), "x must be in [0,1]");
    debug_assert!((0.0..=1.0).contains(&y), "y must be in [0,1]");
    debug_assert!(order > 0 && order <= MAX_HILBERT_ORDER, "order must be 1-32");

    let n = 1u64 << order;
    let xi = ((x * (n as f64 - 0.5)) as u64).min(n - 1);
    let yi = ((y * (n as f64 - 0.5)) as u64).min(n - 1);
    xy2d(n, xi, yi)
}

/// Hilbert distance of `(x, y)` on a grid spanning `extent`.
///
/// Coordinates outside the extent are clamped to it. An axis with zero span
/// maps every coordinate to the middle of that axis.
pub fn hilbert_index_bounded(x: f64, y: f64, extent: &BoundingBox, order: u32) -> u64 {
    hilbert_index(
        normalize(x, extent.min_x, extent.width()),
        normalize(y, extent.min_y, extent.height()),
        order,
    )
}

fn normalize(value: f64, min: f64, span: f64) -> f64 {
    if span > 0.0 && span.is_finite() {
        ((value - min) / span).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Sorts entries along the Hilbert curve over their common extent.
///
/// Entries with the same Hilbert value keep row id order, so the result is
/// deterministic for a given input set regardless of its initial order.
pub fn sort_by_hilbert(entries: &mut [(RowId, BoundingBox)]) {
    let extent = entries.iter().fold(BoundingBox::empty(), |mut acc, (_, b)| {
        acc.expand(b);
        acc
    });

    entries.sort_by_cached_key(|(row_id, bbox)| {
        let (cx, cy) = bbox.center();
        (hilbert_index_bounded(cx, cy, &extent, HILBERT_ORDER), *row_id)
    });
}

fn xy2d(n: u64, mut x: u64, mut y: u64) -> u64 {
    let mut d = 0u64;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    d
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}
