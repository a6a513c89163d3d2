//! Dynamic time warping between two single-channel series.
//!
//! Two forms are provided: the exact O(n·m) dynamic program and FastDTW, which
//! solves a coarsened problem first and refines only around the projected
//! warp path. Both return the cumulative pointwise cost of the best monotonic
//! alignment from `(0, 0)` to `(n - 1, m - 1)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pointwise distance between two samples.
pub type PointDistance = fn(f64, f64) -> f64;

/// Absolute difference, the default pointwise distance.
pub fn abs_diff(a: f64, b: f64) -> f64 {
    (a - b).abs()
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AlignError {
    #[error("cannot align an empty series")]
    EmptySeries,
    #[error("alignment cost is not finite ({0})")]
    NonFinite(f64),
}

/// Which alignment algorithm to run per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Alignment {
    Exact,
    Fast { radius: usize },
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::Fast { radius: 1 }
    }
}

impl Alignment {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> Result<f64, AlignError> {
        self.distance_with(a, b, abs_diff)
    }

    pub fn distance_with(
        &self,
        a: &[f64],
        b: &[f64],
        dist: PointDistance,
    ) -> Result<f64, AlignError> {
        match *self {
            Alignment::Exact => dtw(a, b, dist),
            Alignment::Fast { radius } => fast_dtw(a, b, radius, dist),
        }
    }
}

/// Exact DTW cost.
///
/// `cost[i][j] = dist(a[i], b[j]) + min(cost[i][j-1], cost[i-1][j], cost[i-1][j-1])`
/// with the first row and column seeded by their cumulative prefix cost. Only
/// two rows of the matrix are kept alive.
pub fn dtw(a: &[f64], b: &[f64], dist: PointDistance) -> Result<f64, AlignError> {
    if a.is_empty() || b.is_empty() {
        return Err(AlignError::EmptySeries);
    }
    let m = b.len();
    let mut prev = vec![0.0; m];
    let mut curr = vec![0.0; m];

    prev[0] = dist(a[0], b[0]);
    for j in 1..m {
        prev[j] = prev[j - 1] + dist(a[0], b[j]);
    }
    for &ai in &a[1..] {
        curr[0] = prev[0] + dist(ai, b[0]);
        for j in 1..m {
            let best = curr[j - 1].min(prev[j]).min(prev[j - 1]);
            curr[j] = best + dist(ai, b[j]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    finite(prev[m - 1])
}

/// FastDTW approximation with the given search radius around the projected path.
pub fn fast_dtw(
    a: &[f64],
    b: &[f64],
    radius: usize,
    dist: PointDistance,
) -> Result<f64, AlignError> {
    if a.is_empty() || b.is_empty() {
        return Err(AlignError::EmptySeries);
    }
    let (cost, _) = fast_dtw_path(a, b, radius, dist);
    finite(cost)
}

fn finite(cost: f64) -> Result<f64, AlignError> {
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(AlignError::NonFinite(cost))
    }
}

type Path = Vec<(usize, usize)>;

fn fast_dtw_path(a: &[f64], b: &[f64], radius: usize, dist: PointDistance) -> (f64, Path) {
    if needs_full_window(a.len(), b.len(), radius) {
        let window = SearchWindow::full(a.len(), b.len());
        return windowed_dtw(a, b, &window, dist);
    }
    let a_coarse = halve(a);
    let b_coarse = halve(b);
    let (_, coarse_path) = fast_dtw_path(&a_coarse, &b_coarse, radius, dist);
    let window = SearchWindow::project(&coarse_path, a.len(), b.len(), radius);
    windowed_dtw(a, b, &window, dist)
}

/// Series shorter than `radius + 2` are aligned without coarsening.
fn needs_full_window(n: usize, m: usize, radius: usize) -> bool {
    let min_size = radius + 2;
    n < min_size || m < min_size
}

/// Average adjacent pairs; a trailing odd sample is dropped.
fn halve(x: &[f64]) -> Vec<f64> {
    x.chunks_exact(2).map(|pair| (pair[0] + pair[1]) / 2.0).collect()
}

/// Allowed column range `[lo, hi)` for every row of the cost matrix.
#[derive(Debug, Clone)]
struct SearchWindow {
    rows: Vec<(usize, usize)>,
}

impl SearchWindow {
    fn full(n: usize, m: usize) -> Self {
        Self {
            rows: vec![(0, m); n],
        }
    }

    /// Widen the coarse path by `radius` cells and map each coarse cell onto
    /// its 2x2 block at the finer resolution.
    fn project(coarse_path: &[(usize, usize)], n: usize, m: usize, radius: usize) -> Self {
        let mut rows = vec![(usize::MAX, 0usize); n];
        for &(ci, cj) in coarse_path {
            let i_lo = ci.saturating_sub(radius);
            let j_lo = cj.saturating_sub(radius);
            let col_lo = 2 * j_lo;
            let col_hi = (2 * (cj + radius) + 2).min(m);
            for coarse_row in i_lo..=ci + radius {
                for row in [2 * coarse_row, 2 * coarse_row + 1] {
                    if row >= n || col_lo >= col_hi {
                        continue;
                    }
                    let entry = &mut rows[row];
                    entry.0 = entry.0.min(col_lo);
                    entry.1 = entry.1.max(col_hi);
                }
            }
        }
        // Rows the projection missed (odd trailing samples) inherit their neighbour.
        let mut last = (0, m.min(1));
        for entry in rows.iter_mut() {
            if entry.0 == usize::MAX {
                *entry = last;
            }
            last = *entry;
        }
        if let Some(first) = rows.first_mut() {
            first.0 = 0;
        }
        if let Some(end) = rows.last_mut() {
            end.1 = m;
        }
        Self { rows }
    }

    fn contains(&self, i: usize, j: usize) -> bool {
        self.rows
            .get(i)
            .map(|&(lo, hi)| j >= lo && j < hi)
            .unwrap_or(false)
    }
}

fn windowed_dtw(a: &[f64], b: &[f64], window: &SearchWindow, dist: PointDistance) -> (f64, Path) {
    let n = a.len();
    let m = b.len();
    let mut cost: Vec<Vec<f64>> = Vec::with_capacity(n);

    let at = |cost: &Vec<Vec<f64>>, i: usize, j: usize| -> f64 {
        if !window.contains(i, j) {
            return f64::INFINITY;
        }
        cost[i][j - window.rows[i].0]
    };

    for i in 0..n {
        let (lo, hi) = window.rows[i];
        let mut row = Vec::with_capacity(hi.saturating_sub(lo));
        for j in lo..hi {
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                let up = if i > 0 { at(&cost, i - 1, j) } else { f64::INFINITY };
                let left = if j > lo { row[j - 1 - lo] } else { f64::INFINITY };
                let diag = if i > 0 && j > 0 {
                    at(&cost, i - 1, j - 1)
                } else {
                    f64::INFINITY
                };
                up.min(left).min(diag)
            };
            row.push(best + dist(a[i], b[j]));
        }
        cost.push(row);
    }

    let total = at(&cost, n - 1, m - 1);
    let mut path = vec![(n - 1, m - 1)];
    let (mut i, mut j) = (n - 1, m - 1);
    while i > 0 || j > 0 {
        let up = if i > 0 { at(&cost, i - 1, j) } else { f64::INFINITY };
        let left = if j > 0 { at(&cost, i, j - 1) } else { f64::INFINITY };
        let diag = if i > 0 && j > 0 {
            at(&cost, i - 1, j - 1)
        } else {
            f64::INFINITY
        };
        if diag <= up && diag <= left && i > 0 && j > 0 {
            i -= 1;
            j -= 1;
        } else if i > 0 && (j == 0 || up <= left) {
            i -= 1;
        } else {
            j -= 1;
        }
        path.push((i, j));
    }
    path.reverse();
    (total, path)
}
