//! Visvalingam–Whyatt polyline simplification.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    area: f64,
    index: usize,
    prev: usize,
    next: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so the max-heap pops the smallest area, earliest index first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .area
            .total_cmp(&self.area)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    ((a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1)) / 2.0).abs()
}

/// Indices of the points kept after removing every vertex whose effective
/// triangle area is below `min_area`. Endpoints are always kept.
pub fn visvalingam_whyatt(points: &[(f64, f64)], min_area: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let mut prev: Vec<usize> = (0..n).map(|i| i.saturating_sub(1)).collect();
    let mut next: Vec<usize> = (0..n).map(|i| (i + 1).min(n - 1)).collect();
    let mut removed = vec![false; n];

    let candidate = |index: usize, prev: usize, next: usize| Candidate {
        area: triangle_area(points[prev], points[index], points[next]),
        index,
        prev,
        next,
    };

    let mut heap: BinaryHeap<Candidate> = (1..n - 1).map(|i| candidate(i, i - 1, i + 1)).collect();

    while let Some(c) = heap.pop() {
        if removed[c.index] || prev[c.index] != c.prev || next[c.index] != c.next {
            continue;
        }
        if c.area >= min_area {
            break;
        }

        removed[c.index] = true;
        next[c.prev] = c.next;
        prev[c.next] = c.prev;

        if c.prev > 0 {
            heap.push(candidate(c.prev, prev[c.prev], c.next));
        }
        if c.next < n - 1 {
            heap.push(candidate(c.next, c.prev, next[c.next]));
        }
    }

    (0..n).filter(|&i| !removed[i]).collect()
}
