// Copyright 2024 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Component 4.3: the join-size estimator. Predicts result cardinality by
//! logarithmic slice sampling with outlier detection, falling back to a
//! real random sample when the slices disagree too much (`spec.md` §4.3).
//!
//! The mutual recursion with the join algorithms noted in `spec.md` §9 is
//! modeled as a `probe` closure: the planner passes in the counting-only
//! variant of whichever physical join it is about to run, so recursion
//! never goes deeper than `estimator -> join -> (trusted hint, no further
//! estimation)`.

use std::collections::HashSet;

use rand::Rng;

use crate::builder::{materialize_tag, ColumnBuilder};
use crate::config::JoinConfig;
use crate::error::{JoinError, Result};
use crate::table::Table;

/// Caps imposed on the upper-bound rules of `spec.md` §4.3 step 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquiJoinBounds {
    pub left_tail_key: bool,
    pub right_head_key: bool,
}

impl EquiJoinBounds {
    fn upper_bound(&self, left_count: usize, right_count: usize) -> Option<usize> {
        match (self.left_tail_key, self.right_head_key) {
            (true, true) => Some(left_count.min(right_count)),
            (true, false) => Some(right_count),
            (false, true) => Some(left_count),
            (false, false) => None,
        }
    }
}

/// `estimate(left, right, predicate, hint) -> size` (`spec.md` §4.3).
///
/// `probe` must run the *same* join algorithm the planner has chosen,
/// restricted to counting matches, over an arbitrary left slice against the
/// full right table.
pub fn estimate<R: Rng + ?Sized>(
    left: &Table,
    right: &Table,
    bounds: EquiJoinBounds,
    hint: Option<usize>,
    config: &JoinConfig,
    probe: impl Fn(&Table, &Table) -> usize,
    rng: &mut R,
) -> Result<usize> {
    // Step 1: an explicit hint is trusted outright.
    if let Some(hint) = hint {
        return Ok(hint);
    }

    let l = left.count();
    let r = right.count();
    let upper = bounds.upper_bound(l, r);

    let threshold = config.small_input_threshold();

    // Step 2: tight equi-join upper bounds short-circuit sampling entirely
    // when they are already at or below the small-input scale.
    if let Some(bound) = upper {
        if bound <= threshold {
            return Ok(bound);
        }
    }

    // Step 3: small-input heuristic.
    let min_lr = l.min(r);
    if 3 * min_lr <= (1usize << config.small_input_log2) {
        let estimate = 3 * min_lr;
        return Ok(cap(estimate, upper));
    }

    // Step 4: logarithmic sampling over equi-spaced slices of the larger
    // side's driving input (left).
    let slice_width = config.sample_slice_width;
    let log2_l = (usize::BITS - l.leading_zeros() - 1) as u32;
    let k = log2_l.saturating_sub(config.small_input_log2).max(1) as usize;

    let mut slice_counts = Vec::with_capacity(k);
    let step = if k == 0 { 0 } else { l / k };
    for i in 0..k {
        let lo = (i * step).min(l);
        let hi = (lo + slice_width).min(l);
        if lo >= hi {
            slice_counts.push(0);
            continue;
        }
        let slice = left.slice(lo, hi);
        slice_counts.push(probe(&slice, right));
    }

    let sampled_rows = k * slice_width;
    let sum: usize = slice_counts.iter().sum();
    let mean = sum as f64 / k as f64;

    // Step 5: outlier detection.
    let has_outlier = slice_counts
        .iter()
        .any(|&c| (c as f64 - mean).abs() > (slice_width as f64).max(mean));

    let (t_s, n_sampled) = if has_outlier {
        let max_sample = (l / 100).min((1usize << config.small_input_log2) / 3);
        if max_sample == 0 {
            return Err(JoinError::OutOfMemory {
                what: "estimator fallback sample",
                requested: 0,
            });
        }
        let sample_size = max_sample.min(l);
        let sample = random_sample_table(left, sample_size, rng)?;
        (probe(&sample, right), sample_size)
    } else {
        (sum, sampled_rows)
    };

    if n_sampled == 0 {
        return Err(JoinError::OutOfMemory {
            what: "estimator sample",
            requested: 0,
        });
    }

    // Step 6: scale up with the deliberate 5% overestimate.
    let scaled = (t_s as f64 * l as f64 / (0.95 * n_sampled as f64)).ceil();
    let scaled = scaled.max(0.0) as usize;
    Ok(cap(scaled, upper))
}

fn cap(value: usize, upper: Option<usize>) -> usize {
    match upper {
        Some(bound) => value.min(bound),
        None => value,
    }
}

/// `random_sample(t, n) -> Table` (`spec.md` §6): an in-memory random
/// sample without replacement, used only by the estimator's outlier
/// fallback — reached precisely when the logarithmic slices disagreed
/// enough to suspect clustering, so the sample itself must be scattered
/// across `table` rather than one contiguous window (a window is exactly
/// the shape most likely to land entirely inside or outside a cluster).
fn random_sample_table<R: Rng + ?Sized>(table: &Table, n: usize, rng: &mut R) -> Result<Table> {
    let count = table.count();
    if n > count {
        return Err(JoinError::OutOfMemory {
            what: "random_sample",
            requested: n,
        });
    }

    let positions = sample_distinct_positions(count, n, rng);
    let mut head_b = ColumnBuilder::with_capacity(materialize_tag(table.head_type()), n)?;
    let mut tail_b = ColumnBuilder::with_capacity(materialize_tag(table.tail_type()), n)?;
    for pos in positions {
        head_b.push_value(table.value_head(pos));
        tail_b.push_value(table.value_tail(pos));
    }
    Ok(Table::new(head_b.finish(), tail_b.finish(), n))
}

/// `n` distinct positions drawn uniformly from `0..count` via rejection
/// sampling. Efficient as long as `n` stays well below `count`, which holds
/// here: the caller already caps `n` by `count / 100`.
fn sample_distinct_positions<R: Rng + ?Sized>(count: usize, n: usize, rng: &mut R) -> Vec<usize> {
    let mut seen = HashSet::with_capacity(n);
    let mut positions = Vec::with_capacity(n);
    while positions.len() < n {
        let candidate = rng.gen_range(0..count);
        if seen.insert(candidate) {
            positions.push(candidate);
        }
    }
    positions
}
