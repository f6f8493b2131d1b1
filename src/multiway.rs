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

//! Component 4.6: the multi-way equi-join driver. Matches `k` Tables on
//! their head column and walks the Cartesian product of matches, calling
//! back into the caller rather than building an output Table itself —
//! grounded on the teacher's `HashJoinExecutor::execute`/`build_side`
//! split, generalized from two inputs to `k` and from materializing a
//! `DataChunk` to invoking callbacks directly, the way `spec.md` §4.6
//! describes it.
//!
//! `spec.md`'s status bitmap (`{sorted-output, all-key, 1-1-join,
//! lead-index}`) is modeled as [`MultiJoinStatus`], a plain struct, rather
//! than literal bit flags — the same "collapse a C-style bitmask into a
//! typed value" redesign already applied to the property flags in
//! [`crate::table::SideProps`].

use std::sync::Arc;

use crate::concurrency::LockTracer;
use crate::error::Result;
use crate::hash_index::{HashIndex, Side};
use crate::storage;
use crate::table::Table;
use crate::types::ValueRef;

/// `{sorted-output, all-key, 1-1-join, lead-index}` (`spec.md` §4.6 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiJoinStatus {
    pub sorted_output: bool,
    pub all_key: bool,
    pub one_to_one: bool,
    pub lead_index: usize,
}

/// Per-column probe strategy chosen in step 3. `Lead` marks the driving
/// column itself, which is walked rather than probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Lead,
    /// Aligned row-for-row with the lead (same dense seqbase and count):
    /// the match position is the lead's own position, no search needed.
    Synced,
    /// Key and sorted: binary search, at most one match.
    KeySorted,
    /// Key but unsorted: hash lookup, at most one match.
    KeyHash,
    /// Sorted, not key: binary search to the first match, then scan the
    /// equal-value run (duplicates are contiguous once sorted).
    Sorted,
    /// Neither sorted nor key: walk the hash chain, building it if absent.
    Hash,
}

fn synced(a: &Table, b: &Table) -> bool {
    a.count() == b.count() && a.head_seqbase().is_some() && a.head_seqbase() == b.head_seqbase()
}

fn classify(tables: &[Table], lead: usize, j: usize) -> Strategy {
    if synced(&tables[j], &tables[lead]) {
        return Strategy::Synced;
    }
    let props = tables[j].head_props();
    if props.key {
        if props.sorted {
            Strategy::KeySorted
        } else {
            Strategy::KeyHash
        }
    } else if props.sorted {
        Strategy::Sorted
    } else {
        Strategy::Hash
    }
}

/// Ascending size selects the lead unless the caller pins one via
/// `order_by` — the source prioritizes the explicitly ordered column over
/// size-order, and this preserves that (`spec.md` §9, open question).
fn select_lead(tables: &[Table], order_by: Option<usize>) -> usize {
    if let Some(idx) = order_by {
        return idx;
    }
    (0..tables.len()).min_by_key(|&i| tables[i].count()).unwrap_or(0)
}

/// Groups the lead's rows by value for step 2's traversal. A sorted lead
/// is walked chunk-at-a-time (equal values are already contiguous); an
/// unsorted lead falls back to one-row-at-a-time groups. Step 2's
/// key-and-sorted / key-unsorted modes are both subsumed here: a key
/// column's groups are trivially size 1 whether or not it happens to be
/// sorted, so no separate case is needed.
fn lead_groups(lead_table: &Table) -> Vec<(ValueRef<'_>, Vec<usize>)> {
    let n = lead_table.count();
    let mut groups = Vec::new();
    if lead_table.head_props().sorted {
        let mut i = 0;
        while i < n {
            let v = lead_table.value_head(i);
            let mut j = i + 1;
            if !v.is_nil() {
                while j < n && lead_table.value_head(j).equals(&v) {
                    j += 1;
                }
            }
            if !v.is_nil() {
                groups.push((v, (i..j).collect()));
            }
            i = j;
        }
    } else {
        for i in 0..n {
            let v = lead_table.value_head(i);
            if !v.is_nil() {
                groups.push((v, vec![i]));
            }
        }
    }
    groups
}

/// Step 3: the match positions in `tables[j]` for lead value `v`, given the
/// lead's own positions in this group (used by the `Synced` strategy).
fn positions_for(
    tables: &[Table],
    indexes: &[Option<Arc<HashIndex>>],
    strategies: &[Strategy],
    j: usize,
    lead_positions: &[usize],
    v: ValueRef<'_>,
    out: &mut Vec<usize>,
) {
    out.clear();
    match strategies[j] {
        Strategy::Lead => unreachable!("the lead column is walked, not probed"),
        Strategy::Synced => {
            for &p in lead_positions {
                if p < tables[j].count() {
                    out.push(p);
                }
            }
        }
        Strategy::KeySorted => {
            let pos = storage::sorted_lower_bound(&tables[j], Side::Head, &v);
            if pos < tables[j].count() && tables[j].value_head(pos).equals(&v) {
                out.push(pos);
            }
        }
        Strategy::KeyHash => {
            if let Some(index) = &indexes[j] {
                if let Some(p) = index.lookup(&tables[j], v).next() {
                    out.push(p);
                }
            }
        }
        Strategy::Sorted => {
            let start = storage::sorted_lower_bound(&tables[j], Side::Head, &v);
            let mut p = start;
            while p < tables[j].count() && tables[j].value_head(p).equals(&v) {
                out.push(p);
                p += 1;
            }
        }
        Strategy::Hash => {
            if let Some(index) = &indexes[j] {
                out.extend(index.lookup(&tables[j], v));
            }
        }
    }
}

/// Recurses over the Cartesian product of `positions[depth..]`, calling
/// `per_value[depth]` on entry to each position and `per_tuple` once a
/// full combination has been chosen (`spec.md` §4.6 step 5).
fn recurse(
    positions: &[Vec<usize>],
    depth: usize,
    chosen: &mut Vec<usize>,
    per_value: &mut [&mut dyn FnMut(usize)],
    per_tuple: &mut dyn FnMut(&[usize]),
) {
    if depth == positions.len() {
        per_tuple(chosen);
        return;
    }
    for &pos in &positions[depth] {
        (per_value[depth])(pos);
        chosen.push(pos);
        recurse(positions, depth + 1, chosen, per_value, per_tuple);
        chosen.pop();
    }
}

/// `multi_join(tables[], per_value_cbs[], per_tuple_cb, order_by_index) ->
/// status_bits` (`spec.md` §4.6, §6). `tables` takes `&mut` only because
/// building a missing hash index needs it; every index is built once,
/// before any callback fires, matching `spec.md` §5's "hashes build-once
/// cache-forever".
pub fn multi_join(
    tables: &mut [Table],
    order_by: Option<usize>,
    tracer: &LockTracer,
    per_value: &mut [&mut dyn FnMut(usize)],
    per_tuple: &mut dyn FnMut(&[usize]),
) -> Result<MultiJoinStatus> {
    assert!(tables.len() >= 2, "multi_join requires at least two tables");
    assert_eq!(tables.len(), per_value.len(), "one per_value callback per table");

    let lead = select_lead(tables, order_by);

    let strategies: Vec<Strategy> = (0..tables.len())
        .map(|j| if j == lead { Strategy::Lead } else { classify(tables, lead, j) })
        .collect();

    let mut indexes: Vec<Option<Arc<HashIndex>>> = vec![None; tables.len()];
    for (j, strategy) in strategies.iter().enumerate() {
        if matches!(strategy, Strategy::Hash | Strategy::KeyHash) {
            indexes[j] = Some(tables[j].ensure_hash_index(Side::Head, tracer));
        }
    }

    // All remaining work only reads; reborrow shared so the lead's values
    // and every other column's probe can be held at once.
    let tables: &[Table] = tables;

    let all_key = tables.iter().all(|t| t.head_props().key);
    let one_to_one = (0..tables.len())
        .filter(|&j| j != lead)
        .all(|j| matches!(strategies[j], Strategy::Synced | Strategy::KeySorted | Strategy::KeyHash));
    let sorted_output = tables[lead].head_props().sorted;

    let groups = lead_groups(&tables[lead]);
    let mut positions: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
    let mut chosen = Vec::with_capacity(tables.len());

    'groups: for (v, lead_positions) in groups {
        for j in 0..tables.len() {
            if j == lead {
                continue;
            }
            positions_for(tables, &indexes, &strategies, j, &lead_positions, v, &mut positions[j]);
            if positions[j].is_empty() {
                // Short-circuit in the order columns were classified, which
                // is also the order the planner would prefer probing in
                // (cheapest/most selective strategies first).
                continue 'groups;
            }
        }
        positions[lead] = lead_positions;
        chosen.clear();
        recurse(&positions, 0, &mut chosen, per_value, per_tuple);
    }

    Ok(MultiJoinStatus {
        sorted_output,
        all_key,
        one_to_one,
        lead_index: lead,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use super::*;
    use crate::table::{Column, SideProps};

    fn sorted_key(values: Vec<i32>) -> Table {
        let n = values.len();
        let mut t = Table::new(Column::I32(StdArc::new(values)), Column::Void { seqbase: Some(0) }, n);
        t.set_head_props(SideProps {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: false,
            nonil: true,
        });
        t
    }

    fn unsorted_key(values: Vec<i32>) -> Table {
        let n = values.len();
        let mut t = Table::new(Column::I32(StdArc::new(values)), Column::Void { seqbase: Some(0) }, n);
        t.set_head_props(SideProps {
            sorted: false,
            rev_sorted: false,
            key: true,
            dense: false,
            nonil: true,
        });
        t
    }

    #[test]
    fn three_way_join_emits_expected_tuples() {
        let a = unsorted_key(vec![1, 2, 3]);
        let b = sorted_key(vec![2, 3, 4]);
        let c = sorted_key(vec![1, 2, 3]);
        let tracer = LockTracer::default();

        let mut tuples: Vec<Vec<usize>> = Vec::new();
        let mut cb_a = |_p: usize| {};
        let mut cb_b = |_p: usize| {};
        let mut cb_c = |_p: usize| {};
        let mut per_value: Vec<&mut dyn FnMut(usize)> = vec![&mut cb_a, &mut cb_b, &mut cb_c];
        let mut per_tuple = |row: &[usize]| tuples.push(row.to_vec());

        let mut tables = vec![a, b, c];
        let status = multi_join(&mut tables, None, &tracer, &mut per_value, &mut per_tuple).unwrap();

        // a (the smallest, hence the lead) ∩ b ∩ c on values 2 and 3;
        // value 1 misses b, value 4 (not in the lead) is never visited.
        assert_eq!(tuples.len(), 2);
        assert_eq!(status.lead_index, 0);
        assert!(status.all_key);
    }

    #[test]
    fn synced_column_reuses_lead_position_without_search() {
        let lead = Table::new(Column::Void { seqbase: Some(0) }, Column::I32(StdArc::new(vec![100, 200, 300])), 3)
            .with_props(SideProps::dense(), SideProps::unknown());
        let aligned = Table::new(Column::Void { seqbase: Some(0) }, Column::I32(StdArc::new(vec![1, 1, 1])), 3)
            .with_props(SideProps::dense(), SideProps::unknown());
        let tracer = LockTracer::default();

        let mut tuples: Vec<Vec<usize>> = Vec::new();
        let mut cb0 = |_p: usize| {};
        let mut cb1 = |_p: usize| {};
        let mut per_value: Vec<&mut dyn FnMut(usize)> = vec![&mut cb0, &mut cb1];
        let mut per_tuple = |row: &[usize]| tuples.push(row.to_vec());

        let mut tables = vec![lead, aligned];
        let status = multi_join(&mut tables, Some(0), &tracer, &mut per_value, &mut per_tuple).unwrap();
        assert_eq!(tuples.len(), 3);
        assert_eq!(status.lead_index, 0);
        assert!(status.one_to_one);
    }
}
