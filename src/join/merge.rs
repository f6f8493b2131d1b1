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

//! Component 4.4.1: merge-join. Requires the right head sorted; probes with
//! an opportunistic scan bounded to a binary-search-equivalent budget when
//! both sides are sorted, else falls straight to binary search (`spec.md`
//! §4.4.1, §4.4.9).

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::JoinConfig;
use crate::error::{JoinError, Result};
use crate::property::{derive_equi_join, EquiJoinPropertyInputs};
use crate::table::Table;
use crate::types::ValueRef;

use super::{emit_cartesian, new_output_builders};

enum ChunkEvent {
    Match {
        l_start: usize,
        l_end: usize,
        r_start: usize,
        r_end: usize,
    },
    Miss {
        l_start: usize,
        l_end: usize,
    },
}

/// Plain equi-join via merge-join.
pub fn merge_join(left: &Table, right: &Table, hint: Option<usize>, config: &JoinConfig) -> Result<Table> {
    merge_join_impl(left, right, hint, config, false)
}

/// The outer-join variant: a left chunk with no right match is paired with
/// one nil-tail tuple per left row instead of being dropped (`spec.md`
/// §4.4.1 step 4, §4.4.5).
pub fn merge_join_outer(left: &Table, right: &Table, hint: Option<usize>, config: &JoinConfig) -> Result<Table> {
    merge_join_impl(left, right, hint, config, true)
}

/// Counting-only variant, for the estimator's `probe` closure (`spec.md`
/// §4.3 step 4) — never materializes an output table.
pub fn count_matches(left: &Table, right: &Table, config: &JoinConfig) -> Result<usize> {
    let mut total = 0usize;
    for_each_chunk(left, right, config, |event| {
        if let ChunkEvent::Match { l_start, l_end, r_start, r_end } = event {
            total += (l_end - l_start) * (r_end - r_start);
        }
    })?;
    Ok(total)
}

/// The `limit` budget variant (`spec.md` §4.4.1, "Budget variant"): stops
/// once the output has grown to `capacity_fraction` of its allocated
/// capacity, reporting how many left rows were consumed.
pub fn merge_join_limited(
    left: &Table,
    right: &Table,
    hint: Option<usize>,
    config: &JoinConfig,
    capacity_fraction: f64,
) -> Result<(Table, usize)> {
    if !right.head_props().sorted {
        return Err(JoinError::NotSorted { op: "merge_join" });
    }
    let cap_hint = hint.unwrap_or_else(|| left.count().max(1));
    let (mut head_b, mut tail_b) = new_output_builders(left, right, cap_hint)?;

    let both_sorted = left.tail_props().sorted && right.head_props().sorted;
    let r_count = right.count();
    let w = config.scan_budget_multiplier * ceil_log2(r_count);
    let l_count = left.count();
    let mut r_cursor = 0usize;
    let mut l_start = 0usize;
    let mut consumed = 0usize;
    let mut err = None;

    'outer: while l_start < l_count {
        let budget_cap = (head_b.capacity() as f64 * capacity_fraction) as usize;
        if head_b.len() >= budget_cap && head_b.capacity() > 0 {
            break 'outer;
        }

        let v = left.value_tail(l_start);
        let mut l_end = l_start + 1;
        while l_end < l_count && left.value_tail(l_end).equals(&v) {
            l_end += 1;
        }

        if !v.is_nil() {
            let found = if both_sorted {
                opportunistic_scan(right, &mut r_cursor, &v, w)
            } else {
                binary_search_equal(right, &v)
            };
            if let Some(r_pos) = found {
                let (r_start, r_end) = equal_range_on_right(right, r_pos, &v);
                if let Err(e) = emit_cartesian(left, right, l_start, l_end, r_start, r_end, &mut head_b, &mut tail_b) {
                    err = Some(e);
                    break 'outer;
                }
                if both_sorted {
                    r_cursor = r_end;
                }
            }
        }

        consumed = l_end;
        l_start = l_end;
    }

    if let Some(e) = err {
        return Err(e);
    }
    let count = head_b.len();
    Ok((Table::new(head_b.finish(), tail_b.finish(), count), consumed))
}

fn merge_join_impl(left: &Table, right: &Table, hint: Option<usize>, config: &JoinConfig, outer: bool) -> Result<Table> {
    let cap_hint = hint.unwrap_or_else(|| left.count().max(1));
    let (mut head_b, mut tail_b) = new_output_builders(left, right, cap_hint)?;

    let mut one_to_one_from_left = true;
    let mut right_hits: HashMap<usize, usize> = HashMap::new();
    let mut err: Option<JoinError> = None;

    for_each_chunk(left, right, config, |event| {
        if err.is_some() {
            return;
        }
        match event {
            ChunkEvent::Match { l_start, l_end, r_start, r_end } => {
                if (r_end - r_start) != 1 {
                    one_to_one_from_left = false;
                }
                *right_hits.entry(r_start).or_insert(0) += l_end - l_start;
                if let Err(e) = emit_cartesian(left, right, l_start, l_end, r_start, r_end, &mut head_b, &mut tail_b) {
                    err = Some(e);
                }
            }
            ChunkEvent::Miss { l_start, l_end } => {
                if outer {
                    let n = l_end - l_start;
                    if let Err(e) = head_b.reserve(n).and_then(|_| tail_b.reserve(n)) {
                        err = Some(e);
                        return;
                    }
                    for l in l_start..l_end {
                        head_b.push_value(left.value_head(l));
                        tail_b.push_nil();
                    }
                } else {
                    one_to_one_from_left = false;
                }
            }
        }
    })?;

    if let Some(e) = err {
        return Err(e);
    }

    let one_to_one_from_right = right_hits.values().all(|&n| n == 1);
    let inputs = EquiJoinPropertyInputs {
        left_head: left.head_props(),
        left_tail: left.tail_props(),
        right_head: right.head_props(),
        right_tail: right.tail_props(),
        one_to_one_from_left,
        one_to_one_from_right,
        injects_nils_on_miss: outer,
    };
    let (head_props, tail_props) = derive_equi_join(&inputs);

    let count = head_b.len();
    Ok(Table::new(head_b.finish(), tail_b.finish(), count).with_props(head_props, tail_props))
}

fn for_each_chunk(left: &Table, right: &Table, config: &JoinConfig, mut on_event: impl FnMut(ChunkEvent)) -> Result<()> {
    if !right.head_props().sorted {
        return Err(JoinError::NotSorted { op: "merge_join" });
    }

    let both_sorted = left.tail_props().sorted && right.head_props().sorted;
    let r_count = right.count();
    let w = config.scan_budget_multiplier * ceil_log2(r_count);
    let l_count = left.count();
    let mut r_cursor = 0usize;
    let mut l_start = 0usize;

    while l_start < l_count {
        let v = left.value_tail(l_start);
        let mut l_end = l_start + 1;
        while l_end < l_count && left.value_tail(l_end).equals(&v) {
            l_end += 1;
        }

        if v.is_nil() {
            on_event(ChunkEvent::Miss { l_start, l_end });
            l_start = l_end;
            continue;
        }

        let found = if both_sorted {
            opportunistic_scan(right, &mut r_cursor, &v, w)
        } else {
            binary_search_equal(right, &v)
        };

        match found {
            Some(r_pos) => {
                let (r_start, r_end) = equal_range_on_right(right, r_pos, &v);
                on_event(ChunkEvent::Match { l_start, l_end, r_start, r_end });
                if both_sorted {
                    r_cursor = r_end;
                }
            }
            None => on_event(ChunkEvent::Miss { l_start, l_end }),
        }

        l_start = l_end;
    }
    Ok(())
}

fn equal_range_on_right(right: &Table, r_pos: usize, v: &ValueRef<'_>) -> (usize, usize) {
    let r_count = right.count();
    let mut r_start = r_pos;
    while r_start > 0 && right.value_head(r_start - 1).equals(v) {
        r_start -= 1;
    }
    let mut r_end = r_pos + 1;
    while r_end < r_count && right.value_head(r_end).equals(v) {
        r_end += 1;
    }
    (r_start, r_end)
}

/// Advances `r_cursor` by up to `budget` comparisons looking for `v`; falls
/// back to a binary search over the remainder once the budget is spent
/// (`spec.md` §4.4.1 step 2, §4.4.9 `Probing`/`BinarySearching` states).
fn opportunistic_scan(right: &Table, r_cursor: &mut usize, v: &ValueRef<'_>, budget: usize) -> Option<usize> {
    let r_count = right.count();
    let mut pos = *r_cursor;
    let mut steps = 0;
    while pos < r_count && steps < budget {
        match right.value_head(pos).compare(v) {
            Ordering::Less => {
                pos += 1;
                steps += 1;
            }
            Ordering::Equal => {
                *r_cursor = pos;
                return Some(pos);
            }
            Ordering::Greater => {
                *r_cursor = pos;
                return None;
            }
        }
    }
    *r_cursor = pos;
    binary_search_equal_from(right, v, pos)
}

fn lower_bound(right: &Table, v: &ValueRef<'_>, lo: usize, hi: usize) -> usize {
    let mut lo = lo;
    let mut hi = hi;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if right.value_head(mid).compare(v) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn binary_search_equal_from(right: &Table, v: &ValueRef<'_>, lo: usize) -> Option<usize> {
    let pos = lower_bound(right, v, lo, right.count());
    if pos < right.count() && right.value_head(pos).equals(v) {
        Some(pos)
    } else {
        None
    }
}

/// Shared with [`super::semi`]'s binary-search strategy (`spec.md` §4.5,
/// semi-join candidate 6).
pub(crate) fn binary_search_equal(right: &Table, v: &ValueRef<'_>) -> Option<usize> {
    binary_search_equal_from(right, v, 0)
}

fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::heap::{AtomHeapBuilder, StrColumn};
    use crate::table::{Column, SideProps};

    fn dense_sorted(values: Vec<i32>) -> Table {
        let n = values.len();
        let head = Column::Void { seqbase: Some(0) };
        let tail = Column::I32(Arc::new(values));
        Table::new(head, tail, n).with_props(SideProps::dense(), SideProps::unknown())
    }

    fn str_table(heads: Vec<i32>, tails: Vec<&str>) -> Table {
        let n = heads.len();
        let mut builder = AtomHeapBuilder::new();
        let offsets: Vec<_> = tails.iter().map(|s| builder.push(s.as_bytes())).collect();
        let tail = StrColumn {
            heap: builder.finish(),
            offsets,
        };
        let head = Column::I32(Arc::new(heads));
        Table::new(head, Column::Str(Arc::new(tail)), n).with_props(
            SideProps {
                sorted: true,
                rev_sorted: false,
                key: true,
                dense: false,
                nonil: true,
            },
            SideProps::unknown(),
        )
    }

    /// `spec.md` §8 scenario 1.
    #[test]
    fn merge_join_sorted_dense_scenario() {
        let left = dense_sorted(vec![10, 20, 30]);
        let right = str_table(vec![1, 2, 3], vec!["a", "b", "c"]);
        let config = JoinConfig::default();

        let out = merge_join(&left, &right, None, &config).unwrap();
        assert_eq!(out.count(), 2);
        assert_eq!(out.value_head(0), ValueRef::Oid(10));
        assert_eq!(out.value_tail(0), ValueRef::Str(b"a"));
        assert_eq!(out.value_head(1), ValueRef::Oid(20));
        assert_eq!(out.value_tail(1), ValueRef::Str(b"b"));
    }

    #[test]
    fn outer_join_pairs_misses_with_nil() {
        let left = dense_sorted(vec![1, 9]);
        let right = str_table(vec![1], vec!["a"]);
        let config = JoinConfig::default();

        let out = merge_join_outer(&left, &right, None, &config).unwrap();
        assert_eq!(out.count(), 2);
        assert_eq!(out.value_tail(0), ValueRef::Str(b"a"));
        assert!(out.value_tail(1).is_nil());
        assert!(!out.tail_props().nonil);
    }

    #[test]
    fn rejects_unsorted_right_head() {
        let left = dense_sorted(vec![1, 2]);
        let mut right = str_table(vec![2, 1], vec!["a", "b"]);
        right.set_head_props(SideProps::unknown());
        let config = JoinConfig::default();
        let err = merge_join(&left, &right, None, &config).unwrap_err();
        assert!(matches!(err, JoinError::NotSorted { .. }));
    }
}
