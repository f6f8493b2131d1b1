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

//! Component 4.4.6: semi-join. The planner picks among six candidate
//! strategies (`spec.md` §4.5); this module implements the three that are
//! not trivial copies or range-selects: positional fetch-semi, merge/binary
//! semi over a sorted right, and hash-intersection semi. `BATkintersect`
//! (`spec.md` §4.4.6) is named there as an external set-ops primitive; here
//! it is just the hash-lookup-and-keep loop, same as the teacher's
//! `hash_join.rs` probe with the output narrowed to the build side's own
//! columns instead of a join of two distinct shapes.

use crate::concurrency::LockTracer;
use crate::error::Result;
use crate::hash_index::Side;
use crate::table::Table;

use super::merge::binary_search_equal;

/// Builds the semi-join output: a filtered copy of `left`'s rows,
/// preserving relative order (so any sortedness/key flag that held on the
/// whole side still holds on the kept subset).
fn filter_left_rows(left: &Table, keep: impl Fn(usize) -> bool) -> Result<Table> {
    use crate::builder::{materialize_tag, ColumnBuilder};
    let mut head_b = ColumnBuilder::with_capacity(materialize_tag(left.head_type()), left.count())?;
    let mut tail_b = ColumnBuilder::with_capacity(materialize_tag(left.tail_type()), left.count())?;
    for l in 0..left.count() {
        if keep(l) {
            head_b.push_value(left.value_head(l));
            tail_b.push_value(left.value_tail(l));
        }
    }
    let count = head_b.len();
    let mut out = Table::new(head_b.finish(), tail_b.finish(), count);
    out.set_head_props(left.head_props());
    out.set_tail_props(left.tail_props());
    Ok(out)
}

/// Positional fetch-semi: `right`'s head is a dense identity column; `left`
/// keeps a row iff its tail oid falls within `right`'s range.
pub fn semi_join_fetch(left: &Table, right: &Table) -> Result<Table> {
    let right_seqbase = right
        .head_seqbase()
        .ok_or(crate::error::JoinError::WrongShape { op: "semi_join_fetch" })?;
    let r_count = right.count();
    filter_left_rows(left, |l| match left.value_tail(l) {
        crate::types::ValueRef::Oid(oid) => (oid.wrapping_sub(right_seqbase) as usize) < r_count,
        _ => false,
    })
}

/// Merge/binary semi: `right`'s head must be sorted; keep a left row iff
/// its tail value is found in `right`'s head.
pub fn semi_join_merge(left: &Table, right: &Table) -> Result<Table> {
    if !right.head_props().sorted {
        return Err(crate::error::JoinError::NotSorted { op: "semi_join_merge" });
    }
    filter_left_rows(left, |l| {
        let v = left.value_tail(l);
        !v.is_nil() && binary_search_equal(right, &v).is_some()
    })
}

/// Hash-intersection semi: build (or reuse) a hash index on `right`'s head
/// and keep a left row iff at least one match exists.
pub fn semi_join_hash(left: &Table, right: &mut Table, tracer: &LockTracer) -> Result<Table> {
    let index = right.ensure_hash_index(Side::Head, tracer);
    filter_left_rows(left, |l| {
        let v = left.value_tail(l);
        !v.is_nil() && index.lookup(right, v).next().is_some()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::table::{Column, SideProps};
    use crate::types::ValueRef;

    fn dense_sorted(values: Vec<i32>) -> Table {
        let n = values.len();
        Table::new(Column::Void { seqbase: Some(0) }, Column::I32(Arc::new(values)), n)
            .with_props(SideProps::dense(), SideProps::unknown())
    }

    fn sorted_right(heads: Vec<i32>) -> Table {
        let n = heads.len();
        let mut t = Table::new(Column::I32(Arc::new(heads)), Column::Void { seqbase: Some(0) }, n);
        t.set_head_props(SideProps {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: false,
            nonil: true,
        });
        t
    }

    /// `semi_join(L, L) ≡ L` (`spec.md` §8, idempotence).
    #[test]
    fn hash_semi_is_idempotent_over_identical_tables() {
        let left = dense_sorted(vec![1, 2, 3]);
        let mut right = sorted_right(vec![1, 2, 3]);
        let tracer = LockTracer::default();
        let out = semi_join_hash(&left, &mut right, &tracer).unwrap();
        assert_eq!(out.count(), left.count());
        for i in 0..out.count() {
            assert_eq!(out.value_tail(i), left.value_tail(i));
        }
    }

    #[test]
    fn merge_semi_drops_unmatched_rows() {
        let left = dense_sorted(vec![1, 2, 3]);
        let right = sorted_right(vec![2, 3, 4]);
        let out = semi_join_merge(&left, &right).unwrap();
        assert_eq!(out.count(), 2);
        assert_eq!(out.value_tail(0), ValueRef::I32(2));
        assert_eq!(out.value_tail(1), ValueRef::I32(3));
    }
}
