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

//! The remaining external-service contracts of `spec.md` §6 not already
//! covered by [`crate::builder`] (`table_new`/`table_extend`) or
//! [`crate::hash_index`] (`hash_build`/`hash_lookup`): `sort`, `stable_sort`,
//! and `sorted_lower_bound`. Implemented in-process as the planner's own
//! table service, the way the teacher's batch executor calls into
//! `risingwave_common::array` rather than a separate storage crate.

use std::cmp::Ordering;

use crate::builder::{materialize_tag, ColumnBuilder};
use crate::error::Result;
use crate::hash_index::Side;
use crate::table::{SideProps, Table};
use crate::types::ValueRef;

fn side_value(table: &Table, side: Side, i: usize) -> ValueRef<'_> {
    match side {
        Side::Head => table.value_head(i),
        Side::Tail => table.value_tail(i),
    }
}

/// `sort(t) -> Table` (`spec.md` §6): a sorted copy, not in-place. Our
/// permutation sort is stable by construction (`[T]::sort_by` is a stable
/// sort), so this also satisfies `stable_sort`'s contract; both names are
/// kept since the planner's rule 3 distinguishes them by cost, not outcome
/// (`spec.md` §4.5, Open Questions).
pub fn sort(table: &Table, side: Side) -> Result<Table> {
    sort_impl(table, side)
}

pub fn stable_sort(table: &Table, side: Side) -> Result<Table> {
    sort_impl(table, side)
}

fn sort_impl(table: &Table, side: Side) -> Result<Table> {
    let n = table.count();
    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| side_value(table, side, a).compare(&side_value(table, side, b)));

    // A `Void` column's values are only implicit while its positions stay in
    // seqbase order; once permuted they must be materialized as plain oids.
    let mut head_b = ColumnBuilder::with_capacity(materialize_tag(table.head_type()), n)?;
    let mut tail_b = ColumnBuilder::with_capacity(materialize_tag(table.tail_type()), n)?;
    for &i in &idx {
        head_b.push_value(table.value_head(i));
        tail_b.push_value(table.value_tail(i));
    }

    let sorted_side = SideProps {
        sorted: true,
        rev_sorted: n <= 1,
        key: match side {
            Side::Head => table.head_props().key,
            Side::Tail => table.tail_props().key,
        },
        dense: false,
        nonil: match side {
            Side::Head => table.head_props().nonil,
            Side::Tail => table.tail_props().nonil,
        },
    };
    let other_side = SideProps::unknown();
    let (head_props, tail_props) = match side {
        Side::Head => (sorted_side, other_side),
        Side::Tail => (other_side, sorted_side),
    };

    let count = head_b.len();
    Ok(Table::new(head_b.finish(), tail_b.finish(), count).with_props(head_props, tail_props))
}

/// `sorted_lower_bound(t, side, v) -> position` (`spec.md` §6).
pub fn sorted_lower_bound(table: &Table, side: Side, v: &ValueRef<'_>) -> usize {
    let mut lo = 0usize;
    let mut hi = table.count();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if side_value(table, side, mid).compare(v) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::table::Column;

    #[test]
    fn sort_by_head_produces_stable_ascending_order() {
        let head = Column::I32(Arc::new(vec![3, 1, 2, 1]));
        let tail = Column::I32(Arc::new(vec![30, 10, 20, 11]));
        let t = Table::new(head, tail, 4);
        let sorted = sort(&t, Side::Head).unwrap();
        let values: Vec<i32> = (0..sorted.count())
            .map(|i| match sorted.value_head(i) {
                ValueRef::I32(x) => x,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, vec![1, 1, 2, 3]);
        // stability: the two `1`s keep their original relative order (10 before 11).
        assert_eq!(sorted.value_tail(0), ValueRef::I32(10));
        assert_eq!(sorted.value_tail(1), ValueRef::I32(11));
    }
}
