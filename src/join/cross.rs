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

//! Component 4.4.8: the cross product. Single-row sides get their
//! properties inherited directly (the repeated side is, value-wise,
//! identical to its single row or to the other side verbatim); the general
//! case is conservative. The spec's "constant-column construction" for the
//! single-row case is not modeled as a distinct zero-copy column kind here
//! — [`crate::table::Column`] has no constant variant — so the broadcast
//! value is still materialized row-by-row; only the property inheritance is
//! kept cheap.

use crate::builder::{materialize_tag, ColumnBuilder};
use crate::error::Result;
use crate::table::{SideProps, Table};

pub fn cross(left: &Table, right: &Table) -> Result<Table> {
    let l_count = left.count();
    let r_count = right.count();
    let cap_hint = l_count.saturating_mul(r_count);

    let mut head_b = ColumnBuilder::with_capacity(materialize_tag(left.head_type()), cap_hint)?;
    let mut tail_b = ColumnBuilder::with_capacity(materialize_tag(right.tail_type()), cap_hint)?;

    for l in 0..l_count {
        let h = left.value_head(l);
        for r in 0..r_count {
            head_b.push_value(h);
            tail_b.push_value(right.value_tail(r));
        }
    }

    let head_props = if r_count == 1 {
        left.head_props()
    } else {
        SideProps::unknown()
    };
    let tail_props = if l_count == 1 {
        right.tail_props()
    } else {
        SideProps::unknown()
    };

    let count = head_b.len();
    Ok(Table::new(head_b.finish(), tail_b.finish(), count).with_props(head_props, tail_props))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::table::Column;
    use crate::types::ValueRef;

    fn table(heads: Vec<i32>, tails: Vec<i32>) -> Table {
        let n = heads.len();
        Table::new(Column::I32(Arc::new(heads)), Column::I32(Arc::new(tails)), n)
    }

    #[test]
    fn cross_emits_full_product_in_row_major_order() {
        let left = table(vec![1, 2], vec![0, 0]);
        let right = table(vec![0, 0], vec![10, 20]);
        let out = cross(&left, &right).unwrap();
        assert_eq!(out.count(), 4);
        let got: Vec<(i32, i32)> = (0..out.count())
            .map(|i| {
                let h = match out.value_head(i) {
                    ValueRef::I32(x) => x,
                    other => panic!("unexpected {other:?}"),
                };
                let t = match out.value_tail(i) {
                    ValueRef::I32(x) => x,
                    other => panic!("unexpected {other:?}"),
                };
                (h, t)
            })
            .collect();
        assert_eq!(got, vec![(1, 10), (1, 20), (2, 10), (2, 20)]);
    }

    #[test]
    fn single_row_right_inherits_left_head_props() {
        let mut left = table(vec![1, 2, 3], vec![0, 0, 0]);
        left.set_head_props(SideProps {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: false,
            nonil: true,
        });
        let right = table(vec![0], vec![99]);
        let out = cross(&left, &right).unwrap();
        assert!(out.head_props().sorted);
        assert!(out.head_props().key);
    }
}
