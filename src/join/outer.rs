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

//! Component 4.4.5: outer-join. Reuses merge-join's miss-value pairing when
//! the right side is already sorted (and not the trivially dense case,
//! which belongs to fetch-join); otherwise probes a hash index and injects
//! a nil tail on misses (`spec.md` §4.4.5).

use crate::concurrency::LockTracer;
use crate::config::JoinConfig;
use crate::error::Result;
use crate::hash_index::Side;
use crate::property::{derive_equi_join, EquiJoinPropertyInputs};
use crate::table::Table;

use super::{merge, new_output_builders};

pub fn outer_join(left: &Table, right: &mut Table, hint: Option<usize>, config: &JoinConfig, tracer: &LockTracer) -> Result<Table> {
    if right.head_props().sorted && !right.head_props().dense {
        return merge::merge_join_outer(left, right, hint, config);
    }
    hash_outer_join(left, right, hint, tracer)
}

fn hash_outer_join(left: &Table, right: &mut Table, hint: Option<usize>, tracer: &LockTracer) -> Result<Table> {
    let index = right.ensure_hash_index(Side::Head, tracer);

    let cap_hint = hint.unwrap_or_else(|| left.count().max(1));
    let (mut head_b, mut tail_b) = new_output_builders(left, right, cap_hint)?;

    let mut one_to_one_from_left = true;
    for l in 0..left.count() {
        let v = left.value_tail(l);
        let mut hits = 0usize;
        if !v.is_nil() {
            for r in index.lookup(right, v) {
                head_b.reserve(1)?;
                tail_b.reserve(1)?;
                head_b.push_value(left.value_head(l));
                tail_b.push_value(right.value_tail(r));
                hits += 1;
            }
        }
        if hits == 0 {
            head_b.reserve(1)?;
            tail_b.reserve(1)?;
            head_b.push_value(left.value_head(l));
            tail_b.push_nil();
        } else if hits != 1 {
            one_to_one_from_left = false;
        }
    }

    let inputs = EquiJoinPropertyInputs {
        left_head: left.head_props(),
        left_tail: left.tail_props(),
        right_head: right.head_props(),
        right_tail: right.tail_props(),
        one_to_one_from_left,
        one_to_one_from_right: false,
        injects_nils_on_miss: true,
    };
    let (head_props, tail_props) = derive_equi_join(&inputs);

    let count = head_b.len();
    Ok(Table::new(head_b.finish(), tail_b.finish(), count).with_props(head_props, tail_props))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::heap::{AtomHeapBuilder, StrColumn};
    use crate::table::Column;
    use crate::types::ValueRef;

    fn int_table(heads: Vec<i32>, tails: Vec<i32>) -> Table {
        let n = heads.len();
        Table::new(Column::I32(Arc::new(heads)), Column::I32(Arc::new(tails)), n)
    }

    fn str_right(heads: Vec<i32>, tails: Vec<&str>) -> Table {
        let n = heads.len();
        let mut builder = AtomHeapBuilder::new();
        let offsets: Vec<_> = tails.iter().map(|s| builder.push(s.as_bytes())).collect();
        let tail = StrColumn { heap: builder.finish(), offsets };
        Table::new(Column::I32(Arc::new(heads)), Column::Str(Arc::new(tail)), n)
    }

    /// `spec.md` §8 scenario 4.
    #[test]
    fn outer_join_with_miss_scenario() {
        let left = int_table(vec![0, 1], vec![1, 9]);
        let mut right = str_right(vec![1], vec!["a"]);
        let tracer = LockTracer::default();

        let out = outer_join(&left, &mut right, None, &JoinConfig::default(), &tracer).unwrap();
        assert_eq!(out.count(), 2);
        assert_eq!(out.value_head(0), ValueRef::I32(0));
        assert_eq!(out.value_tail(0), ValueRef::Str(b"a"));
        assert_eq!(out.value_head(1), ValueRef::I32(1));
        assert!(out.value_tail(1).is_nil());
        assert!(!out.tail_props().nonil);
    }
}
