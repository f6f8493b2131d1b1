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

//! Component 4.4.2: hash-join over an on-demand [`crate::hash_index::HashIndex`]
//! built on the right head. Grounded on the teacher's
//! `executor/join/hash_join.rs` probe loop (`for row in left: hash_map.get(key)
//! -> chain.iter()`), specialized to a single join column.

use crate::concurrency::LockTracer;
use crate::error::Result;
use crate::hash_index::Side;
use crate::property::{derive_equi_join, EquiJoinPropertyInputs};
use crate::table::Table;

use super::new_output_builders;

/// Builds (or reuses) the hash index on `right`'s head, then emits
/// `(left.head, right.tail)` for every match, skipping nil join values
/// (`spec.md` §4.4.2, §8 "Null-dominance").
pub fn hash_join(left: &Table, right: &mut Table, hint: Option<usize>, tracer: &LockTracer) -> Result<Table> {
    let index = right.ensure_hash_index(Side::Head, tracer);

    let cap_hint = hint.unwrap_or_else(|| left.count().max(1));
    let (mut head_b, mut tail_b) = new_output_builders(left, right, cap_hint)?;

    let mut one_to_one_from_left = true;
    let mut matched_right_count = 0usize;
    let l_count = left.count();

    for l in 0..l_count {
        let v = left.value_tail(l);
        if v.is_nil() {
            one_to_one_from_left = false;
            continue;
        }
        let mut hits = 0usize;
        for r in index.lookup(right, v) {
            head_b.reserve(1)?;
            tail_b.reserve(1)?;
            head_b.push_value(left.value_head(l));
            tail_b.push_value(right.value_tail(r));
            hits += 1;
            matched_right_count += 1;
        }
        if hits != 1 {
            one_to_one_from_left = false;
        }
    }

    // "If right is key on head, the output is key when sizes match"
    // (`spec.md` §4.4.2 step 3): every left row found exactly one match and
    // every matched right row is unique, so the right-side multiplicity is
    // trivially 1 whenever the index side itself is key.
    let one_to_one_from_right = right.head_props().key && matched_right_count == l_count;

    let inputs = EquiJoinPropertyInputs {
        left_head: left.head_props(),
        left_tail: left.tail_props(),
        right_head: right.head_props(),
        right_tail: right.tail_props(),
        one_to_one_from_left,
        one_to_one_from_right,
        injects_nils_on_miss: false,
    };
    let (head_props, tail_props) = derive_equi_join(&inputs);

    let count = head_b.len();
    Ok(Table::new(head_b.finish(), tail_b.finish(), count).with_props(head_props, tail_props))
}

/// Counting-only variant for the estimator's `probe` closure.
pub fn count_matches(left: &Table, right: &mut Table, tracer: &LockTracer) -> Result<usize> {
    let index = right.ensure_hash_index(Side::Head, tracer);
    let mut total = 0usize;
    for l in 0..left.count() {
        let v = left.value_tail(l);
        if v.is_nil() {
            continue;
        }
        total += index.lookup(right, v).count();
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::heap::AtomHeapBuilder;
    use crate::heap::StrColumn;
    use crate::table::{Column, SideProps};
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

    /// `spec.md` §8 scenario 2 — matches appear in hash-chain (build-physical)
    /// order: for L row with value 1, right rows (1,"x") then (1,"y").
    #[test]
    fn hash_join_duplicates_scenario() {
        let left = int_table(vec![0, 1, 2], vec![1, 1, 2]);
        let mut right = str_right(vec![1, 1, 2], vec!["x", "y", "z"]);
        let tracer = LockTracer::default();

        let out = hash_join(&left, &mut right, None, &tracer).unwrap();
        let got: Vec<(i64, Vec<u8>)> = (0..out.count())
            .map(|i| {
                let h = match out.value_head(i) {
                    ValueRef::I32(x) => x as i64,
                    other => panic!("unexpected head {other:?}"),
                };
                let t = match out.value_tail(i) {
                    ValueRef::Str(bytes) => bytes.to_vec(),
                    other => panic!("unexpected tail {other:?}"),
                };
                (h, t)
            })
            .collect();
        assert_eq!(
            got,
            vec![
                (0, b"x".to_vec()),
                (0, b"y".to_vec()),
                (1, b"x".to_vec()),
                (1, b"y".to_vec()),
                (2, b"z".to_vec()),
            ]
        );
    }

    #[test]
    fn nil_join_value_never_matches() {
        let left = int_table(vec![0], vec![i32::MIN]); // i32::MIN is the nil sentinel
        let mut right = str_right(vec![1], vec!["a"]);
        let tracer = LockTracer::default();
        let out = hash_join(&left, &mut right, None, &tracer).unwrap();
        assert_eq!(out.count(), 0);
    }

    #[test]
    fn key_right_with_full_match_is_key_output() {
        let left = int_table(vec![0, 1], vec![10, 20]);
        let mut right = str_right(vec![10, 20], vec!["a", "b"]);
        right.set_head_props(SideProps {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: false,
            nonil: true,
        });
        let tracer = LockTracer::default();
        let out = hash_join(&left, &mut right, None, &tracer).unwrap();
        assert!(out.head_props().key);
        assert!(out.tail_props().key);
    }
}
