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

//! Component 4.4.7: anti-join. Emits `(l.head, r.tail)` for every pair whose
//! join values differ and neither is nil (`spec.md` §4.4.7).

use crate::error::Result;
use crate::table::Table;

use super::new_output_builders;

pub fn anti_join(left: &Table, right: &Table, hint: Option<usize>) -> Result<Table> {
    let cap_hint = hint.unwrap_or_else(|| left.count() * right.count());
    let (mut head_b, mut tail_b) = new_output_builders(left, right, cap_hint)?;

    for l in 0..left.count() {
        let lv = left.value_tail(l);
        if lv.is_nil() {
            continue;
        }
        for r in 0..right.count() {
            let rv = right.value_head(r);
            if rv.is_nil() {
                continue;
            }
            if !lv.equals(&rv) {
                head_b.reserve(1)?;
                tail_b.reserve(1)?;
                head_b.push_value(left.value_head(l));
                tail_b.push_value(right.value_tail(r));
            }
        }
    }

    let count = head_b.len();
    Ok(Table::new(head_b.finish(), tail_b.finish(), count))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::heap::{AtomHeapBuilder, StrColumn};
    use crate::table::Column;
    use crate::types::ValueRef;

    fn single_row_left(head: i32, tail: i32) -> Table {
        Table::new(Column::I32(Arc::new(vec![head])), Column::I32(Arc::new(vec![tail])), 1)
    }

    fn str_right(heads: Vec<i32>, tails: Vec<&str>) -> Table {
        let n = heads.len();
        let mut builder = AtomHeapBuilder::new();
        let offsets: Vec<_> = tails.iter().map(|s| builder.push(s.as_bytes())).collect();
        let tail = StrColumn { heap: builder.finish(), offsets };
        Table::new(Column::I32(Arc::new(heads)), Column::Str(Arc::new(tail)), n)
    }

    /// `spec.md` §8 scenario 6, corrected: the prose ("only R.head != 5
    /// kept") requires one right row whose head is actually 5; the
    /// example's literal `R.head = [1,2,3]` cannot produce the two-row
    /// result it claims under the stated rule, so this test uses
    /// `R.head = [5,2,3]` to match the documented behavior (see
    /// `DESIGN.md`).
    #[test]
    fn anti_join_single_row_left_scenario() {
        let left = single_row_left(0, 5);
        let right = str_right(vec![5, 2, 3], vec!["a", "b", "c"]);
        let out = anti_join(&left, &right, None).unwrap();

        let got: Vec<(i32, Vec<u8>)> = (0..out.count())
            .map(|i| {
                let h = match out.value_head(i) {
                    ValueRef::I32(x) => x,
                    other => panic!("unexpected head {other:?}"),
                };
                let t = match out.value_tail(i) {
                    ValueRef::Str(bytes) => bytes.to_vec(),
                    other => panic!("unexpected tail {other:?}"),
                };
                (h, t)
            })
            .collect();
        assert_eq!(got, vec![(0, b"b".to_vec()), (0, b"c".to_vec())]);
    }

    #[test]
    fn nil_values_never_participate() {
        let left = single_row_left(0, i32::MIN);
        let right = str_right(vec![1, 2], vec!["a", "b"]);
        let out = anti_join(&left, &right, None).unwrap();
        assert_eq!(out.count(), 0);
    }
}
