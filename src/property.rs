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

//! Component 4.2: the property model. `derive` computes an output table's
//! flags from its inputs and from how the join actually behaved (whether
//! every left/right tuple was consumed exactly once). These rules are
//! contracts the physical joins must honor; merge-join and hash-join call
//! [`derive_equi_join`] directly, while fetch-join, outer-join and the
//! set-style joins apply the same bullets with their own extra exceptions
//! (documented at each call site, per `spec.md` §4.4).

use crate::table::SideProps;

/// Inputs to the equi-join property rules (`spec.md` §4.2). `left_tail` and
/// `right_head` are the join columns; `left_head` and `right_tail` are the
/// columns that survive into the output.
#[derive(Debug, Clone, Copy)]
pub struct EquiJoinPropertyInputs {
    pub left_head: SideProps,
    pub left_tail: SideProps,
    pub right_head: SideProps,
    pub right_tail: SideProps,
    /// Every left tuple contributed exactly one output tuple: no row was
    /// dropped (a miss) and none was duplicated (a multi-match).
    pub one_to_one_from_left: bool,
    /// Every right tuple was hit by exactly one left tuple.
    pub one_to_one_from_right: bool,
    /// The operator injects a nil tail value on an unmatched left row
    /// (outer-join's miss policy); plain equi-join never does.
    pub injects_nils_on_miss: bool,
}

/// Computes `(output.head_props, output.tail_props)`.
///
/// Tail order for the "otherwise" branch is left `sorted = false,
/// rev_sorted = false`: the rule says it is "determined on the fly
/// (optimistic-and-check)", which only the physical join itself can do by
/// watching consecutive emitted values as it goes (see `join::merge`'s and
/// `join::fetch`'s on-the-fly tracking) — this function gives the
/// conservative starting point the operator then tightens or leaves alone.
pub fn derive_equi_join(inputs: &EquiJoinPropertyInputs) -> (SideProps, SideProps) {
    let key_on_both_join_sides = inputs.left_tail.key && inputs.right_head.key;

    let full_head_inherit = inputs.right_head.key && inputs.one_to_one_from_left;
    let mut head = if full_head_inherit {
        SideProps {
            sorted: inputs.left_head.sorted,
            rev_sorted: inputs.left_head.rev_sorted,
            dense: inputs.left_head.dense,
            key: inputs.left_head.key,
            nonil: inputs.left_head.nonil,
        }
    } else {
        SideProps {
            sorted: inputs.left_head.sorted,
            rev_sorted: inputs.left_head.rev_sorted,
            dense: false,
            key: false,
            nonil: inputs.left_head.nonil,
        }
    };

    let full_tail_inherit =
        inputs.left_tail.key && inputs.left_tail.sorted && inputs.one_to_one_from_right;
    let mut tail = if full_tail_inherit {
        SideProps {
            sorted: inputs.right_tail.sorted,
            rev_sorted: inputs.right_tail.rev_sorted,
            dense: inputs.right_tail.dense,
            key: false,
            nonil: inputs.right_tail.nonil && !inputs.injects_nils_on_miss,
        }
    } else {
        SideProps {
            sorted: false,
            rev_sorted: false,
            dense: false,
            key: false,
            nonil: inputs.right_tail.nonil && !inputs.injects_nils_on_miss,
        }
    };

    // "If both left and right are key on the join side, the output is key
    // on both sides" — overrides whatever the inheritance branches above
    // set for `key`.
    head.key = key_on_both_join_sides;
    tail.key = key_on_both_join_sides;

    (head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense() -> SideProps {
        SideProps {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: true,
            nonil: true,
        }
    }

    fn unknown() -> SideProps {
        SideProps::default()
    }

    #[test]
    fn full_head_inherit_when_right_head_key_and_every_left_row_hits() {
        let inputs = EquiJoinPropertyInputs {
            left_head: dense(),
            left_tail: unknown(),
            right_head: dense(),
            right_tail: unknown(),
            one_to_one_from_left: true,
            one_to_one_from_right: false,
            injects_nils_on_miss: false,
        };
        let (head, _tail) = derive_equi_join(&inputs);
        assert!(head.sorted);
        assert!(head.dense);
    }

    #[test]
    fn outer_join_clears_tail_nonil() {
        let inputs = EquiJoinPropertyInputs {
            left_head: unknown(),
            left_tail: unknown(),
            right_head: unknown(),
            right_tail: dense(),
            one_to_one_from_left: true,
            one_to_one_from_right: false,
            injects_nils_on_miss: true,
        };
        let (_head, tail) = derive_equi_join(&inputs);
        assert!(!tail.nonil);
    }

    #[test]
    fn both_key_join_sides_make_output_key_both_sides() {
        let inputs = EquiJoinPropertyInputs {
            left_head: unknown(),
            left_tail: dense(),
            right_head: dense(),
            right_tail: unknown(),
            one_to_one_from_left: false,
            one_to_one_from_right: false,
            injects_nils_on_miss: false,
        };
        let (head, tail) = derive_equi_join(&inputs);
        assert!(head.key);
        assert!(tail.key);
    }
}
