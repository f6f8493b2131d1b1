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

//! A cost-based relational join engine over the columnar [`Table`]
//! container: two aligned columns (`head`, `tail`), each carrying the
//! sortedness/key/density flags a planner needs to pick a physical
//! algorithm without touching the data.
//!
//! [`Engine`] is the crate's front door: it threads a [`JoinConfig`] and a
//! [`LockTracer`] through every operation, the same two dependencies
//! [`Planner`] already carries internally. Each physical algorithm also
//! stays reachable directly (`join::hash::hash_join`, `join::merge::merge_join`,
//! ...) for callers who already know which one they want and would rather
//! skip the planner's own cost estimate.

pub mod builder;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod estimate;
pub mod hash_index;
pub mod heap;
pub mod join;
pub mod multiway;
pub mod planner;
pub mod property;
pub mod storage;
pub mod table;
pub mod types;

pub use config::JoinConfig;
pub use concurrency::LockTracer;
pub use error::{JoinError, Result};
pub use join::ThetaOp;
pub use multiway::{multi_join, MultiJoinStatus};
pub use planner::Planner;
pub use table::{Column, SideProps, Table};
pub use types::{Oid, Scalar, StorageTag, ValueRef};

/// The full set of exposed join operations (`spec.md` §6), each threading
/// its own [`JoinConfig`] and [`LockTracer`] so a caller never has to reach
/// into `planner`/`join::*` directly unless it wants a specific physical
/// algorithm by name.
pub struct Engine {
    config: JoinConfig,
    tracer: LockTracer,
}

impl Engine {
    pub fn new(config: JoinConfig) -> Self {
        Self { config, tracer: LockTracer::default() }
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    pub fn tracer(&self) -> &LockTracer {
        &self.tracer
    }

    fn planner(&self) -> Planner<'_> {
        Planner::new(&self.config, &self.tracer)
    }

    /// Cost-based equi-join: picks among sort-merge, hash, and fetch-join
    /// strategies (`spec.md` §4.5).
    pub fn join(&self, left: &Table, right: &mut Table, hint: Option<usize>) -> Result<Table> {
        self.planner().equi_join(left, right, hint)
    }

    /// Left outer equi-join: every unmatched left row survives, paired with
    /// a nil tail. Same underlying algorithm as [`Self::outer_join`]; kept
    /// as a distinct name since `spec.md` §6 exposes both.
    pub fn left_join(&self, left: &Table, right: &mut Table, hint: Option<usize>) -> Result<Table> {
        self.planner().outer_join(left, right, hint)
    }

    pub fn outer_join(&self, left: &Table, right: &mut Table, hint: Option<usize>) -> Result<Table> {
        self.planner().outer_join(left, right, hint)
    }

    pub fn merge_join(&self, left: &Table, right: &Table, hint: Option<usize>) -> Result<Table> {
        join::merge::merge_join(left, right, hint, &self.config)
    }

    pub fn hash_join(&self, left: &Table, right: &mut Table, hint: Option<usize>) -> Result<Table> {
        join::hash::hash_join(left, right, hint, &self.tracer)
    }

    pub fn fetch_join(&self, left: &Table, right: &Table, opts: join::fetch::FetchOptions) -> Result<Table> {
        join::fetch::fetch_join(left, right, opts)
    }

    pub fn left_fetch_join(&self, left: &Table, right: &Table) -> Result<Table> {
        join::fetch::left_fetch_join(left, right)
    }

    pub fn theta_join(&self, left: &Table, right: &mut Table, op: ThetaOp, hint: Option<usize>) -> Result<Table> {
        self.planner().theta_join(left, right, op, hint)
    }

    pub fn semi_join(&self, left: &Table, right: &mut Table) -> Result<Table> {
        self.planner().semi_join(left, right)
    }

    pub fn anti_join(&self, left: &Table, right: &Table, hint: Option<usize>) -> Result<Table> {
        join::anti::anti_join(left, right, hint)
    }

    pub fn cross(&self, left: &Table, right: &Table) -> Result<Table> {
        join::cross::cross(left, right)
    }

    /// Multi-way equi-join over `>= 2` tables sharing one join column
    /// (`spec.md` §4.6). `order_by` overrides the default smallest-table
    /// lead selection.
    pub fn multi_join(
        &self,
        tables: &mut [Table],
        order_by: Option<usize>,
        per_value: &mut [&mut dyn FnMut(usize)],
        per_tuple: &mut dyn FnMut(&[usize]),
    ) -> Result<MultiJoinStatus> {
        multiway::multi_join(tables, order_by, &self.tracer, per_value, per_tuple)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::table::{Column, SideProps};

    fn int_table(heads: Vec<i32>, tails: Vec<i32>) -> Table {
        let n = heads.len();
        Table::new(Column::I32(Arc::new(heads)), Column::I32(Arc::new(tails)), n)
    }

    #[test]
    fn engine_join_dispatches_through_the_planner() {
        let engine = Engine::new(JoinConfig::default());
        let left = int_table(vec![0, 1, 2], vec![1, 2, 3]);
        let mut right = int_table(vec![1, 2, 3], vec![10, 20, 30]);
        right.set_head_props(SideProps {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: false,
            nonil: true,
        });
        let out = engine.join(&left, &mut right, None).unwrap();
        assert_eq!(out.count(), 3);
    }

    #[test]
    fn engine_cross_matches_direct_module_call() {
        let engine = Engine::new(JoinConfig::default());
        let left = int_table(vec![1, 2], vec![10, 20]);
        let right = int_table(vec![100, 200], vec![1000, 2000]);
        let out = engine.cross(&left, &right).unwrap();
        assert_eq!(out.count(), 4);
    }
}
