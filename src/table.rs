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

//! The `Table`: a pair of aligned columns (`head`, `tail`) plus property
//! metadata (`spec.md` §3). Mirrors the role `DataChunk`/`Column` play in
//! the teacher's batch executor, collapsed to the engine's two-column shape.

use std::sync::Arc;

use crate::heap::StrColumn;
use crate::hash_index::HashIndex;
use crate::types::{Oid, StorageTag, ValueRef, OID_NIL};

/// Per-side invariants tracked by the property model (`spec.md` §3, §4.2).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SideProps {
    pub sorted: bool,
    pub rev_sorted: bool,
    pub key: bool,
    pub dense: bool,
    pub nonil: bool,
}

impl SideProps {
    /// Properties of a dense void column: `sorted ∧ key ∧ dense ∧ nonil`.
    pub fn dense() -> Self {
        Self {
            sorted: true,
            rev_sorted: false,
            key: true,
            dense: true,
            nonil: true,
        }
    }

    /// The conservative "we know nothing" starting point.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// A column's backing storage. Fixed-width columns share their backing
/// vector behind an `Arc` so that `table_slice`/`table_mirror` are true
/// zero-copy views; `Str` columns are themselves `Arc`-wrapped on top of the
/// already-shareable [`StrColumn`] heap, so a whole-column view is one Arc
/// clone regardless of whether the string trick is also in play.
#[derive(Clone)]
pub enum Column {
    /// Implicit identity column: element `i` (absolute position) is
    /// `seqbase + i`. `seqbase = None` means the whole column is nil.
    Void { seqbase: Option<Oid> },
    I8(Arc<Vec<i8>>),
    I16(Arc<Vec<i16>>),
    I32(Arc<Vec<i32>>),
    I64(Arc<Vec<i64>>),
    F32(Arc<Vec<f32>>),
    F64(Arc<Vec<f64>>),
    Oid(Arc<Vec<Oid>>),
    Str(Arc<StrColumn>),
}

impl Column {
    pub fn tag(&self) -> StorageTag {
        match self {
            Column::Void { .. } => StorageTag::Void,
            Column::I8(_) => StorageTag::I8,
            Column::I16(_) => StorageTag::I16,
            Column::I32(_) => StorageTag::I32,
            Column::I64(_) => StorageTag::I64,
            Column::F32(_) => StorageTag::F32,
            Column::F64(_) => StorageTag::F64,
            Column::Oid(_) => StorageTag::Oid,
            Column::Str(_) => StorageTag::Str,
        }
    }

    /// Read the value at absolute position `i` (not relative to any view's
    /// `first`; callers go through `Table::value_head`/`value_tail`).
    pub fn value_at(&self, i: usize) -> ValueRef<'_> {
        match self {
            Column::Void { seqbase } => match seqbase {
                None => ValueRef::Nil,
                Some(base) => {
                    let v = base.wrapping_add(i as u64);
                    if v == OID_NIL {
                        ValueRef::Nil
                    } else {
                        ValueRef::Oid(v)
                    }
                }
            },
            Column::I8(v) => nil_or(v[i], ValueRef::I8),
            Column::I16(v) => nil_or(v[i], ValueRef::I16),
            Column::I32(v) => nil_or(v[i], ValueRef::I32),
            Column::I64(v) => nil_or(v[i], ValueRef::I64),
            Column::F32(v) => nil_or(v[i], ValueRef::F32),
            Column::F64(v) => nil_or(v[i], ValueRef::F64),
            Column::Oid(v) => nil_or(v[i], ValueRef::Oid),
            Column::Str(s) => match s.get(i) {
                Some(bytes) => ValueRef::Str(bytes),
                None => ValueRef::Nil,
            },
        }
    }

    /// Whether this column, as a void sequence, has a defined seqbase
    /// (the `dense`-equivalent condition from the glossary).
    pub fn void_seqbase(&self) -> Option<Oid> {
        match self {
            Column::Void { seqbase } => *seqbase,
            _ => None,
        }
    }
}

fn nil_or<T: crate::types::Scalar>(v: T, wrap: impl FnOnce(T) -> ValueRef<'static>) -> ValueRef<'static> {
    if v.is_nil() {
        ValueRef::Nil
    } else {
        wrap(v)
    }
}

/// The primary value: an ordered sequence of `(head, tail)` tuples with
/// per-side types and property flags (`spec.md` §3).
#[derive(Clone)]
pub struct Table {
    head: Column,
    tail: Column,
    /// Index of the first live tuple; slicing advances this without
    /// copying the backing columns.
    first: usize,
    count: usize,
    head_props: SideProps,
    tail_props: SideProps,
    hash_index: Option<Arc<HashIndex>>,
}

impl Table {
    pub fn new(head: Column, tail: Column, count: usize) -> Self {
        Self {
            head,
            tail,
            first: 0,
            count,
            head_props: SideProps::unknown(),
            tail_props: SideProps::unknown(),
            hash_index: None,
        }
    }

    pub fn with_props(mut self, head_props: SideProps, tail_props: SideProps) -> Self {
        self.head_props = head_props;
        self.tail_props = tail_props;
        self
    }

    pub fn head_type(&self) -> StorageTag {
        self.head.tag()
    }

    pub fn tail_type(&self) -> StorageTag {
        self.tail.tag()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn head_column(&self) -> &Column {
        &self.head
    }

    pub fn tail_column(&self) -> &Column {
        &self.tail
    }

    pub fn head_props(&self) -> SideProps {
        self.head_props
    }

    pub fn tail_props(&self) -> SideProps {
        self.tail_props
    }

    pub fn set_head_props(&mut self, props: SideProps) {
        self.head_props = props;
    }

    pub fn set_tail_props(&mut self, props: SideProps) {
        self.tail_props = props;
    }

    pub fn head_seqbase(&self) -> Option<Oid> {
        self.head.void_seqbase().map(|base| base.wrapping_add(self.first as u64))
    }

    pub fn tail_seqbase(&self) -> Option<Oid> {
        self.tail.void_seqbase().map(|base| base.wrapping_add(self.first as u64))
    }

    /// `value_head(t, i)`: by-position access (`spec.md` §6).
    pub fn value_head(&self, i: usize) -> ValueRef<'_> {
        self.head.value_at(self.first + i)
    }

    /// `value_tail(t, i)`: by-position access (`spec.md` §6).
    pub fn value_tail(&self, i: usize) -> ValueRef<'_> {
        self.tail.value_at(self.first + i)
    }

    /// A whole column is logically nil iff it is void with no seqbase.
    pub fn head_is_void_nil(&self) -> bool {
        matches!(self.head, Column::Void { seqbase: None })
    }

    pub fn tail_is_void_nil(&self) -> bool {
        matches!(self.tail, Column::Void { seqbase: None })
    }

    /// `table_slice(t, lo, hi)`: zero-copy view (`spec.md` §6).
    pub fn slice(&self, lo: usize, hi: usize) -> Table {
        assert!(lo <= hi && hi <= self.count);
        Table {
            head: self.head.clone(),
            tail: self.tail.clone(),
            first: self.first + lo,
            count: hi - lo,
            head_props: sliced_props(self.head_props, lo, hi, self.count),
            tail_props: sliced_props(self.tail_props, lo, hi, self.count),
            hash_index: None,
        }
    }

    /// `table_mirror(t)`: swap head/tail, O(1) (`spec.md` §6).
    pub fn mirror(&self) -> Table {
        Table {
            head: self.tail.clone(),
            tail: self.head.clone(),
            first: self.first,
            count: self.count,
            head_props: self.tail_props,
            tail_props: self.head_props,
            hash_index: None,
        }
    }

    pub fn hash_index(&self) -> Option<&Arc<HashIndex>> {
        self.hash_index.as_ref()
    }

    pub fn set_hash_index(&mut self, index: Arc<HashIndex>) {
        self.hash_index = Some(index);
    }
}

/// Any side property implying uniqueness/order over the whole column still
/// holds over a contiguous sub-range; `dense` additionally requires the
/// slice to start at the original column's first position to keep `seqbase`
/// meaningful, so a non-prefix slice of a dense column is merely `sorted ∧
/// key`, not `dense`.
fn sliced_props(props: SideProps, lo: usize, _hi: usize, _len: usize) -> SideProps {
    SideProps {
        sorted: props.sorted,
        rev_sorted: props.rev_sorted,
        key: props.key,
        dense: props.dense && lo == 0,
        nonil: props.nonil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_table(n: usize) -> Table {
        let head = Column::Void { seqbase: Some(0) };
        let tail = Column::I32(Arc::new((0..n as i32).map(|x| x * 10).collect()));
        Table::new(head, tail, n).with_props(SideProps::dense(), SideProps::unknown())
    }

    #[test]
    fn slice_is_zero_copy_view() {
        let t = dense_table(5);
        let view = t.slice(1, 3);
        assert_eq!(view.count(), 2);
        assert_eq!(view.value_head(0), ValueRef::Oid(1));
        assert_eq!(view.value_tail(0), ValueRef::I32(10));
        assert_eq!(view.value_tail(1), ValueRef::I32(20));
    }

    #[test]
    fn mirror_swaps_sides() {
        let t = dense_table(3);
        let m = t.mirror();
        assert_eq!(m.head_type(), StorageTag::I32);
        assert_eq!(m.tail_type(), StorageTag::Void);
        assert_eq!(m.value_head(1), ValueRef::I32(10));
    }
}
