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

//! `table_new`/`table_extend` (`spec.md` §6), realized in-process: an
//! amortized-growth column builder per storage tag, collapsed into one enum
//! the way the teacher's `ArrayBuilderImpl` collapses per-`DataType`
//! builders (`hash_join_state.rs`: `data_type.create_array_builder(...)`).

use std::sync::Arc;

use crate::error::{JoinError, Result};
use crate::heap::{AtomHeap, AtomHeapBuilder, StrColumn, STR_NIL_LEN};
use crate::table::Column;
use crate::types::{Oid, StorageTag, ValueRef};

/// Mirrors the teacher's `MAX_BUILD_ROW_COUNT` cap in
/// `hash_join_state.rs` — an upper bound a real output could never
/// plausibly need, used as the "maximum table size" ceiling `spec.md` §4.3
/// step 6 references.
pub const MAX_TABLE_COUNT: usize = u32::MAX as usize;

pub enum ColumnBuilder {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Oid(Vec<Oid>),
    Str(StrBuilder),
}

pub enum StrBuilder {
    /// Values are materialized fresh: the default (non-string-trick) path.
    Fresh {
        heap: AtomHeapBuilder,
        offsets: Vec<(u32, u32)>,
    },
    /// The string trick (`spec.md` §4.1, §4.4.3): the heap is shared by
    /// reference; only integer offsets are ever pushed here.
    Shared { heap: AtomHeap, offsets: Vec<(u32, u32)> },
}

/// A `Void` column has no backing vector — it's an implicit `seqbase + i`
/// view — so it cannot be built row-by-row. Any caller about to build a
/// head/tail it read off an existing table (rather than slice/mirror it as
/// a zero-copy view) must materialize that side as `Oid` first, the same
/// substitution `storage::sort_impl` already applies when permutation
/// breaks a `Void` column's implicit ordering.
pub fn materialize_tag(tag: StorageTag) -> StorageTag {
    match tag {
        StorageTag::Void => StorageTag::Oid,
        tag => tag,
    }
}

impl ColumnBuilder {
    pub fn with_capacity(tag: StorageTag, capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(match tag {
            StorageTag::Void => {
                unreachable!("void columns must be materialized to Oid via materialize_tag before building")
            }
            StorageTag::I8 => ColumnBuilder::I8(Vec::with_capacity(capacity)),
            StorageTag::I16 => ColumnBuilder::I16(Vec::with_capacity(capacity)),
            StorageTag::I32 => ColumnBuilder::I32(Vec::with_capacity(capacity)),
            StorageTag::I64 => ColumnBuilder::I64(Vec::with_capacity(capacity)),
            StorageTag::F32 => ColumnBuilder::F32(Vec::with_capacity(capacity)),
            StorageTag::F64 => ColumnBuilder::F64(Vec::with_capacity(capacity)),
            StorageTag::Oid => ColumnBuilder::Oid(Vec::with_capacity(capacity)),
            StorageTag::Str => ColumnBuilder::Str(StrBuilder::Fresh {
                heap: AtomHeapBuilder::new(),
                offsets: Vec::with_capacity(capacity),
            }),
        })
    }

    /// Begins a builder that will use the string trick: the output shares
    /// `heap` and only ever appends offsets.
    pub fn with_shared_heap(heap: AtomHeap, capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(ColumnBuilder::Str(StrBuilder::Shared {
            heap,
            offsets: Vec::with_capacity(capacity),
        }))
    }

    pub fn tag(&self) -> StorageTag {
        match self {
            ColumnBuilder::I8(_) => StorageTag::I8,
            ColumnBuilder::I16(_) => StorageTag::I16,
            ColumnBuilder::I32(_) => StorageTag::I32,
            ColumnBuilder::I64(_) => StorageTag::I64,
            ColumnBuilder::F32(_) => StorageTag::F32,
            ColumnBuilder::F64(_) => StorageTag::F64,
            ColumnBuilder::Oid(_) => StorageTag::Oid,
            ColumnBuilder::Str(_) => StorageTag::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuilder::I8(v) => v.len(),
            ColumnBuilder::I16(v) => v.len(),
            ColumnBuilder::I32(v) => v.len(),
            ColumnBuilder::I64(v) => v.len(),
            ColumnBuilder::F32(v) => v.len(),
            ColumnBuilder::F64(v) => v.len(),
            ColumnBuilder::Oid(v) => v.len(),
            ColumnBuilder::Str(StrBuilder::Fresh { offsets, .. })
            | ColumnBuilder::Str(StrBuilder::Shared { offsets, .. }) => offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated slots, used by merge-join's `limit` budget variant to
    /// decide when the output has reached a configured fraction of
    /// capacity (`spec.md` §4.4.1, "Budget variant").
    pub fn capacity(&self) -> usize {
        match self {
            ColumnBuilder::I8(v) => v.capacity(),
            ColumnBuilder::I16(v) => v.capacity(),
            ColumnBuilder::I32(v) => v.capacity(),
            ColumnBuilder::I64(v) => v.capacity(),
            ColumnBuilder::F32(v) => v.capacity(),
            ColumnBuilder::F64(v) => v.capacity(),
            ColumnBuilder::Oid(v) => v.capacity(),
            ColumnBuilder::Str(StrBuilder::Fresh { offsets, .. })
            | ColumnBuilder::Str(StrBuilder::Shared { offsets, .. }) => offsets.capacity(),
        }
    }

    /// `table_extend(t, new_cap)`: grows storage, preserving existing
    /// values. Fails with `OutOfMemory` above [`MAX_TABLE_COUNT`].
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        check_capacity(self.len() + additional)?;
        match self {
            ColumnBuilder::I8(v) => v.reserve(additional),
            ColumnBuilder::I16(v) => v.reserve(additional),
            ColumnBuilder::I32(v) => v.reserve(additional),
            ColumnBuilder::I64(v) => v.reserve(additional),
            ColumnBuilder::F32(v) => v.reserve(additional),
            ColumnBuilder::F64(v) => v.reserve(additional),
            ColumnBuilder::Oid(v) => v.reserve(additional),
            ColumnBuilder::Str(StrBuilder::Fresh { offsets, .. })
            | ColumnBuilder::Str(StrBuilder::Shared { offsets, .. }) => offsets.reserve(additional),
        }
        Ok(())
    }

    pub fn push_nil(&mut self) {
        match self {
            ColumnBuilder::I8(v) => v.push(i8::nil_sentinel()),
            ColumnBuilder::I16(v) => v.push(i16::nil_sentinel()),
            ColumnBuilder::I32(v) => v.push(i32::nil_sentinel()),
            ColumnBuilder::I64(v) => v.push(i64::nil_sentinel()),
            ColumnBuilder::F32(v) => v.push(f32::NAN),
            ColumnBuilder::F64(v) => v.push(f64::NAN),
            ColumnBuilder::Oid(v) => v.push(crate::types::OID_NIL),
            ColumnBuilder::Str(StrBuilder::Fresh { offsets, .. })
            | ColumnBuilder::Str(StrBuilder::Shared { offsets, .. }) => {
                offsets.push((0, STR_NIL_LEN))
            }
        }
    }

    /// Pushes a value read generically via [`ValueRef`]. Used by the
    /// operators that cannot stay on a pure copy-by-position fast path
    /// (theta-join, anti-join, cross, outer-join's injected misses).
    pub fn push_value(&mut self, value: ValueRef<'_>) {
        match (self, value) {
            (ColumnBuilder::I8(v), ValueRef::I8(x)) => v.push(x),
            (ColumnBuilder::I16(v), ValueRef::I16(x)) => v.push(x),
            (ColumnBuilder::I32(v), ValueRef::I32(x)) => v.push(x),
            (ColumnBuilder::I64(v), ValueRef::I64(x)) => v.push(x),
            (ColumnBuilder::F32(v), ValueRef::F32(x)) => v.push(x),
            (ColumnBuilder::F64(v), ValueRef::F64(x)) => v.push(x),
            (ColumnBuilder::Oid(v), ValueRef::Oid(x)) => v.push(x),
            (ColumnBuilder::Str(StrBuilder::Fresh { heap, offsets }), ValueRef::Str(bytes)) => {
                offsets.push(heap.push(bytes));
            }
            (this, ValueRef::Nil) => this.push_nil(),
            (this, value) => panic!(
                "pushing value of incompatible tag {:?} into a {:?} column builder",
                value.tag(),
                this.tag()
            ),
        }
    }

    /// The string trick: copy only the `(offset, len)` pair, bytes
    /// untouched. Panics if this builder was not started with
    /// [`ColumnBuilder::with_shared_heap`].
    pub fn push_str_offset_trick(&mut self, offset: (u32, u32)) {
        match self {
            ColumnBuilder::Str(StrBuilder::Shared { offsets, .. }) => offsets.push(offset),
            _ => panic!("push_str_offset_trick called on a non-shared-heap builder"),
        }
    }

    pub fn finish(self) -> Column {
        match self {
            ColumnBuilder::I8(v) => Column::I8(Arc::new(v)),
            ColumnBuilder::I16(v) => Column::I16(Arc::new(v)),
            ColumnBuilder::I32(v) => Column::I32(Arc::new(v)),
            ColumnBuilder::I64(v) => Column::I64(Arc::new(v)),
            ColumnBuilder::F32(v) => Column::F32(Arc::new(v)),
            ColumnBuilder::F64(v) => Column::F64(Arc::new(v)),
            ColumnBuilder::Oid(v) => Column::Oid(Arc::new(v)),
            ColumnBuilder::Str(StrBuilder::Fresh { heap, offsets }) => {
                Column::Str(Arc::new(StrColumn {
                    heap: heap.finish(),
                    offsets,
                }))
            }
            ColumnBuilder::Str(StrBuilder::Shared { heap, offsets }) => {
                Column::Str(Arc::new(StrColumn { heap, offsets }))
            }
        }
    }
}

fn check_capacity(requested: usize) -> Result<()> {
    if requested > MAX_TABLE_COUNT {
        Err(JoinError::OutOfMemory {
            what: "output table",
            requested,
        })
    } else {
        Ok(())
    }
}

/// Tiny extension trait so [`ColumnBuilder::push_nil`] can name each
/// fixed-width type's sentinel without re-deriving it from [`crate::types::Scalar`]
/// (which is object-safety-incompatible with the enum dispatch above).
trait NilSentinel {
    fn nil_sentinel() -> Self;
}

macro_rules! impl_nil_sentinel {
    ($ty:ty) => {
        impl NilSentinel for $ty {
            fn nil_sentinel() -> Self {
                <$ty as crate::types::Scalar>::NIL
            }
        }
    };
}

impl_nil_sentinel!(i8);
impl_nil_sentinel!(i16);
impl_nil_sentinel!(i32);
impl_nil_sentinel!(i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_roundtrips_fixed_width_values() {
        let mut b = ColumnBuilder::with_capacity(StorageTag::I32, 4).unwrap();
        b.push_value(ValueRef::I32(10));
        b.push_nil();
        b.push_value(ValueRef::I32(20));
        let col = b.finish();
        assert_eq!(col.value_at(0), ValueRef::I32(10));
        assert!(col.value_at(1).is_nil());
        assert_eq!(col.value_at(2), ValueRef::I32(20));
    }

    #[test]
    fn string_trick_builder_only_copies_offsets() {
        let mut heap_builder = AtomHeapBuilder::new();
        let off = heap_builder.push(b"hello");
        let heap = heap_builder.finish();

        let mut b = ColumnBuilder::with_shared_heap(heap.clone(), 1).unwrap();
        b.push_str_offset_trick(off);
        let col = b.finish();
        match col {
            Column::Str(s) => assert_eq!(s.get(0), Some(&b"hello"[..])),
            _ => panic!("expected Str column"),
        }
    }
}
