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

//! The atom heap: an append-only blob store for variable-width column
//! values, shared by reference. Replaces the original's weak parent-id
//! back-reference (`spec.md` §9) with an explicit `Arc` reference count —
//! the string-trick path below is an `Arc::clone`, never a raw aliasing
//! pointer.

use std::sync::Arc;

#[derive(Debug, Default)]
struct AtomHeapInner {
    bytes: Vec<u8>,
}

/// Append-only string/blob storage, reference-counted so that a fetch-join
/// result can share its right input's heap instead of copying bytes.
#[derive(Debug, Clone)]
pub struct AtomHeap {
    inner: Arc<AtomHeapInner>,
}

impl Default for AtomHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomHeap {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomHeapInner::default()),
        }
    }

    pub fn from_owned(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(AtomHeapInner { bytes }),
        }
    }

    pub fn get(&self, offset: u32, len: u32) -> &[u8] {
        let start = offset as usize;
        let end = start + len as usize;
        &self.inner.bytes[start..end]
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// Number of live references to this heap, mirroring the refcount the
    /// original tracked via parent-ids. Used only for diagnostics/tests.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// `heap_share(dst, src)`: increment the reference count. The external
    /// service contract in `spec.md` §6 allows falling back to a byte copy
    /// if sharing fails; `Arc::clone` cannot fail, so that branch never
    /// triggers in this in-process implementation.
    pub fn share(&self) -> AtomHeap {
        self.clone()
    }
}

/// A builder used by the in-memory `table_new`/append path (§6) and by the
/// physical joins that must materialize new string values (the default,
/// non-string-trick path).
#[derive(Debug, Default)]
pub struct AtomHeapBuilder {
    bytes: Vec<u8>,
}

impl AtomHeapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value and returns its `(offset, len)` within the
    /// in-progress heap.
    pub fn push(&mut self, value: &[u8]) -> (u32, u32) {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(value);
        (offset, value.len() as u32)
    }

    pub fn finish(self) -> AtomHeap {
        AtomHeap::from_owned(self.bytes)
    }
}

/// A variable-width column: offsets into a shared [`AtomHeap`].
///
/// Offsets are stored as `u32` throughout. The "string trick" (§4.1, §4.4.3)
/// is then just `StrColumn { heap: heap.share(), offsets: offsets.clone() }`
/// — no byte touched.
#[derive(Debug, Clone)]
pub struct StrColumn {
    pub heap: AtomHeap,
    /// `(offset, len)` per row; `len == u32::MAX` marks a nil entry.
    pub offsets: Vec<(u32, u32)>,
}

pub const STR_NIL_LEN: u32 = u32::MAX;

impl StrColumn {
    pub fn new(heap: AtomHeap) -> Self {
        Self {
            heap,
            offsets: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn is_nil_at(&self, i: usize) -> bool {
        self.offsets[i].1 == STR_NIL_LEN
    }

    pub fn get(&self, i: usize) -> Option<&[u8]> {
        let (offset, len) = self.offsets[i];
        if len == STR_NIL_LEN {
            None
        } else {
            Some(self.heap.get(offset, len))
        }
    }

    /// The "string trick": share the heap and copy only the offset table.
    pub fn share_trick(&self) -> StrColumn {
        StrColumn {
            heap: self.heap.share(),
            offsets: self.offsets.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_trick_shares_heap_without_copying_bytes() {
        let mut builder = AtomHeapBuilder::new();
        let a = builder.push(b"hello");
        let b = builder.push(b"world");
        let heap = builder.finish();
        let col = StrColumn {
            heap: heap.clone(),
            offsets: vec![a, b],
        };

        let tricked = col.share_trick();
        assert_eq!(tricked.get(0), Some(&b"hello"[..]));
        assert_eq!(tricked.get(1), Some(&b"world"[..]));
        assert_eq!(heap.strong_count(), 3); // original binding + col + tricked
    }
}
