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

//! Component 4.1: type dispatch.
//!
//! The runtime storage tag of a column selects a type-specialized inner
//! loop. Fixed-width tags are monomorphized over [`Scalar`]; the
//! variable-width `Str` tag is handled separately through the atom heap
//! (see [`crate::heap`]). This is the closed-enum dispatch analogous to
//! `risingwave_common::hash::HashKeyKind` (`calc_hash_key_kind` →
//! `dispatch_by_kind`), collapsed here to a single join column rather than a
//! composite row key.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// The oid type: a logical row identifier, platform word size.
pub type Oid = u64;

/// `oid::NIL`. Used as the void seqbase sentinel and the oid nil sentinel.
pub const OID_NIL: Oid = u64::MAX;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StorageTag {
    Void,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Oid,
    Str,
}

impl StorageTag {
    pub fn is_fixed_width(self) -> bool {
        !matches!(self, StorageTag::Void | StorageTag::Str)
    }
}

/// A type-specialized scalar storable in a fixed-width column.
///
/// Every primitive tag (`i8..i64`, `f32/f64`, `oid`) implements this once;
/// the physical joins call through it instead of re-deriving comparisons per
/// operator.
pub trait Scalar: Copy + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// The sentinel nil value for this type (per `spec.md` §9's note on
    /// retaining sentinels in storage for density).
    const NIL: Self;

    fn is_nil(&self) -> bool;

    /// Three-way compare; nil sorts last by convention, matching the
    /// original engine's ascending-with-nils-high ordering.
    fn compare(&self, other: &Self) -> Ordering;

    fn hash64(&self) -> u64;
}

macro_rules! impl_scalar_int {
    ($ty:ty, $nil:expr) => {
        impl Scalar for $ty {
            const NIL: Self = $nil;

            fn is_nil(&self) -> bool {
                *self == Self::NIL
            }

            fn compare(&self, other: &Self) -> Ordering {
                match (self.is_nil(), other.is_nil()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.cmp(other),
                }
            }

            fn hash64(&self) -> u64 {
                let mut h = rustc_hash_stub(*self as i64 as u64);
                h ^= h >> 33;
                h
            }
        }
    };
}

// A tiny, dependency-free finalizer (splitmix64-style) used to turn a raw
// integer payload into a well-mixed 64-bit hash before it reaches the hash
// index's bucket table.
#[inline(always)]
fn rustc_hash_stub(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x
}

impl_scalar_int!(i8, i8::MIN);
impl_scalar_int!(i16, i16::MIN);
impl_scalar_int!(i32, i32::MIN);
impl_scalar_int!(i64, i64::MIN);

impl Scalar for Oid {
    const NIL: Self = OID_NIL;

    fn is_nil(&self) -> bool {
        *self == OID_NIL
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self.is_nil(), other.is_nil()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.cmp(other),
        }
    }

    fn hash64(&self) -> u64 {
        rustc_hash_stub(*self)
    }
}

/// Float nil is the canonical NaN bit pattern (MonetDB convention); all
/// other NaN patterns never arise from engine-produced values.
macro_rules! impl_scalar_float {
    ($ty:ty, $bits:ty, $nil_bits:expr) => {
        impl Scalar for $ty {
            const NIL: Self = <$ty>::NAN;

            fn is_nil(&self) -> bool {
                self.is_nan()
            }

            fn compare(&self, other: &Self) -> Ordering {
                match (self.is_nil(), other.is_nil()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.partial_cmp(other).unwrap_or(Ordering::Equal),
                }
            }

            fn hash64(&self) -> u64 {
                if self.is_nil() {
                    return rustc_hash_stub($nil_bits as u64);
                }
                let bits: $bits = self.to_bits();
                rustc_hash_stub(bits as u64)
            }
        }
    };
}

impl_scalar_float!(f32, u32, u32::MAX);
impl_scalar_float!(f64, u64, u64::MAX);

/// A single value read out of a column by position, used wherever code must
/// stay generic across the closed set of storage tags (the property model,
/// the planner, semi/anti-join comparisons). The hot inner loops of
/// merge-join and theta-join instead stay monomorphized over [`Scalar`].
#[derive(Copy, Clone, Debug)]
pub enum ValueRef<'a> {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Oid(Oid),
    Str(&'a [u8]),
    Nil,
}

impl<'a> ValueRef<'a> {
    pub fn is_nil(&self) -> bool {
        matches!(self, ValueRef::Nil)
    }

    pub fn tag(&self) -> Option<StorageTag> {
        match self {
            ValueRef::I8(_) => Some(StorageTag::I8),
            ValueRef::I16(_) => Some(StorageTag::I16),
            ValueRef::I32(_) => Some(StorageTag::I32),
            ValueRef::I64(_) => Some(StorageTag::I64),
            ValueRef::F32(_) => Some(StorageTag::F32),
            ValueRef::F64(_) => Some(StorageTag::F64),
            ValueRef::Oid(_) => Some(StorageTag::Oid),
            ValueRef::Str(_) => Some(StorageTag::Str),
            ValueRef::Nil => None,
        }
    }

    /// Three-way compare. Nils sort last, consistent with [`Scalar::compare`].
    /// Comparing across incompatible tags is a caller bug (the planner must
    /// type-check before calling); it panics rather than silently misjoining.
    pub fn compare(&self, other: &Self) -> Ordering {
        use ValueRef::*;
        match (self, other) {
            (Nil, Nil) => Ordering::Equal,
            (Nil, _) => Ordering::Greater,
            (_, Nil) => Ordering::Less,
            (I8(a), I8(b)) => a.compare(b),
            (I16(a), I16(b)) => a.compare(b),
            (I32(a), I32(b)) => a.compare(b),
            (I64(a), I64(b)) => a.compare(b),
            (F32(a), F32(b)) => a.compare(b),
            (F64(a), F64(b)) => a.compare(b),
            (Oid(a), Oid(b)) => a.compare(b),
            (Str(a), Str(b)) => a.cmp(b),
            _ => panic!("comparing values of incompatible storage tags"),
        }
    }

    pub fn equals(&self, other: &Self) -> bool {
        !self.is_nil() && !other.is_nil() && self.compare(other) == Ordering::Equal
    }

    pub fn hash64(&self) -> u64 {
        use ValueRef::*;
        match self {
            Nil => 0,
            I8(v) => v.hash64(),
            I16(v) => v.hash64(),
            I32(v) => v.hash64(),
            I64(v) => v.hash64(),
            F32(v) => v.hash64(),
            F64(v) => v.hash64(),
            Oid(v) => v.hash64(),
            Str(bytes) => {
                let mut h = std::collections::hash_map::DefaultHasher::new();
                bytes.hash(&mut h);
                h.finish()
            }
        }
    }
}

impl<'a> PartialEq for ValueRef<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}
