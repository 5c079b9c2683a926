// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed identifiers.
//!
//! An [`Id<T>`] is a [`Uuid`] tagged at compile time with the type it identifies, so that an
//! allocation id can never be handed to something expecting a run id.
//!
//! Control-plane objects are frequently re-planned from cold state after a crash.  For that reason
//! the only constructor is [`Id::derive`], which produces the same value every time it is handed
//! the same key.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use core::fmt::{Debug, Formatter};
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use uuid::Uuid;

/// An abstract, typed ID.
///
/// ```
/// # use orbit_id::Id;
/// struct Allocation;
/// struct Pool;
///
/// let a = Id::<Allocation>::derive("tags/sector/web/tag");
/// let b = Id::<Allocation>::derive("tags/sector/web/tag");
/// assert_eq!(a, b);
/// ```
///
/// Ids of different types do not mix:
///
/// ```rust,compile_fail
/// # use orbit_id::Id;
/// # struct Allocation;
/// # struct Pool;
/// fn conflate(mut allocation: Id<Allocation>, pool: Id<Pool>) {
///     allocation = pool;
/// }
/// ```
#[repr(transparent)]
pub struct Id<T: ?Sized>(Uuid, PhantomData<T>);

impl<T: ?Sized> Copy for Id<T> {}

impl<T: ?Sized> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: ?Sized> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: ?Sized> Eq for Id<T> {}

impl<T: ?Sized> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Display>::fmt(&self.0, f)
    }
}

impl<T: ?Sized> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <_ as Debug>::fmt(&self.0, f)
    }
}

impl<T: ?Sized> Id<T> {
    /// Namespace used for every [UUIDv5] produced by [`Id::derive`].
    ///
    /// Changing this value changes every derived id and therefore orphans every persisted
    /// allocation record.
    ///
    /// [UUIDv5]: https://datatracker.ietf.org/doc/html/rfc9562#section-5.5
    pub const NAMESPACE_UUID: Uuid = Uuid::from_u128(0x5f0c_1d2a_7e3b_4c49_9a1e_b40f_cc27_81d3);

    /// Derive an id from a stable key.
    ///
    /// The result only depends on `key`; the same key always yields the same id.
    #[must_use]
    pub fn derive(key: impl AsRef<str>) -> Self {
        Self(
            Uuid::new_v5(&Self::NAMESPACE_UUID, key.as_ref().as_bytes()),
            PhantomData,
        )
    }

    /// Strip type safety and return the wrapped (untyped) [`Uuid`].
    #[must_use]
    pub const fn into_raw(self) -> Uuid {
        self.0
    }

    /// Tag a [`Uuid`] read back from storage with its type.
    ///
    /// Only use this where the type of the identified object is conclusively known from context
    /// (e.g. the `id` field of a persisted allocation record).
    #[must_use]
    pub const fn from_raw(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }
}

#[cfg(feature = "serde")]
mod serialization {
    use crate::Id;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    impl<T: ?Sized> Serialize for Id<T> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(&self.0)
        }
    }

    impl<'de, T: ?Sized> Deserialize<'de> for Id<T> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let raw = String::deserialize(deserializer)?;
            Uuid::parse_str(&raw)
                .map(Id::from_raw)
                .map_err(serde::de::Error::custom)
        }
    }
}
