//! The `__type__` discriminator carried by every wire payload.
//!
//! Each payload names its logical type in a `__type__` field. [`Tag`] is a
//! zero-sized field that always serializes to the owning type's name and
//! accepts any value (or none) when deserializing, so clients that omit or
//! misspell the discriminator are still understood.

use std::fmt;
use std::marker::PhantomData;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Name of the discriminator field.
pub const TYPE_FIELD: &str = "__type__";

/// A payload type with a stable wire name.
pub trait WireType {
    /// The value written into the `__type__` field.
    const TYPE_NAME: &'static str;
}

/// Discriminator field for payload `T`.
pub struct Tag<T>(PhantomData<fn() -> T>);

impl<T> Tag<T> {
    /// Creates the tag.
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: WireType> Tag<T> {
    /// Returns the wire name this tag serializes to.
    pub fn name(&self) -> &'static str {
        T::TYPE_NAME
    }
}

impl<T> Default for Tag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Tag<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Tag<T> {}

// Tags carry no data, so any two tags of the same payload are equal.
impl<T> PartialEq for Tag<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for Tag<T> {}

impl<T> std::hash::Hash for Tag<T> {
    fn hash<H: std::hash::Hasher>(&self, _state: &mut H) {}
}

impl<T: WireType> fmt::Debug for Tag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", T::TYPE_NAME)
    }
}

impl<T: WireType> Serialize for Tag<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(T::TYPE_NAME)
    }
}

impl<'de, T> Deserialize<'de> for Tag<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Self::new())
    }
}
