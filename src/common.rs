//! Small shared types: actor identity, the `Argument` string marker, and the
//! `Handle`/`OptionalHandle` cross-reference wrappers used everywhere a
//! 16-bit list index stands in for a logical (non-owning) reference.

use std::marker::PhantomData;

use crate::error::Result;
use crate::stream::{BinaryRead, BinaryWrite, ReadStream, WriteStream};

pub const NONE_INDEX: u16 = 0xffff;

/// A `(name, sub_name)` pair identifying an actor. Equality and hashing are
/// defined by the pair, matching the reference implementation's
/// `ActorIdentifier.__hash__`/`__eq__`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ActorIdentifier {
    pub name: String,
    pub sub_name: String,
}

impl ActorIdentifier {
    pub fn new(name: impl Into<String>, sub_name: impl Into<String>) -> Self {
        ActorIdentifier {
            name: name.into(),
            sub_name: sub_name.into(),
        }
    }
}

impl std::fmt::Display for ActorIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.sub_name.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.sub_name)
        }
    }
}

impl BinaryRead for ActorIdentifier {
    fn read_from(stream: &mut ReadStream) -> Result<Self> {
        let name = stream.read_string_ref()?;
        let sub_name = stream.read_string_ref()?;
        Ok(ActorIdentifier { name, sub_name })
    }
}

impl BinaryWrite for ActorIdentifier {
    fn write_to(&self, stream: &mut WriteStream) -> Result<()> {
        stream.write_string_ref(&self.name, false);
        stream.write_string_ref(&self.sub_name, false);
        Ok(())
    }
}

/// A string that, when it appears as a container value, is tagged with the
/// `kArgument` container type instead of `kString`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Argument(pub String);

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Argument(s.to_string())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Argument(s)
    }
}

impl std::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A required logical reference to a `T`, resolved by list position. On
/// disk this is a 16-bit index; in memory it additionally caches the
/// position once resolved, so repeated `.index()` calls after
/// [`Handle::set_index`] don't need to re-run a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle<T> {
    idx: u16,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn from_index(idx: u16) -> Self {
        Handle {
            idx,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u16 {
        self.idx
    }

    pub fn set_index(&mut self, idx: u16) {
        self.idx = idx;
    }

    /// Validates this handle against the length of its owning arena,
    /// returning the index as `usize` for indexing. This is the write-time
    /// "resolve reference to index" step of spec.md §4.7: by the time a
    /// `Handle` reaches the writer it already holds a numeric index (set
    /// either by the reader or by the caller building a graph from
    /// scratch, typically via `IndexMap::get_index_of` on the owning
    /// arena); all that's left to check is that the index is in bounds.
    pub fn resolve(&self, len: usize, what: &str) -> Result<usize> {
        let idx = self.idx as usize;
        if idx >= len {
            return Err(crate::error::Error::Unresolved(format!(
                "{what}: index {idx} out of bounds (len {len})"
            )));
        }
        Ok(idx)
    }
}

impl<T> serde::Serialize for Handle<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.idx)
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Handle {
            idx: NONE_INDEX,
            _marker: PhantomData,
        }
    }
}

/// An optional logical reference to a `T`; `0xffff` means "none".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionalHandle<T> {
    idx: u16,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OptionalHandle<T> {
    pub fn from_index(idx: u16) -> Self {
        OptionalHandle {
            idx,
            _marker: PhantomData,
        }
    }

    pub fn none() -> Self {
        Self::from_index(NONE_INDEX)
    }

    pub fn is_some(&self) -> bool {
        self.idx != NONE_INDEX
    }

    pub fn index(&self) -> Option<u16> {
        (self.idx != NONE_INDEX).then_some(self.idx)
    }

    pub fn set_index(&mut self, idx: Option<u16>) {
        self.idx = idx.unwrap_or(NONE_INDEX);
    }
}

impl<T> serde::Serialize for OptionalHandle<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.index() {
            Some(idx) => serializer.serialize_u16(idx),
            None => serializer.serialize_none(),
        }
    }
}

impl<T> Default for OptionalHandle<T> {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_identifier_equality_ignores_derived_fields() {
        let a = ActorIdentifier::new("Player", "");
        let b = ActorIdentifier::new("Player", "");
        assert_eq!(a, b);
        let c = ActorIdentifier::new("Player", "Sub");
        assert_ne!(a, c);
    }

    #[test]
    fn optional_handle_none_round_trips() {
        let h: OptionalHandle<u8> = OptionalHandle::none();
        assert!(!h.is_some());
        assert_eq!(h.index(), None);
    }
}
