//! Opaque string identifiers.
//!
//! Tenants, sessions, users and catalog products are identified by strings the
//! platform hands us. Their structure is never interpreted here; the only rule
//! is that an identifier cannot be blank.

use std::{
    borrow::Borrow,
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use thiserror::Error;

/// Raised when an identifier is empty or whitespace only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} id cannot be blank")]
pub struct BlankIdError {
    /// Identifier kind, e.g. `"tenant"`.
    pub kind: &'static str,
}

/// Identifier kind marker.
pub trait IdKind {
    /// Human-readable name used in error messages.
    const NAME: &'static str;
}

/// A non-blank opaque identifier tagged with its kind.
pub struct OpaqueId<K>(String, PhantomData<fn() -> K>);

impl<K: IdKind> OpaqueId<K> {
    /// Validate and wrap an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BlankIdError`] when `value` is empty or whitespace only.
    pub fn parse(value: impl Into<String>) -> Result<Self, BlankIdError> {
        let value = value.into();

        if value.trim().is_empty() {
            return Err(BlankIdError { kind: K::NAME });
        }

        Ok(Self(value, PhantomData))
    }
}

impl<K> OpaqueId<K> {
    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the raw identifier.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl<K> Clone for OpaqueId<K> {
    fn clone(&self) -> Self {
        Self(self.0.clone(), PhantomData)
    }
}

impl<K> Debug for OpaqueId<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<K> Display for OpaqueId<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl<K> PartialEq for OpaqueId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K> Eq for OpaqueId<K> {}

impl<K> Hash for OpaqueId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<K> PartialOrd for OpaqueId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for OpaqueId<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<K> AsRef<str> for OpaqueId<K> {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<K> Borrow<str> for OpaqueId<K> {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<K: IdKind> TryFrom<&str> for OpaqueId<K> {
    type Error = BlankIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<K: IdKind> TryFrom<String> for OpaqueId<K> {
    type Error = BlankIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl<K> Serialize for OpaqueId<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de, K: IdKind> Deserialize<'de> for OpaqueId<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        Self::parse(raw).map_err(D::Error::custom)
    }
}

/// Shopping session marker.
#[derive(Debug)]
pub enum Session {}

impl IdKind for Session {
    const NAME: &'static str = "session";
}

/// Browser/session correlation key.
pub type SessionId = OpaqueId<Session>;

/// Platform user marker.
#[derive(Debug)]
pub enum User {}

impl IdKind for User {
    const NAME: &'static str = "user";
}

/// Signed-in shopper identifier.
pub type UserId = OpaqueId<User>;

/// Catalog product marker.
#[derive(Debug)]
pub enum Product {}

impl IdKind for Product {
    const NAME: &'static str = "product";
}

/// Catalog product identifier.
pub type ProductId = OpaqueId<Product>;
