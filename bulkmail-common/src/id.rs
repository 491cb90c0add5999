//! Identifiers for batches, send attempts and users.
//!
//! Batch and attempt identifiers are ULIDs: globally unique and
//! lexicographically sortable by creation time, which keeps listings of the
//! log store in submission order without a secondary index.

use std::{
    fmt,
    str::FromStr,
    sync::{LazyLock, Mutex},
};

use serde::{Deserialize, Serialize};

static GENERATOR: LazyLock<Mutex<ulid::Generator>> =
    LazyLock::new(|| Mutex::new(ulid::Generator::new()));

/// Identifiers generated in this process are strictly increasing, even
/// within one millisecond.
fn monotonic_ulid() -> ulid::Ulid {
    GENERATOR
        .lock()
        .ok()
        .and_then(|mut generator| generator.generate().ok())
        .unwrap_or_else(ulid::Ulid::new)
}

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            id: ulid::Ulid,
        }

        impl $name {
            /// Generate a new unique identifier
            #[must_use]
            pub fn generate() -> Self {
                Self { id: monotonic_ulid() }
            }

            #[must_use]
            pub const fn new(id: ulid::Ulid) -> Self {
                Self { id }
            }

            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.id
            }

            /// Milliseconds since the Unix epoch encoded in the identifier
            #[must_use]
            pub const fn timestamp_ms(&self) -> u64 {
                self.id.timestamp_ms()
            }

            /// Parse a `{ulid}.bin` filename, rejecting anything that could
            /// escape the directory it was listed from.
            #[must_use]
            pub fn from_filename(filename: &str) -> Option<Self> {
                if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
                    return None;
                }

                let stem = filename.strip_suffix(".bin")?;
                ulid::Ulid::from_string(stem).ok().map(Self::new)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s).map(Self::new)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                ulid::Ulid::from_string(&s)
                    .map(Self::new)
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

ulid_id!(
    /// Identifies one submitted composition
    BatchId
);

ulid_id!(
    /// Identifies one durable send-attempt row
    AttemptId
);

/// Opaque identity of the submitting user, as established by the
/// authentication layer in front of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
