//! Type-safe identifier wrappers.
//!
//! Content-authored identifiers (features, missions, game slugs) are opaque
//! strings chosen by the authoring tool, so every wrapper here is a string
//! newtype. Wrapping them prevents passing a mission id where a feature id
//! is expected. Only [`DropId`] is ever generated on the client, and then
//! with a `local-` prefix and a `UUIDv7` body so it can never collide with a
//! server-assigned id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by drop ids synthesized on the client.
pub const LOCAL_DROP_PREFIX: &str = "local-";

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw string identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key! {
    /// Identifier of a game; scopes every backpack and drop-log record.
    Slug
}

define_key! {
    /// Identifier of a geofence feature in the content bundle.
    FeatureId
}

define_key! {
    /// Identifier of a mission (question) a player can answer.
    MissionId
}

define_key! {
    /// Identifier of a drop-log entry.
    ///
    /// Server-assigned ids are opaque. Client-synthesized ids start with
    /// [`LOCAL_DROP_PREFIX`].
    DropId
}

impl DropId {
    /// Generate a client-side drop id (`local-<uuid v7>`).
    pub fn local() -> Self {
        Self(format!("{LOCAL_DROP_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this id was synthesized on the client.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_DROP_PREFIX)
    }
}

/// Generate an id for a pocket item that arrived without one.
pub fn generate_item_id() -> String {
    Uuid::now_v7().to_string()
}
