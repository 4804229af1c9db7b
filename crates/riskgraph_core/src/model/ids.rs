//! Unique identifiers for graph entities
//!
//! Each entity type has its own ID type so node, port and edge identifiers
//! cannot be mixed up. Ids are strings because graphs round-trip through JSON
//! produced by other tools.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::new_v4().simple()))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a Graph
    GraphId,
    "graph"
);
string_id!(
    /// Unique identifier for a Node within a graph
    NodeId,
    "node"
);
string_id!(
    /// Unique identifier for a Port within a node
    PortId,
    "port"
);
string_id!(
    /// Unique identifier for an Edge within a graph
    EdgeId,
    "edge"
);
