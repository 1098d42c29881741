//! Core model types shared by aggregates, stores, and services.

mod command;
mod event;

pub use command::{Command, CommandModel};
pub use event::{Event, EventModel};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, tenant-scoped aggregate identifier.
///
/// Entity ids are client-supplied. Association ids are derived from the
/// edge's endpoints and type (`{in}:{atype}:{out}`), which makes association
/// creation deterministic and idempotent.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Id(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Id(id.to_string())
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Id(id)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Incremental version of an aggregate. The first event of an aggregate has
/// version 1; the version of an aggregate equals the version of its most
/// recent event.
pub type Version = i32;

/// Free-form payload attached to an entity or association. Round-trippable
/// through JSON.
pub type Data = serde_json::Map<String, serde_json::Value>;
