//! Command contract.

use serde::{Deserialize, Serialize};

use super::Id;

/// A request to mutate an aggregate. Commands address their aggregate by
/// `(id, tenant id)`; the repository rejects commands with either missing.
pub trait Command {
    /// The id of the aggregate this command addresses.
    fn command_id(&self) -> &Id;

    /// The tenant that owns the aggregate.
    fn command_tenant_id(&self) -> &Id;
}

/// Embeddable base for command types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandModel {
    /// Aggregate id.
    #[serde(default)]
    pub id: Id,

    /// Owner of the aggregate.
    #[serde(default)]
    pub tenant_id: Id,
}

impl CommandModel {
    pub fn new(id: impl Into<Id>, tenant_id: impl Into<Id>) -> Self {
        CommandModel {
            id: id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

impl Command for CommandModel {
    fn command_id(&self) -> &Id {
        &self.id
    }

    fn command_tenant_id(&self) -> &Id {
        &self.tenant_id
    }
}
