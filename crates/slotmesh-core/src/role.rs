//! Node roles
//!
//! Roles are deployment data, not program logic: a node is a relay because
//! its address is listed in the relay set, not because of a compiled-in
//! constant.
//! - Relay: re-transmits data it did not originate
//! - Sink: terminal consumer of data, never originates
//! - Ordinary: originates data, consumes what it hears

use std::collections::BTreeSet;

use crate::{ConfigError, NodeId};

/// Role derived from the role assignment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum NodeRole {
    #[default]
    Ordinary,
    Relay,
    Sink,
}

impl NodeRole {
    /// Does this role sample sensors and originate data records?
    pub fn originates(self) -> bool {
        !matches!(self, NodeRole::Sink)
    }

    /// Does this role forward data it did not originate?
    pub fn forwards(self) -> bool {
        matches!(self, NodeRole::Relay)
    }
}

/// Relay and sink membership for a deployment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleAssignment {
    relays: BTreeSet<NodeId>,
    sinks: BTreeSet<NodeId>,
}

impl RoleAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relays(mut self, relays: impl IntoIterator<Item = NodeId>) -> Self {
        self.relays.extend(relays);
        self
    }

    pub fn with_sinks(mut self, sinks: impl IntoIterator<Item = NodeId>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    pub fn is_relay(&self, id: NodeId) -> bool {
        self.relays.contains(&id)
    }

    pub fn is_sink(&self, id: NodeId) -> bool {
        self.sinks.contains(&id)
    }

    pub fn relays(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.relays.iter().copied()
    }

    /// Derive the role of `id`
    pub fn role_of(&self, id: NodeId) -> Result<NodeRole, ConfigError> {
        match (self.is_relay(id), self.is_sink(id)) {
            (true, true) => Err(ConfigError::ConflictingRole(id)),
            (true, false) => Ok(NodeRole::Relay),
            (false, true) => Ok(NodeRole::Sink),
            (false, false) => Ok(NodeRole::Ordinary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_derivation() {
        let roles = RoleAssignment::new()
            .with_relays([15, 33, 28].map(NodeId::new))
            .with_sinks([NodeId::new(1)]);

        assert_eq!(roles.role_of(NodeId::new(33)), Ok(NodeRole::Relay));
        assert_eq!(roles.role_of(NodeId::new(1)), Ok(NodeRole::Sink));
        assert_eq!(roles.role_of(NodeId::new(4)), Ok(NodeRole::Ordinary));
    }

    #[test]
    fn test_conflicting_role() {
        let roles = RoleAssignment::new()
            .with_relays([NodeId::new(2)])
            .with_sinks([NodeId::new(2)]);
        assert_eq!(
            roles.role_of(NodeId::new(2)),
            Err(ConfigError::ConflictingRole(NodeId::new(2)))
        );
    }

    #[test]
    fn test_role_behaviour() {
        assert!(NodeRole::Relay.forwards());
        assert!(NodeRole::Relay.originates());
        assert!(!NodeRole::Sink.originates());
        assert!(!NodeRole::Ordinary.forwards());
    }
}
