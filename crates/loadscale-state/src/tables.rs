//! redb table definitions for the loadscale state store.

use redb::TableDefinition;

/// Scaling policies keyed by policy id.
pub const POLICIES: TableDefinition<u64, &[u8]> = TableDefinition::new("policies");

/// Scaling events keyed by `{policy_id:020}:{event_id:020}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("scaling_events");

/// Monotonic id sequences keyed by sequence name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

pub const POLICY_SEQ: &str = "policy";
pub const EVENT_SEQ: &str = "event";
