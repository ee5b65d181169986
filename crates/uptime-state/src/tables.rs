//! redb table definitions for the uptime record store.

use redb::TableDefinition;

/// Every record, keyed by `{collection}/{id}`, value is the JSON-serialized record.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
