use redb::TableDefinition;

/// Access codes: code -> StoredCode (msgpack)
pub const ACCESS_CODES: TableDefinition<&str, &[u8]> = TableDefinition::new("access_codes");

/// Creation index: (created, seq) -> code
pub const CODES_BY_CREATED: TableDefinition<(i64, u64), &str> =
    TableDefinition::new("access_codes_by_created");

/// Expiration index: (expires, seq) -> code
pub const CODES_BY_EXPIRY: TableDefinition<(i64, u64), &str> =
    TableDefinition::new("access_codes_by_expiry");

/// Store metadata: "next_seq" -> u64
pub const STORE_META: TableDefinition<&str, u64> = TableDefinition::new("store_meta");
