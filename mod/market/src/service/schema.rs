use agrimart_core::ServiceError;
use sql::SQLStore;

/// SQL DDL statements to initialize the marketplace database schema.
///
/// Each table stores the full JSON document in a `data` TEXT column,
/// with indexed columns extracted for efficient filtering, sorting,
/// and uniqueness.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS listings (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        name TEXT,
        category TEXT,
        quantity INTEGER,
        price REAL,
        location TEXT,
        delivery_option TEXT,
        is_active INTEGER,
        created_at TEXT,
        updated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS equipment (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        tool_name TEXT UNIQUE,
        category TEXT,
        rental_price_per_hour REAL,
        available_from TEXT,
        available_to TEXT,
        pickup_option TEXT,
        created_at TEXT,
        updated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS reservations (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        user_id TEXT,
        item_id TEXT,
        item_type TEXT,
        status TEXT,
        created_at TEXT,
        updated_at TEXT
    )",
    // Indexes
    "CREATE INDEX IF NOT EXISTS idx_listing_category ON listings(category)",
    "CREATE INDEX IF NOT EXISTS idx_listing_active ON listings(is_active)",
    "CREATE INDEX IF NOT EXISTS idx_listing_price ON listings(price)",
    "CREATE INDEX IF NOT EXISTS idx_equip_category ON equipment(category)",
    "CREATE INDEX IF NOT EXISTS idx_res_user ON reservations(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_res_status ON reservations(status)",
];

pub fn init_schema(sql: &dyn SQLStore) -> Result<(), ServiceError> {
    for stmt in SCHEMA {
        sql.exec(stmt, &[])
            .map_err(|e| ServiceError::Storage(format!("schema init failed: {}", e)))?;
    }
    Ok(())
}
