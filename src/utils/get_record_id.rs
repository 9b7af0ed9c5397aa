use surrealdb::RecordId;

pub fn record_id(table: &str, key: &str) -> RecordId {
    RecordId::from_table_key(table, key.trim())
}

pub fn record_ids(table: &str, keys: &[String]) -> Vec<RecordId> {
    keys.iter().map(|key| record_id(table, key)).collect()
}
