//! Key layout shared by every process that touches an event's inventory.

const INVENTORY_KEY_PREFIX: &str = "event_inventory:";
const LOCK_KEY_PREFIX: &str = "book_event_";

/// Counter key holding the live available-ticket count of one event.
pub fn inventory_key(event_id: i64) -> String {
    format!("{INVENTORY_KEY_PREFIX}{event_id}")
}

/// Lock key serializing reservations for one event.
pub fn lock_key(event_id: i64) -> String {
    format!("{LOCK_KEY_PREFIX}{event_id}")
}
