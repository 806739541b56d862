//! ID generation utilities for critiq
//!
//! Provides identifiers for candidate lineages.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique lineage ID
///
/// Format: `lin-{timestamp_ms}-{random_hex}`
/// Example: `lin-1738300800123-a1b2`
pub fn generate_lineage_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("lin-{}-{:04x}", timestamp, random)
}
