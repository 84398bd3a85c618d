//! Correlation id generation

use uuid::Uuid;

/// Source of per-message unique identifiers
///
/// Every call must return an id that is unique across the bus; downstream
/// consumers use it to correlate requests and acknowledgements.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random UUID v4 ids in hyphenated form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
