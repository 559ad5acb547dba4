/// Maximum uncompressed batch payload the intake accepts, in bytes.
pub const MAX_BATCH_SIZE_BYTES: usize = 500 * 1_024;

/// Maximum size of one serialized record, in bytes. Larger records are
/// rejected at enqueue time.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 32 * 1_024;

/// Maximum records per batch.
pub const MAX_BATCH_ENTRIES_SIZE: usize = 100;

pub const BATCH_PATH: &str = "/v1/batch";
