//! Constants used throughout the PAS core crate.

/// Collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "hl7_dict";

/// Default directory for the document store when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "pas_data";

/// Prefix of issued clinical identifiers when none is configured.
pub const DEFAULT_IDENTIFIER_PREFIX: &str = "SYN";

/// Largest serialised patient document accepted for writing, in bytes.
pub const DEFAULT_DOCUMENT_SIZE_LIMIT: usize = 1_000_000;

/// Version written to `schema_version` in every stored document.
pub const SCHEMA_VERSION: u32 = 2;

/// Attempts at allocating a unique identifier before giving up.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 3;

/// Record id used when the store holds no hex ids yet.
pub const NIL_RECORD_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Prefix of minted placer order numbers.
pub const PLACER_ORDER_PREFIX: &str = "PL-";

/// Prefix of minted filler order numbers.
pub const FILLER_ORDER_PREFIX: &str = "FL-";

/// Ages drawn from when lab orders are produced with forced ages.
pub const ASSIGNABLE_AGES: (u32, u32) = (1, 100);

/// The single test requested by produced OML^O21 messages.
pub const LAB_ORDER_TEST: &str = "Liver Function Test";

/// Category of produced lab orders.
pub const LAB_ORDER_CATEGORY: &str = "laboratory";

/// Status of produced lab orders.
pub const LAB_ORDER_STATUS: &str = "SC";
