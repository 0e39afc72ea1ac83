// Constants module - centralized default values for configuration
//
// Defaults used by the config layer and the generation core live here so
// the numbers are visible in one place.

// =============================================================================
// Content store defaults
// =============================================================================

/// Default cache directory for stored generation results
pub const DEFAULT_CACHE_DIR: &str = "./data/cache";

/// Default content store capacity in megabytes
pub const DEFAULT_STORE_MAX_SIZE_MB: u64 = 512;

/// Default TTL for stored results in seconds (24 hours)
pub const DEFAULT_STORE_TTL_SECONDS: u64 = 24 * 3600;

/// Default timeout for a single store, asset or sink I/O operation
pub const DEFAULT_STORE_OPERATION_TIMEOUT_SECS: u64 = 10;

/// File name of the persisted store index
pub const STORE_INDEX_FILE: &str = "index.json";

/// Directory (under the cache dir) holding payload files
pub const STORE_ENTRIES_DIR: &str = "entries";

/// Version written into the persisted index snapshot
pub const STORE_INDEX_VERSION: u32 = 1;

// =============================================================================
// Job ledger defaults
// =============================================================================

/// How long a job stays in the ledger after submission (1 hour)
pub const DEFAULT_JOB_RETENTION_SECONDS: u64 = 3600;

/// Interval between background maintenance sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Shortest period accepted for the maintenance sweep
pub const MIN_SWEEP_INTERVAL_MILLIS: u64 = 100;

/// Progress checkpoints reported while a job moves through the pipeline
pub const PROGRESS_STARTED: u8 = 10;
pub const PROGRESS_VALIDATED: u8 = 20;
pub const PROGRESS_CACHE_MISS: u8 = 30;
pub const PROGRESS_ASSETS_LOADED: u8 = 40;
pub const PROGRESS_RENDERED: u8 = 70;
pub const PROGRESS_CONVERTED: u8 = 90;
pub const PROGRESS_DONE: u8 = 100;

// =============================================================================
// Renderer defaults
// =============================================================================

/// Default directory holding template files and their assets
pub const DEFAULT_TEMPLATES_DIR: &str = "./templates";

/// Default directory generated documents are written to
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Default headless browser executable
pub const DEFAULT_CHROMIUM_PATH: &str = "chromium";

/// Default timeout for render and convert calls in seconds
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;

/// Default locale handed to the template renderer
pub const DEFAULT_LOCALE: &str = "en-US";

// =============================================================================
// Fingerprint
// =============================================================================

/// Number of hex characters of the SHA-256 digest kept in a fingerprint
pub const FINGERPRINT_DIGEST_LEN: usize = 32;

/// Maximum nesting depth accepted by canonicalization
pub const MAX_CANONICAL_DEPTH: usize = 128;
