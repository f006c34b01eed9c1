// ─── Registry Parameters ─────────────────────────────────────────────────────

/// Initial slot count for a token registry. Mail-folder stores routinely
/// hold thousands of live row tokens.
pub const NODE_MAP_START_SLOTS: usize = 512;

/// Smallest slot count an integer map will be created with.
pub const INT_MAP_MIN_SLOTS: usize = 3;

// ─── Yarn Parameters ─────────────────────────────────────────────────────────

/// Default capacity for yarns handed out by a store.
pub const YARN_DEFAULT_CAPACITY: usize = 64;

/// Smallest capacity a growing yarn will reallocate to.
pub const YARN_MIN_GROWTH: usize = 16;
