//! Hard caps on administrator-supplied data and engine parameters.

/// Max length of a rule name in bytes.
pub const MAX_RULE_NAME_LEN: usize = 64;

/// Max length of a holiday name in bytes.
pub const MAX_HOLIDAY_NAME_LEN: usize = 128;

/// Max rules configured for a single category.
pub const MAX_RULES_PER_CATEGORY: usize = 256;

/// Slot step bounds in minutes.
pub const MIN_GRANULARITY_MINUTES: u16 = 1;
pub const MAX_GRANULARITY_MINUTES: u16 = 24 * 60;

/// Max length of a holiday region code.
pub const MAX_REGION_LEN: usize = 16;

/// Max holiday cache lifetime.
pub const MAX_HOLIDAY_CACHE_TTL_DAYS: u32 = 366;

/// Years the holiday calendar will resolve. Outside this range nothing is fetched.
pub const MIN_HOLIDAY_YEAR: i32 = 1900;
pub const MAX_HOLIDAY_YEAR: i32 = 2200;

/// Max encoded size of one log record. A larger length prefix on replay is corruption.
pub const MAX_EVENT_BYTES: usize = 1 << 20;
