//! Hard limits applied at the engine and tenant boundaries.

pub const MAX_UNITS_PER_TENANT: usize = 100_000;
pub const MAX_REQUESTERS_PER_TENANT: usize = 1_000_000;
pub const MAX_RESERVATIONS_PER_UNIT: usize = 50_000;

/// Unit, owner and requester ids.
pub const MAX_ID_LEN: usize = 256;

/// Longest single stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 731;

pub const MIN_VALID_YEAR: i32 = 1970;
pub const MAX_VALID_YEAR: i32 = 9999;

pub const MAX_TENANTS: usize = 1_024;
pub const MAX_TENANT_NAME_LEN: usize = 256;
