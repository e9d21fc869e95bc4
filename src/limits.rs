/// Longest accepted reservation name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Upper bound on a single slot's capacity.
pub const MAX_SLOT_CAPACITY: u32 = 10_000;

/// Most times accepted by one seed request.
pub const MAX_SEED_TIMES: usize = 96;

/// Most live reservations held by one store.
pub const MAX_RESERVATIONS: usize = 1_000_000;
