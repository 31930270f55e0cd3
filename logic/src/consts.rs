/// Node id width in bytes (SHA-256 output).
pub const ID_LEN: usize = 32;

/// Node id width in bits.
pub const ID_LEN_BITS: usize = ID_LEN * 8;
