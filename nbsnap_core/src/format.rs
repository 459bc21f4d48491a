/// Magic bytes opening every NBSNAP1 frame header.
/// 8 single-byte words, unaffected by byte swapping.
pub const MAGIC: &[u8; 8] = b"NBSNAP1\n";

/// Format version stored in each frame header.
pub const FORMAT_VERSION: u32 = 1;

/// Fixed size of a frame header in bytes.
///   magic[8] + version:u32 + mask:u32 + nbody:u64 + time:f64
///   + body_len:u64 + checksum:u64 + reserved[8]
///   = 8 + 4 + 4 + 8 + 8 + 8 + 8 + 8 = 56
pub const HEADER_SIZE: usize = 56;

/// Element size of every per-particle word in the body (f32 / i32).
pub const BODY_WORD_SIZE: usize = 4;
