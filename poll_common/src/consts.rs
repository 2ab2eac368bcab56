//! Acquisition-wide constants for the poll workspace.
//!
//! Single source of truth for numeric limits and defaults shared by the
//! spill builder, output sink and broadcaster.

use static_assertions::const_assert;

/// Size of one FIFO word in bytes.
pub const WORD_BYTES: usize = 4;

/// Words injected in front of every module segment: `(segment_length, module)`.
pub const SEGMENT_HEADER_WORDS: usize = 2;

/// Number of FIFO word-count polls before giving up on reaching the threshold.
pub const POLL_TRIES: u32 = 100;

/// Default drain threshold as a percentage of the FIFO capacity.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 50.0;

/// Maximum size of a single output file in bytes (2 GiB).
pub const MAX_FILE_SIZE: u64 = 2_147_483_648;

/// Bytes kept free at the end of every file for end-of-file buffers.
///
/// Two EOF buffers of 8194 words at 4 bytes per word.
pub const RESERVED_TRAILER_BYTES: u64 = 8194 * 4 * 2;

/// Maximum number of words carried by one shared-memory broadcast chunk.
pub const MAX_CHUNK_WORDS: usize = 4050;

/// Words prefixed to every broadcast chunk: `(chunk_index, total_chunks)`.
pub const CHUNK_HEADER_WORDS: usize = 2;

/// Words of raw frame data kept per diagnostic preview.
pub const DIAGNOSTIC_PREVIEW_WORDS: usize = 50;

/// Default destination of spill broadcasts.
pub const DEFAULT_BROADCAST_ADDR: &str = "127.0.0.1:5555";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "poll.toml";

// A full chunk must fit into one UDP datagram.
const_assert!((MAX_CHUNK_WORDS + CHUNK_HEADER_WORDS) * WORD_BYTES <= 65_507);
const_assert!(RESERVED_TRAILER_BYTES < MAX_FILE_SIZE);
