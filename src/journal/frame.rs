//! On-disk layout of segment headers and entry frames.
//!
//! # Segment Header (64 bytes, little-endian)
//!
//! ```text
//! [4 bytes: magic "SJNL"][2 bytes: version][2 bytes: reserved]
//! [8 bytes: segment id][8 bytes: base index][8 bytes: capacity]
//! [28 bytes: reserved][4 bytes: CRC32 of bytes 0..60]
//! ```
//!
//! # Entry Frame
//!
//! ```text
//! [4 bytes: frame length][4 bytes: CRC32 of payload][N bytes: payload]
//! ```
//!
//! The length word counts the whole frame, header included, so it is never
//! zero even for an empty payload. Frames carry no index: the index of a
//! frame is the segment's base index plus its ordinal position. A zero
//! length word marks the end of the written region, which is why the writer
//! zeroes the word that follows every frame it writes or truncates back to.

use super::error::JournalError;
use crate::utils::{read_u16_le, read_u32_le, read_u64_le};
use std::path::Path;

/// Size of the fixed segment header in bytes.
pub const SEGMENT_HEADER_SIZE: usize = 64;

/// Size of the per-frame header (`length` + `checksum`) in bytes.
pub const FRAME_HEADER_SIZE: usize = 4 + 4;

/// Size of the end-of-data marker written after the last frame.
pub const END_MARKER_SIZE: usize = 4;

/// Magic bytes opening every segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"SJNL";

/// Current segment format version.
pub const SEGMENT_VERSION: u16 = 1;

const HEADER_CRC_OFFSET: usize = SEGMENT_HEADER_SIZE - 4;

/// Compute the checksum stored alongside a payload.
#[must_use]
#[inline]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Total on-disk size of a frame carrying `payload_len` bytes.
///
/// Returns `None` when the frame cannot be described by a 32-bit length.
#[must_use]
#[inline]
pub fn frame_len(payload_len: usize) -> Option<usize> {
    let len = payload_len.checked_add(FRAME_HEADER_SIZE)?;
    u32::try_from(len).ok()?;
    Some(len)
}

/// Decoded segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Ordinal of the segment within its directory.
    pub id: u64,
    /// Index of the first entry the segment holds (or will hold).
    pub base_index: u64,
    /// Size of the segment file in bytes, header included.
    pub capacity: u64,
}

impl SegmentHeader {
    /// Serialize the header into its fixed 64-byte form.
    #[must_use]
    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut buf = [0u8; SEGMENT_HEADER_SIZE];
        buf[0..4].copy_from_slice(&SEGMENT_MAGIC);
        buf[4..6].copy_from_slice(&SEGMENT_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.base_index.to_le_bytes());
        buf[24..32].copy_from_slice(&self.capacity.to_le_bytes());
        let crc = crc32fast::hash(&buf[..HEADER_CRC_OFFSET]);
        buf[HEADER_CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse and validate a header read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::CorruptSegment`] when the data is too short,
    /// the magic or version is wrong, or the header checksum does not match.
    pub fn decode(data: &[u8], path: &Path) -> Result<Self, JournalError> {
        let corrupt = |message: &str| JournalError::CorruptSegment {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        if data.len() < SEGMENT_HEADER_SIZE {
            return Err(corrupt("file shorter than segment header"));
        }
        if data[0..4] != SEGMENT_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = read_u16_le(data, 4).ok_or_else(|| corrupt("truncated version"))?;
        if version != SEGMENT_VERSION {
            return Err(corrupt(&format!("unsupported segment version {version}")));
        }
        let stored_crc =
            read_u32_le(data, HEADER_CRC_OFFSET).ok_or_else(|| corrupt("truncated header CRC"))?;
        if crc32fast::hash(&data[..HEADER_CRC_OFFSET]) != stored_crc {
            return Err(corrupt("header checksum mismatch"));
        }

        let id = read_u64_le(data, 8).ok_or_else(|| corrupt("truncated id"))?;
        let base_index = read_u64_le(data, 16).ok_or_else(|| corrupt("truncated base index"))?;
        let capacity = read_u64_le(data, 24).ok_or_else(|| corrupt("truncated capacity"))?;

        Ok(Self {
            id,
            base_index,
            capacity,
        })
    }
}

/// Result of decoding the frame that starts at a given offset.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameRead<'a> {
    /// A complete frame whose checksum matches its payload.
    Valid {
        /// The stored checksum.
        checksum: u32,
        /// The payload bytes.
        payload: &'a [u8],
        /// Offset of the byte following the frame.
        next_offset: usize,
    },
    /// A zero length word, or not enough room left for a frame header.
    End,
    /// The frame's length runs past the end of the data.
    Torn,
    /// The frame is complete but its checksum does not match.
    Corrupt {
        /// The stored checksum.
        stored: u32,
        /// The checksum computed from the payload.
        computed: u32,
        /// Offset of the byte following the frame.
        next_offset: usize,
    },
}

/// Write a frame for `payload` at the start of `dst`.
///
/// `dst` must be at least [`frame_len`]`(payload.len())` bytes long.
pub fn encode_frame_into(dst: &mut [u8], checksum: u32, payload: &[u8]) {
    let len = (FRAME_HEADER_SIZE + payload.len()) as u32;
    dst[0..4].copy_from_slice(&len.to_le_bytes());
    dst[4..8].copy_from_slice(&checksum.to_le_bytes());
    dst[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload.len()].copy_from_slice(payload);
}

/// Decode the frame starting at `offset`, reading no further than `limit`.
#[must_use]
pub fn read_frame(data: &[u8], offset: usize, limit: usize) -> FrameRead<'_> {
    let limit = limit.min(data.len());
    let Some(header_end) = offset.checked_add(FRAME_HEADER_SIZE) else {
        return FrameRead::End;
    };
    if header_end > limit {
        return FrameRead::End;
    }

    let Some(length) = read_u32_le(data, offset) else {
        return FrameRead::End;
    };
    if length == 0 {
        return FrameRead::End;
    }
    if (length as usize) < FRAME_HEADER_SIZE {
        return FrameRead::Torn;
    }
    let Some(stored) = read_u32_le(data, offset + 4) else {
        return FrameRead::End;
    };

    let next_offset = match offset.checked_add(length as usize) {
        Some(end) if end <= limit => end,
        _ => return FrameRead::Torn,
    };

    let payload = &data[header_end..next_offset];
    let computed = checksum(payload);
    if computed != stored {
        return FrameRead::Corrupt {
            stored,
            computed,
            next_offset,
        };
    }

    FrameRead::Valid {
        checksum: stored,
        payload,
        next_offset,
    }
}
