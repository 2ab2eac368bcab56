//! Event frame header layout.
//!
//! Every event frame in a module's list-mode stream starts with a header word:
//!
//! ```text
//!  31 30           17 16     8 7    4 3     0
//! ┌──┬───────────────┬────────┬──────┬───────┐
//! │  │  size (words) │        │ slot │  chan │
//! └──┴───────────────┴────────┴──────┴───────┘
//!          bit 29 = virtual channel flag
//! ```
//!
//! The virtual-channel flag is bit 29, which lies inside the size field. The
//! size is always taken from the full field, flag bit included.

use crate::Word;
use crate::consts::WORD_BYTES;

/// Mask of the slot field (bits 4–7).
pub const SLOT_MASK: Word = 0x0000_00F0;
/// Shift of the slot field.
pub const SLOT_SHIFT: u32 = 4;
/// Mask of the channel field (bits 0–3).
pub const CHANNEL_MASK: Word = 0x0000_000F;
/// Mask applied before shifting out the size field.
pub const SIZE_MASK: Word = 0x7FFE_2000;
/// Shift of the size field.
pub const SIZE_SHIFT: u32 = 17;
/// Virtual-channel flag bit.
pub const VIRTUAL_CHANNEL_BIT: Word = 0x2000_0000;
/// Largest size the 14-bit size field can express.
pub const MAX_FRAME_WORDS: u32 = 0x3FFF;
/// Highest valid channel number.
pub const MAX_CHANNEL: u8 = 15;

/// Decoded fields of a frame header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Physical slot the module sits in.
    pub slot: u8,
    /// Channel within the module.
    pub channel: u8,
    /// Total frame length in words, header included.
    pub size_words: u32,
    /// Frame does not belong to a physical detector channel.
    pub virtual_channel: bool,
}

impl FrameHeader {
    /// Decode a header word.
    #[inline]
    pub const fn from_word(word: Word) -> Self {
        Self {
            slot: ((word & SLOT_MASK) >> SLOT_SHIFT) as u8,
            channel: (word & CHANNEL_MASK) as u8,
            size_words: (word & SIZE_MASK) >> SIZE_SHIFT,
            virtual_channel: word & VIRTUAL_CHANNEL_BIT != 0,
        }
    }

    /// Encode the header into a word.
    ///
    /// Fields are truncated to their bit widths. The virtual flag is OR-ed
    /// into the size field.
    #[inline]
    pub const fn to_word(&self) -> Word {
        let mut word = ((self.size_words & MAX_FRAME_WORDS) << SIZE_SHIFT)
            | (((self.slot as Word) << SLOT_SHIFT) & SLOT_MASK)
            | ((self.channel as Word) & CHANNEL_MASK);
        if self.virtual_channel {
            word |= VIRTUAL_CHANNEL_BIT;
        }
        word
    }

    /// Build a physical-channel header word.
    #[inline]
    pub const fn encode(slot: u8, channel: u8, size_words: u32) -> Word {
        Self {
            slot,
            channel,
            size_words,
            virtual_channel: false,
        }
        .to_word()
    }

    /// Frame length in bytes.
    #[inline]
    pub const fn size_bytes(&self) -> usize {
        self.size_words as usize * WORD_BYTES
    }
}
