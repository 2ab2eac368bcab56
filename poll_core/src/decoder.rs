//! Event frame decoder.
//!
//! Walks a module segment payload frame by frame. Each header is validated
//! before the decoder advances past it:
//!
//! 1. slot equals the module's expected slot
//! 2. channel is in `0..=15`
//! 3. size is non-zero
//!
//! A frame whose declared size runs past the end of the payload is not an
//! error: the decoder yields [`Decoded::Truncated`] with the words present so
//! the caller can carry them into the next drain cycle.

use poll_common::Word;
use poll_common::consts::DIAGNOSTIC_PREVIEW_WORDS;
use poll_common::frame::{FrameHeader, MAX_CHANNEL};
use std::fmt;

/// Bounded copy of raw frame words kept for diagnostics.
pub type Preview = heapless::Vec<Word, DIAGNOSTIC_PREVIEW_WORDS>;

/// One complete event frame inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFrame {
    /// Word offset of the header within the payload.
    pub offset: usize,
    /// Decoded header.
    pub header: FrameHeader,
}

impl EventFrame {
    /// Frame length in words.
    #[inline]
    pub fn size_words(&self) -> usize {
        self.header.size_words as usize
    }
}

/// Final frame of a payload that continues in the next drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncatedFrame<'a> {
    /// Word offset of the header within the payload.
    pub offset: usize,
    /// Size the header declares.
    pub declared_words: u32,
    /// Words still to arrive.
    pub missing_words: usize,
    /// Words of the frame present in this payload.
    pub present: &'a [Word],
}

/// Item produced by [`FrameDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// A complete frame.
    Frame(EventFrame),
    /// The payload ends inside this frame.
    Truncated(TruncatedFrame<'a>),
}

/// Why a header was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionReason {
    /// Header slot differs from the module's slot.
    SlotMismatch {
        /// Slot of the module being decoded
        expected: u8,
        /// Slot found in the header
        found: u8,
    },
    /// Channel number above 15.
    ChannelOutOfRange(u8),
    /// Header declares a zero-length frame.
    ZeroSize,
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotMismatch { expected, found } => {
                write!(f, "slot {found} found, expected {expected}")
            }
            Self::ChannelOutOfRange(ch) => write!(f, "channel {ch} out of range"),
            Self::ZeroSize => write!(f, "zero frame size"),
        }
    }
}

/// Diagnostic context captured at the first invalid header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptionReport {
    /// What was wrong with the header.
    pub reason: CorruptionReason,
    /// Offset of the failing header within the payload.
    pub offset: usize,
    /// Payload length in words.
    pub total_words: usize,
    /// Size of the last frame that decoded cleanly (0 if none).
    pub last_good_size: u32,
    /// Words of the frame preceding the failure.
    pub previous: Preview,
    /// Words of the failing frame.
    pub failing: Preview,
    /// Words of the frame the failing header points to.
    pub following: Preview,
}

impl CorruptionReport {
    fn capture(
        words: &[Word],
        reason: CorruptionReason,
        offset: usize,
        previous_offset: Option<usize>,
        last_good_size: u32,
    ) -> Self {
        let failing_size = FrameHeader::from_word(words[offset]).size_words as usize;

        let previous = previous_offset
            .map(|start| preview(words, start, last_good_size as usize))
            .unwrap_or_default();
        let failing = preview(words, offset, failing_size.max(1));

        let next = offset + failing_size;
        let following = if failing_size > 0 && next < words.len() {
            let size = FrameHeader::from_word(words[next]).size_words as usize;
            preview(words, next, size.max(1))
        } else {
            Preview::new()
        };

        Self {
            reason,
            offset,
            total_words: words.len(),
            last_good_size,
            previous,
            failing,
            following,
        }
    }
}

fn preview(words: &[Word], start: usize, len: usize) -> Preview {
    let end = words
        .len()
        .min(start.saturating_add(len))
        .min(start + DIAGNOSTIC_PREVIEW_WORDS);
    let mut out = Preview::new();
    if start < end {
        let _ = out.extend_from_slice(&words[start..end]);
    }
    out
}

fn write_preview(f: &mut fmt::Formatter<'_>, label: &str, words: &[Word]) -> fmt::Result {
    write!(f, "\n  {label} ({} words):", words.len())?;
    for (idx, word) in words.iter().enumerate() {
        if idx % 8 == 0 {
            write!(f, "\n   ")?;
        }
        write!(f, " {word:#010x}")?;
    }
    Ok(())
}

impl fmt::Display for CorruptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at word {} of {} (last good frame {} words)",
            self.reason, self.offset, self.total_words, self.last_good_size
        )?;
        if f.alternate() {
            write_preview(f, "previous", &self.previous)?;
            write_preview(f, "failing", &self.failing)?;
            write_preview(f, "following", &self.following)?;
        }
        Ok(())
    }
}

/// Lazy frame iterator over one module payload.
///
/// Stops after the first truncated frame or corruption report.
pub struct FrameDecoder<'a> {
    words: &'a [Word],
    expected_slot: u8,
    offset: usize,
    previous_offset: Option<usize>,
    last_good_size: u32,
    done: bool,
}

impl<'a> FrameDecoder<'a> {
    /// Decode `words`, which must all belong to the module in `expected_slot`.
    pub fn new(words: &'a [Word], expected_slot: u8) -> Self {
        Self {
            words,
            expected_slot,
            offset: 0,
            previous_offset: None,
            last_good_size: 0,
            done: false,
        }
    }

    fn validate(&self, header: &FrameHeader) -> Option<CorruptionReason> {
        if header.slot != self.expected_slot {
            Some(CorruptionReason::SlotMismatch {
                expected: self.expected_slot,
                found: header.slot,
            })
        } else if header.channel > MAX_CHANNEL {
            Some(CorruptionReason::ChannelOutOfRange(header.channel))
        } else if header.size_words == 0 {
            Some(CorruptionReason::ZeroSize)
        } else {
            None
        }
    }
}

impl<'a> Iterator for FrameDecoder<'a> {
    type Item = Result<Decoded<'a>, CorruptionReport>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.words.len() {
            return None;
        }

        let offset = self.offset;
        let header = FrameHeader::from_word(self.words[offset]);

        if let Some(reason) = self.validate(&header) {
            self.done = true;
            return Some(Err(CorruptionReport::capture(
                self.words,
                reason,
                offset,
                self.previous_offset,
                self.last_good_size,
            )));
        }

        let size = header.size_words as usize;
        let available = self.words.len() - offset;
        if size > available {
            self.done = true;
            return Some(Ok(Decoded::Truncated(TruncatedFrame {
                offset,
                declared_words: header.size_words,
                missing_words: size - available,
                present: &self.words[offset..],
            })));
        }

        self.previous_offset = Some(offset);
        self.last_good_size = header.size_words;
        self.offset += size;
        Some(Ok(Decoded::Frame(EventFrame { offset, header })))
    }
}

/// Summary of a fully decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOutcome<'a> {
    /// Complete frames found.
    pub frames: usize,
    /// Words covered by complete frames.
    pub complete_words: usize,
    /// Trailing partial frame, if any.
    pub truncated: Option<TruncatedFrame<'a>>,
}

/// Decode a whole payload, calling `on_frame` for every complete frame.
pub fn decode_segment<'a>(
    words: &'a [Word],
    expected_slot: u8,
    mut on_frame: impl FnMut(&EventFrame),
) -> Result<SegmentOutcome<'a>, CorruptionReport> {
    let mut frames = 0;
    let mut truncated = None;

    for item in FrameDecoder::new(words, expected_slot) {
        match item? {
            Decoded::Frame(frame) => {
                frames += 1;
                on_frame(&frame);
            }
            Decoded::Truncated(partial) => truncated = Some(partial),
        }
    }

    let complete_words = truncated.map_or(words.len(), |t| t.offset);
    Ok(SegmentOutcome {
        frames,
        complete_words,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(slot: u8, channel: u8, size: u32) -> Vec<Word> {
        let mut words = vec![FrameHeader::encode(slot, channel, size)];
        words.extend((1..size).map(|i| 0xA000_0000 | i));
        words
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut words = frame(2, 0, 4);
        words.extend(frame(2, 7, 6));

        let frames: Vec<_> = FrameDecoder::new(&words, 2)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(frames.len(), 2);
        let Decoded::Frame(second) = frames[1] else {
            panic!("expected a complete frame");
        };
        assert_eq!(second.offset, 4);
        assert_eq!(second.header.channel, 7);
        assert_eq!(second.size_words(), 6);
    }

    #[test]
    fn truncated_final_frame_reports_missing_words() {
        let mut words = frame(3, 1, 5);
        words.extend(&frame(3, 2, 10)[..4]);

        let outcome = decode_segment(&words, 3, |_| {}).unwrap();
        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.complete_words, 5);
        let partial = outcome.truncated.unwrap();
        assert_eq!(partial.offset, 5);
        assert_eq!(partial.declared_words, 10);
        assert_eq!(partial.missing_words, 6);
        assert_eq!(partial.present, &words[5..]);
    }

    #[test]
    fn slot_mismatch_captures_context() {
        let mut words = frame(2, 0, 8);
        words.extend(frame(4, 0, 5));
        words.extend(frame(2, 1, 3));

        let err = decode_segment(&words, 2, |_| {}).unwrap_err();
        assert_eq!(
            err.reason,
            CorruptionReason::SlotMismatch {
                expected: 2,
                found: 4
            }
        );
        assert_eq!(err.offset, 8);
        assert_eq!(err.last_good_size, 8);
        assert_eq!(err.previous.as_slice(), &words[0..8]);
        assert_eq!(err.failing.as_slice(), &words[8..13]);
        assert_eq!(err.following.as_slice(), &words[13..16]);
    }

    #[test]
    fn zero_size_is_corruption() {
        let words = vec![FrameHeader::encode(2, 0, 0), 1, 2];
        let err = decode_segment(&words, 2, |_| {}).unwrap_err();
        assert_eq!(err.reason, CorruptionReason::ZeroSize);
        assert!(err.previous.is_empty());
        assert_eq!(err.failing.len(), 1);
        assert!(err.following.is_empty());
    }

    #[test]
    fn slot_is_checked_before_truncation() {
        // Declared size exceeds the payload, but the slot is already wrong.
        let words = vec![FrameHeader::encode(9, 0, 40), 1];
        let err = decode_segment(&words, 2, |_| {}).unwrap_err();
        assert!(matches!(err.reason, CorruptionReason::SlotMismatch { .. }));
    }

    #[test]
    fn previews_are_bounded() {
        let mut words = frame(2, 0, 120);
        words.extend(frame(5, 0, 120));
        let err = decode_segment(&words, 2, |_| {}).unwrap_err();
        assert_eq!(err.previous.len(), DIAGNOSTIC_PREVIEW_WORDS);
        assert_eq!(err.failing.len(), DIAGNOSTIC_PREVIEW_WORDS);
        assert!(err.following.is_empty());
    }

    #[test]
    fn empty_payload_yields_nothing() {
        let outcome = decode_segment(&[], 2, |_| {}).unwrap();
        assert_eq!(outcome.frames, 0);
        assert!(outcome.truncated.is_none());
    }

    #[test]
    fn report_alternate_format_lists_words() {
        let mut words = frame(2, 0, 3);
        words.extend(frame(6, 0, 3));
        let err = decode_segment(&words, 2, |_| {}).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("failing (3 words)"));
        assert!(text.contains("slot 6 found, expected 2"));
    }
}
