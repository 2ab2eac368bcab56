//! Randomized list-mode word stream.

use poll_common::Word;
use poll_common::frame::{FrameHeader, MAX_CHANNEL};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Produces the word stream of one simulated module.
///
/// Frames carry the module's slot, a random channel and a random size in
/// `min_words..=max_words`. Words are handed out one at a time, so a caller
/// that stops mid-frame resumes exactly where it left off.
pub struct FrameGenerator {
    rng: StdRng,
    slot: u8,
    min_words: u32,
    max_words: u32,
    /// Words of the current frame not yet emitted.
    remaining: u32,
    frames_started: u64,
}

impl FrameGenerator {
    /// Create a generator for `slot`.
    pub fn new(slot: u8, min_words: u32, max_words: u32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            slot,
            min_words,
            max_words,
            remaining: 0,
            frames_started: 0,
        }
    }

    /// Next word of the stream.
    pub fn next_word(&mut self) -> Word {
        if self.remaining == 0 {
            let size = self.rng.gen_range(self.min_words..=self.max_words);
            let channel = self.rng.gen_range(0..=MAX_CHANNEL);
            self.remaining = size - 1;
            self.frames_started += 1;
            return FrameHeader::encode(self.slot, channel, size);
        }
        self.remaining -= 1;
        self.rng.next_u32()
    }

    /// Words still owed by the frame in progress.
    pub fn pending_words(&self) -> u32 {
        self.remaining
    }

    /// Emit the rest of the frame in progress.
    pub fn finish_frame(&mut self) -> Vec<Word> {
        (0..self.remaining).map(|_| self.next_word()).collect()
    }

    /// Drop the frame in progress; the next word starts a new frame.
    pub fn reset(&mut self) {
        self.remaining = 0;
    }

    /// Number of frames started since creation.
    pub fn frames_started(&self) -> u64 {
        self.frames_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_tiles_into_valid_frames() {
        let mut generator = FrameGenerator::new(3, 4, 12, 1);
        let words: Vec<Word> = (0..500).map(|_| generator.next_word()).collect();

        let mut offset = 0;
        let mut frames = 0;
        while offset < words.len() {
            let header = FrameHeader::from_word(words[offset]);
            assert_eq!(header.slot, 3);
            assert!((4..=12).contains(&header.size_words));
            offset += header.size_words as usize;
            frames += 1;
        }
        assert_eq!(frames, generator.frames_started());
    }

    #[test]
    fn finish_frame_completes_partial_frame() {
        let mut generator = FrameGenerator::new(2, 10, 10, 7);
        let header = generator.next_word();
        assert_eq!(FrameHeader::from_word(header).size_words, 10);
        generator.next_word();

        let rest = generator.finish_frame();
        assert_eq!(rest.len(), 8);
        assert_eq!(generator.pending_words(), 0);
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = FrameGenerator::new(2, 4, 64, 99);
        let mut b = FrameGenerator::new(2, 4, 64, 99);
        for _ in 0..256 {
            assert_eq!(a.next_word(), b.next_word());
        }
    }
}
