//! Spill builder.
//!
//! One drain cycle polls every module FIFO, reads the modules that hold
//! enough data and stitches each module's carryover and fresh words into a
//! segment:
//!
//! ```text
//! ┌────────────┬────────┬──────────────────────────────┐
//! │ seg_len    │ module │ carryover + fresh words ...  │   seg_len = payload + 2
//! └────────────┴────────┴──────────────────────────────┘
//! ```
//!
//! Segments are validated by the frame decoder; a trailing partial frame is
//! cut from the segment and kept as carryover for the next cycle.

use crate::carryover::CarryoverBuffers;
use crate::decoder::decode_segment;
use crate::error::AcqError;
use crate::stats::RunStatistics;
use poll_common::consts::{SEGMENT_HEADER_WORDS, WORD_BYTES};
use poll_common::hal::port::ModulePort;
use poll_common::{ModuleIndex, Word};
use std::time::Instant;
use tracing::{debug, warn};

/// FIFO polling parameters of a drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    /// External FIFO capacity in words.
    pub fifo_capacity: usize,
    /// FIFOs holding fewer words are left alone.
    pub min_fifo_read: usize,
    /// A FIFO holding more words than this triggers a drain.
    pub threshold_words: usize,
    /// Word-count polls before giving up on the threshold.
    pub poll_tries: u32,
}

impl DrainSettings {
    /// Build settings with the threshold given as a percentage of the capacity.
    pub fn new(
        fifo_capacity: usize,
        min_fifo_read: usize,
        threshold_percent: f64,
        poll_tries: u32,
    ) -> Self {
        Self {
            fifo_capacity,
            min_fifo_read,
            threshold_words: (fifo_capacity as f64 * threshold_percent / 100.0) as usize,
            poll_tries,
        }
    }
}

/// One drain cycle's worth of data, ready to persist and broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spill {
    words: Vec<Word>,
}

impl Spill {
    /// Wrap already framed spill words.
    pub fn from_words(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// Raw spill words, segment headers included.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Spill length in words.
    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    /// Spill length in bytes.
    pub fn size_bytes(&self) -> u64 {
        (self.words.len() * WORD_BYTES) as u64
    }

    /// Whether the spill carries no words at all.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Iterate over the module segments.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            words: &self.words,
            pos: 0,
        }
    }
}

/// One module's part of a spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Module the words were read from.
    pub module: ModuleIndex,
    /// Frame words, segment header excluded.
    pub payload: &'a [Word],
}

/// Iterator over the segments of a [`Spill`].
pub struct Segments<'a> {
    words: &'a [Word],
    pos: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.words[self.pos..];
        if rest.len() < SEGMENT_HEADER_WORDS {
            return None;
        }
        let len = rest[0] as usize;
        if len < SEGMENT_HEADER_WORDS || len > rest.len() {
            return None;
        }
        self.pos += len;
        Some(Segment {
            module: rest[1] as ModuleIndex,
            payload: &rest[SEGMENT_HEADER_WORDS..len],
        })
    }
}

/// Drains all modules once per call and assembles the spill.
///
/// Owns the carryover of every module, so partial frames survive between
/// calls without process-wide state.
pub struct SpillBuilder {
    settings: DrainSettings,
    carryover: CarryoverBuffers,
    counts: Vec<usize>,
    last_spill: Instant,
    spills: u64,
}

impl SpillBuilder {
    /// Create a builder for `module_count` modules.
    pub fn new(settings: DrainSettings, module_count: usize) -> Self {
        Self {
            settings,
            carryover: CarryoverBuffers::new(module_count),
            counts: vec![0; module_count],
            last_spill: Instant::now(),
            spills: 0,
        }
    }

    /// Polling parameters.
    pub fn settings(&self) -> &DrainSettings {
        &self.settings
    }

    /// Partial frames waiting for their remaining words.
    pub fn carryover(&self) -> &CarryoverBuffers {
        &self.carryover
    }

    /// Spills produced since the last reset.
    pub fn spill_count(&self) -> u64 {
        self.spills
    }

    /// Prepare for a new run: drop carryover and restart the spill clock.
    pub fn reset(&mut self) {
        self.carryover.clear();
        self.last_spill = Instant::now();
        self.spills = 0;
    }

    /// Report and drop left-over partial frames. Returns the words dropped.
    pub fn discard_carryover(&mut self) -> usize {
        for (module, words) in self.carryover.pending() {
            warn!(
                "Discarding partial event of {} words on module {}",
                words, module
            );
        }
        let dropped = self.carryover.total_words();
        self.carryover.clear();
        dropped
    }

    /// Poll FIFO word counts until a module crosses the threshold.
    fn poll_counts(&mut self, port: &mut dyn ModulePort) -> bool {
        for _ in 0..self.settings.poll_tries {
            let mut full = false;
            for (module, count) in self.counts.iter_mut().enumerate() {
                *count = match port.fifo_word_count(module) {
                    Ok(words) => words,
                    Err(e) => {
                        warn!("Module {} word count unavailable, treating as empty: {}", module, e);
                        0
                    }
                };
                if *count > self.settings.threshold_words {
                    full = true;
                }
            }
            if full {
                return true;
            }
        }
        false
    }

    /// Run one drain cycle.
    ///
    /// Returns `Ok(None)` when no FIFO crossed the threshold and `force` is
    /// not set. Any error aborts the whole cycle; nothing of it may be
    /// written or broadcast.
    pub fn drain(
        &mut self,
        port: &mut dyn ModulePort,
        stats: &mut RunStatistics,
        force: bool,
    ) -> Result<Option<Spill>, AcqError> {
        let full = self.poll_counts(port);
        if !full && !force {
            return Ok(None);
        }

        let mut spill: Vec<Word> = Vec::new();
        for module in 0..self.counts.len() {
            let words = self.counts[module];
            let seg_start = spill.len();

            if words < self.settings.min_fifo_read {
                spill.extend_from_slice(&[SEGMENT_HEADER_WORDS as Word, module as Word]);
                continue;
            }

            if words >= self.settings.fifo_capacity {
                return Err(AcqError::FifoOverflow {
                    module,
                    words,
                    capacity: self.settings.fifo_capacity,
                });
            }

            let carry = self.carryover.take(module);
            spill.reserve(SEGMENT_HEADER_WORDS + carry.len() + words);
            spill.extend_from_slice(&[0, module as Word]);
            let payload_start = spill.len();
            spill.extend_from_slice(&carry);

            let read_start = spill.len();
            spill.resize(read_start + words, 0);
            port.read_fifo_words(&mut spill[read_start..], module)
                .map_err(|source| AcqError::HardwareReadFailure { module, source })?;

            let slot = port.expected_slot(module);
            let outcome = decode_segment(&spill[payload_start..], slot, |frame| {
                if !frame.header.virtual_channel {
                    stats.add_event(module, frame.header.channel, frame.header.size_bytes());
                }
            })
            .map_err(|report| AcqError::CorruptedStream {
                module,
                report: Box::new(report),
            })?;

            let partial = outcome
                .truncated
                .map(|t| (payload_start + t.offset, t.declared_words, t.missing_words));
            if let Some((cut, declared, missing)) = partial {
                debug!(
                    "Module {}: {} words carried over, {} still missing",
                    module,
                    spill.len() - cut,
                    missing
                );
                self.carryover.store(module, &spill[cut..], declared);
                spill.truncate(cut);
            }

            spill[seg_start] = (spill.len() - seg_start) as Word;
        }

        let now = Instant::now();
        if stats.add_elapsed(now.duration_since(self.last_spill)) {
            stats.dump();
            stats.clear_rates();
        }
        self.last_spill = now;
        self.spills += 1;

        debug!("Spill {} assembled: {} words", self.spills, spill.len());
        Ok(Some(Spill::from_words(spill)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poll_common::frame::FrameHeader;
    use poll_common::hal::config::CrateConfig;
    use poll_common::hal::port::{PortError, RunMode};
    use std::collections::VecDeque;

    /// Port serving pre-loaded FIFO contents.
    struct QueuePort {
        slots: Vec<u8>,
        fifos: Vec<VecDeque<Word>>,
        fake_counts: Vec<Option<usize>>,
    }

    impl QueuePort {
        fn new(slots: &[u8]) -> Self {
            Self {
                slots: slots.to_vec(),
                fifos: vec![VecDeque::new(); slots.len()],
                fake_counts: vec![None; slots.len()],
            }
        }
    }

    impl ModulePort for QueuePort {
        fn name(&self) -> &'static str {
            "queue"
        }
        fn version(&self) -> &'static str {
            "0.0.0"
        }
        fn init(&mut self, _config: &CrateConfig) -> Result<(), PortError> {
            Ok(())
        }
        fn module_count(&self) -> usize {
            self.slots.len()
        }
        fn expected_slot(&self, module: ModuleIndex) -> u8 {
            self.slots[module]
        }
        fn fifo_word_count(&mut self, module: ModuleIndex) -> Result<usize, PortError> {
            Ok(self.fake_counts[module].unwrap_or(self.fifos[module].len()))
        }
        fn read_fifo_words(
            &mut self,
            buf: &mut [Word],
            module: ModuleIndex,
        ) -> Result<(), PortError> {
            for w in buf.iter_mut() {
                *w = self.fifos[module].pop_front().unwrap();
            }
            Ok(())
        }
        fn start_run(&mut self, _mode: RunMode) -> Result<(), PortError> {
            Ok(())
        }
        fn end_run(&mut self) -> Result<(), PortError> {
            Ok(())
        }
        fn check_run_status(&mut self, _module: ModuleIndex) -> Result<bool, PortError> {
            Ok(false)
        }
        fn boot(&mut self) -> Result<(), PortError> {
            Ok(())
        }
        fn shutdown(&mut self) -> Result<(), PortError> {
            Ok(())
        }
    }

    fn frame(slot: u8, size: u32) -> Vec<Word> {
        let mut words = vec![FrameHeader::encode(slot, 1, size)];
        words.extend(std::iter::repeat_n(0xCAFE, size as usize - 1));
        words
    }

    fn settings() -> DrainSettings {
        DrainSettings::new(1000, 9, 50.0, 3)
    }

    #[test]
    fn threshold_is_percentage_of_capacity() {
        assert_eq!(settings().threshold_words, 500);
    }

    #[test]
    fn below_threshold_without_force_is_nothing() {
        let mut port = QueuePort::new(&[2]);
        port.fifos[0].extend(frame(2, 20));
        let mut builder = SpillBuilder::new(settings(), 1);
        let mut stats = RunStatistics::new(1, None);

        assert!(builder.drain(&mut port, &mut stats, false).unwrap().is_none());
        assert_eq!(port.fifos[0].len(), 20);
    }

    #[test]
    fn forced_drain_builds_segments() {
        let mut port = QueuePort::new(&[2, 3]);
        port.fifos[0].extend(frame(2, 20));
        port.fifos[1].extend(frame(3, 4));
        let mut builder = SpillBuilder::new(settings(), 2);
        let mut stats = RunStatistics::new(2, None);

        let spill = builder.drain(&mut port, &mut stats, true).unwrap().unwrap();
        let segments: Vec<_> = spill.segments().collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].module, 0);
        assert_eq!(segments[0].payload.len(), 20);
        // Four words are below the minimum read.
        assert!(segments[1].payload.is_empty());
        assert_eq!(spill.words()[0], 22);
        assert_eq!(stats.total_events(0), 1);
    }

    #[test]
    fn partial_frame_becomes_carryover() {
        let mut port = QueuePort::new(&[2]);
        let full = frame(2, 30);
        port.fifos[0].extend(&full[..12]);
        let mut builder = SpillBuilder::new(settings(), 1);
        let mut stats = RunStatistics::new(1, None);

        let spill = builder.drain(&mut port, &mut stats, true).unwrap().unwrap();
        assert_eq!(spill.words(), &[2, 0]);
        assert_eq!(builder.carryover().len(0), 12);

        port.fifos[0].extend(&full[12..]);
        let spill = builder.drain(&mut port, &mut stats, true).unwrap().unwrap();
        assert_eq!(spill.segments().next().unwrap().payload, full.as_slice());
        assert!(builder.carryover().is_empty());
    }

    #[test]
    fn overflow_aborts_drain() {
        let mut port = QueuePort::new(&[2]);
        port.fake_counts[0] = Some(1000);
        let mut builder = SpillBuilder::new(settings(), 1);
        let mut stats = RunStatistics::new(1, None);

        assert!(matches!(
            builder.drain(&mut port, &mut stats, false),
            Err(AcqError::FifoOverflow { module: 0, words: 1000, .. })
        ));
    }

    #[test]
    fn discard_reports_dropped_words() {
        let mut port = QueuePort::new(&[2]);
        port.fifos[0].extend(&frame(2, 40)[..15]);
        let mut builder = SpillBuilder::new(settings(), 1);
        let mut stats = RunStatistics::new(1, None);
        builder.drain(&mut port, &mut stats, true).unwrap();

        assert_eq!(builder.discard_carryover(), 15);
        assert!(builder.carryover().is_empty());
    }
}
