//! Per-module storage for frames split across drain cycles.

use poll_common::{ModuleIndex, Word};

/// Words of frames begun but not completed in the previous drain cycle.
///
/// Each module holds at most one partial frame, always shorter than the
/// size its header declares.
#[derive(Debug, Clone, Default)]
pub struct CarryoverBuffers {
    modules: Vec<Vec<Word>>,
}

impl CarryoverBuffers {
    /// Create empty buffers for `module_count` modules.
    pub fn new(module_count: usize) -> Self {
        Self {
            modules: vec![Vec::new(); module_count],
        }
    }

    /// Words currently held for `module`.
    pub fn words(&self, module: ModuleIndex) -> &[Word] {
        self.modules.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of words held for `module`.
    pub fn len(&self, module: ModuleIndex) -> usize {
        self.words(module).len()
    }

    /// Move the held words of `module` out, leaving it empty.
    pub fn take(&mut self, module: ModuleIndex) -> Vec<Word> {
        self.modules
            .get_mut(module)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Keep `words` of a partial frame declaring `declared_words` for the next cycle.
    pub fn store(&mut self, module: ModuleIndex, words: &[Word], declared_words: u32) {
        debug_assert!(words.len() < declared_words as usize);
        if let Some(buf) = self.modules.get_mut(module) {
            buf.clear();
            buf.extend_from_slice(words);
        }
    }

    /// Total words held across all modules.
    pub fn total_words(&self) -> usize {
        self.modules.iter().map(Vec::len).sum()
    }

    /// Whether no module holds a partial frame.
    pub fn is_empty(&self) -> bool {
        self.total_words() == 0
    }

    /// Modules that currently hold words, with their word counts.
    pub fn pending(&self) -> impl Iterator<Item = (ModuleIndex, usize)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, buf)| !buf.is_empty())
            .map(|(module, buf)| (module, buf.len()))
    }

    /// Discard every partial frame.
    pub fn clear(&mut self) {
        self.modules.iter_mut().for_each(Vec::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_take() {
        let mut carry = CarryoverBuffers::new(2);
        carry.store(1, &[1, 2, 3], 10);
        assert_eq!(carry.len(1), 3);
        assert_eq!(carry.total_words(), 3);
        assert_eq!(carry.pending().collect::<Vec<_>>(), vec![(1, 3)]);

        assert_eq!(carry.take(1), vec![1, 2, 3]);
        assert!(carry.is_empty());
    }

    #[test]
    fn out_of_range_module_is_empty() {
        let mut carry = CarryoverBuffers::new(1);
        assert!(carry.words(4).is_empty());
        assert!(carry.take(4).is_empty());
    }

    #[test]
    fn clear_discards_everything() {
        let mut carry = CarryoverBuffers::new(3);
        carry.store(0, &[7], 2);
        carry.store(2, &[8, 9], 5);
        carry.clear();
        assert_eq!(carry.total_words(), 0);
    }
}
