//! Shared test fixtures: a scripted crate and a capturing network sink.
//!
//! Both hand out a cloneable handle so tests can feed and inspect them
//! while the run controller owns the boxed instance.

#![allow(dead_code)]

use parking_lot::Mutex;
use poll_common::frame::FrameHeader;
use poll_common::hal::config::CrateConfig;
use poll_common::hal::port::{ModulePort, PortError, RunMode};
use poll_common::{ModuleIndex, Word};
use poll_core::broadcast::NetworkSink;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Mutable state behind a [`ScriptedPort`].
#[derive(Debug, Default)]
pub struct Script {
    pub slots: Vec<u8>,
    pub fifos: Vec<VecDeque<Word>>,
    /// Word count reported instead of the real FIFO length.
    pub reported_counts: Vec<Option<usize>>,
    pub mode: Option<RunMode>,
    pub refuse_start: bool,
    /// Status polls a module keeps reporting an active run after `end_run`.
    pub linger_polls: u32,
    pub linger_left: Vec<u32>,
    /// Modules that never leave their run.
    pub stuck: Vec<bool>,
    pub end_runs: u32,
    pub boots: u32,
    pub shutdowns: u32,
}

/// Port serving words pushed by the test.
#[derive(Debug, Clone)]
pub struct ScriptedPort {
    script: Arc<Mutex<Script>>,
}

impl ScriptedPort {
    pub fn new(slots: &[u8]) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                slots: slots.to_vec(),
                fifos: vec![VecDeque::new(); slots.len()],
                reported_counts: vec![None; slots.len()],
                linger_left: vec![0; slots.len()],
                stuck: vec![false; slots.len()],
                ..Default::default()
            })),
        }
    }

    pub fn push(&self, module: ModuleIndex, words: &[Word]) {
        self.script.lock().fifos[module].extend(words.iter().copied());
    }

    pub fn report_count(&self, module: ModuleIndex, count: Option<usize>) {
        self.script.lock().reported_counts[module] = count;
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        f(&mut self.script.lock())
    }

    pub fn boxed(&self) -> Box<dyn ModulePort> {
        Box::new(self.clone())
    }
}

impl ModulePort for ScriptedPort {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    fn init(&mut self, _config: &CrateConfig) -> Result<(), PortError> {
        Ok(())
    }

    fn module_count(&self) -> usize {
        self.script.lock().slots.len()
    }

    fn expected_slot(&self, module: ModuleIndex) -> u8 {
        self.script.lock().slots[module]
    }

    fn fifo_word_count(&mut self, module: ModuleIndex) -> Result<usize, PortError> {
        let s = self.script.lock();
        Ok(s.reported_counts[module].unwrap_or(s.fifos[module].len()))
    }

    fn read_fifo_words(&mut self, buf: &mut [Word], module: ModuleIndex) -> Result<(), PortError> {
        let mut s = self.script.lock();
        let fifo = &mut s.fifos[module];
        let wanted = buf.len();
        if wanted > fifo.len() {
            return Err(PortError::CommunicationError(format!(
                "read of {} words from FIFO holding {}",
                wanted,
                fifo.len()
            )));
        }
        for (dst, src) in buf.iter_mut().zip(fifo.drain(..wanted)) {
            *dst = src;
        }
        Ok(())
    }

    fn start_run(&mut self, mode: RunMode) -> Result<(), PortError> {
        let mut s = self.script.lock();
        if s.refuse_start {
            return Err(PortError::CommunicationError("start refused".to_string()));
        }
        s.mode = Some(mode);
        Ok(())
    }

    fn end_run(&mut self) -> Result<(), PortError> {
        let mut s = self.script.lock();
        s.end_runs += 1;
        if s.mode.take().is_some() {
            let polls = s.linger_polls;
            s.linger_left.iter_mut().for_each(|n| *n = polls);
        }
        Ok(())
    }

    fn check_run_status(&mut self, module: ModuleIndex) -> Result<bool, PortError> {
        let mut s = self.script.lock();
        if s.mode.is_some() || s.stuck[module] {
            return Ok(true);
        }
        let left = &mut s.linger_left[module];
        if *left > 0 {
            *left -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn boot(&mut self) -> Result<(), PortError> {
        self.script.lock().boots += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PortError> {
        self.script.lock().shutdowns += 1;
        Ok(())
    }
}

/// Network sink recording every datagram.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    datagrams: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Capture {
    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.datagrams.lock().clone()
    }

    /// Datagrams as text, NUL terminator stripped.
    pub fn texts(&self) -> Vec<String> {
        self.datagrams
            .lock()
            .iter()
            .map(|d| String::from_utf8_lossy(d.strip_suffix(b"\0").unwrap_or(d.as_slice())).into_owned())
            .collect()
    }
}

impl NetworkSink for Capture {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.datagrams.lock().push(datagram.to_vec());
        Ok(())
    }
}

/// A frame of `size` words for `slot`, payload words counting up from `tag`.
pub fn frame(slot: u8, channel: u8, size: u32, tag: Word) -> Vec<Word> {
    let mut words = vec![FrameHeader::encode(slot, channel, size)];
    words.extend((1..size).map(|i| tag.wrapping_add(i)));
    words
}
