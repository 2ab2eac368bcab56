//! Spill broadcast to network listeners.
//!
//! Two modes:
//! - passive: one short notice per spill, no data
//! - shared-memory: the spill words split into datagrams of at most
//!   [`MAX_CHUNK_WORDS`] words, each prefixed by `(chunk_index, total_chunks)`
//!   with a 1-based index
//!
//! Send failures are counted and logged, never escalated.

use crate::spill::Spill;
use poll_common::Word;
use poll_common::consts::{CHUNK_HEADER_WORDS, MAX_CHUNK_WORDS, WORD_BYTES};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Network collaborator: sends one datagram.
pub trait NetworkSink: Send {
    /// Send `datagram` to the listener.
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// UDP client sending to one fixed listener.
pub struct UdpClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpClient {
    /// Bind an ephemeral local port and target `addr`.
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let target = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no address"))?;
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        Ok(Self { socket, target })
    }

    /// Listener address.
    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl NetworkSink for UdpClient {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.target).map(|_| ())
    }
}

/// How spills are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastMode {
    /// One notice per spill.
    #[default]
    Passive,
    /// Full spill data in chunks.
    SharedMemory,
}

/// Lifecycle notices sent to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// An output file was opened.
    OpenFile,
    /// An output file was closed.
    CloseFile,
    /// The poller is shutting down.
    KillSocket,
}

impl Notice {
    /// Wire text of the notice, NUL-terminated.
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::OpenFile => b"$OPEN_FILE\0",
            Self::CloseFile => b"$CLOSE_FILE\0",
            Self::KillSocket => b"$KILL_SOCKET\0",
        }
    }
}

/// Outcome of broadcasting one spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Datagrams sent successfully.
    pub chunks_sent: usize,
    /// Datagrams that failed.
    pub failures: usize,
}

fn deliver(sink: &mut dyn NetworkSink, failures: &mut u64, datagram: &[u8]) -> bool {
    match sink.send(datagram) {
        Ok(()) => true,
        Err(e) => {
            *failures += 1;
            warn!("Broadcast send failed: {}", e);
            false
        }
    }
}

/// Splits spills into datagrams and sends them.
pub struct BroadcastEncoder {
    sink: Box<dyn NetworkSink>,
    max_chunk_words: usize,
    pause: Duration,
    failures: u64,
    scratch: Vec<u8>,
}

impl BroadcastEncoder {
    /// Create an encoder with the default chunk size and pause.
    pub fn new(sink: Box<dyn NetworkSink>) -> Self {
        Self::with_chunking(sink, MAX_CHUNK_WORDS, Duration::from_micros(1))
    }

    /// Create an encoder with an explicit chunk size and inter-chunk pause.
    pub fn with_chunking(sink: Box<dyn NetworkSink>, max_chunk_words: usize, pause: Duration) -> Self {
        let max_chunk_words = max_chunk_words.clamp(1, MAX_CHUNK_WORDS);
        Self {
            sink,
            max_chunk_words,
            pause,
            failures: 0,
            scratch: Vec::with_capacity((max_chunk_words + CHUNK_HEADER_WORDS) * WORD_BYTES),
        }
    }

    /// Send failures since creation.
    pub fn total_failures(&self) -> u64 {
        self.failures
    }

    /// Forward one spill. `spill_number` is quoted in passive notices.
    pub fn broadcast(&mut self, spill: &Spill, mode: BroadcastMode, spill_number: u64) -> BroadcastReport {
        match mode {
            BroadcastMode::Passive => {
                let notice = format!("$SPILL {} {}\0", spill_number, spill.len_words());
                let ok = deliver(self.sink.as_mut(), &mut self.failures, notice.as_bytes());
                BroadcastReport {
                    chunks_sent: usize::from(ok),
                    failures: usize::from(!ok),
                }
            }
            BroadcastMode::SharedMemory => self.broadcast_chunks(spill.words()),
        }
    }

    fn broadcast_chunks(&mut self, words: &[Word]) -> BroadcastReport {
        let total = words.len().div_ceil(self.max_chunk_words);
        debug!(
            "Splitting {} words into {} network chunks",
            words.len(),
            total
        );

        let mut report = BroadcastReport::default();
        for (idx, chunk) in words.chunks(self.max_chunk_words).enumerate() {
            self.scratch.clear();
            self.scratch.extend_from_slice(&(idx as u32 + 1).to_le_bytes());
            self.scratch.extend_from_slice(&(total as u32).to_le_bytes());
            for word in chunk {
                self.scratch.extend_from_slice(&word.to_le_bytes());
            }

            if deliver(self.sink.as_mut(), &mut self.failures, &self.scratch) {
                report.chunks_sent += 1;
            } else {
                report.failures += 1;
            }
            if !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
        }
        report
    }

    /// Send a lifecycle notice, best-effort.
    pub fn notify(&mut self, notice: Notice) -> bool {
        deliver(self.sink.as_mut(), &mut self.failures, notice.as_bytes())
    }
}
