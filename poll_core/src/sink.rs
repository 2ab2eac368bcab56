//! Output sink.
//!
//! [`OutputSinkCoordinator`] decides when a run rolls over to a continuation
//! file and keeps the next run number ahead of existing files. File I/O is
//! delegated to an [`OutputFile`]; [`RunFileWriter`] is the on-disk
//! implementation.
//!
//! # File layout
//!
//! ```text
//! header   : magic, version, run, continuation, title (80 bytes)
//! spills   : (seg_len, module, frames...)*
//! trailer  : end-of-file magic, spill count
//! ```
//!
//! All words are little-endian u32. Runs are named `{prefix}_{run:03}.ldf`;
//! continuations append `-{n}`.

use crate::error::AcqError;
use crate::spill::Spill;
use crate::stats::RunStatistics;
use poll_common::Word;
use poll_common::consts::{MAX_FILE_SIZE, RESERVED_TRAILER_BYTES, WORD_BYTES};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// First word of every output file.
pub const FILE_MAGIC: Word = 0x504C_4446; // "PLDF"
/// Layout version written after the magic.
pub const FILE_FORMAT_VERSION: Word = 1;
/// First word of the end-of-file trailer.
pub const EOF_MAGIC: Word = 0x454F_4621; // "EOF!"
/// Bytes of run title stored in the header.
pub const TITLE_BYTES: usize = 80;
/// Header length in words.
pub const HEADER_WORDS: usize = 4 + TITLE_BYTES / WORD_BYTES;
/// File extension of run files.
pub const FILE_EXTENSION: &str = "ldf";

/// Everything needed to open one output file.
#[derive(Debug, Clone, Copy)]
pub struct FileRequest<'a> {
    /// Run title stored in the header.
    pub title: &'a str,
    /// Run number.
    pub run_number: u32,
    /// File name prefix.
    pub prefix: &'a str,
    /// Directory the file is created in.
    pub directory: &'a Path,
    /// Next file of the run already open before (rollover).
    pub continuation: bool,
}

/// File-writer collaborator of the coordinator.
pub trait OutputFile: Send {
    /// Whether a file is currently open.
    fn is_open(&self) -> bool;

    /// Open a new file. Fails if a file is already open.
    fn open(&mut self, request: FileRequest<'_>) -> Result<(), AcqError>;

    /// Finish and close the current file.
    fn close(&mut self) -> Result<(), AcqError>;

    /// Bytes written to the current file, header included.
    fn current_size(&self) -> u64;

    /// Append words to the current file.
    fn write(&mut self, words: &[Word]) -> Result<(), AcqError>;

    /// Path of the current (or last) file.
    fn current_filename(&self) -> Option<&Path>;

    /// Run number of the current (or last) file.
    fn run_number(&self) -> u32;

    /// First run number at or above `start` with no file in `directory`.
    fn next_run_number(&self, directory: &Path, prefix: &str, start: u32) -> u32;
}

/// Path of a run file.
pub fn run_file_path(directory: &Path, prefix: &str, run: u32, continuation: u32) -> PathBuf {
    let name = if continuation == 0 {
        format!("{prefix}_{run:03}.{FILE_EXTENSION}")
    } else {
        format!("{prefix}_{run:03}-{continuation}.{FILE_EXTENSION}")
    };
    directory.join(name)
}

/// On-disk run file writer.
pub struct RunFileWriter {
    out: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    size: u64,
    run_number: u32,
    continuation: u32,
    spills: u32,
}

impl RunFileWriter {
    /// Create a writer with no file open.
    pub fn new() -> Self {
        Self {
            out: None,
            path: None,
            size: 0,
            run_number: 0,
            continuation: 0,
            spills: 0,
        }
    }

    fn put_words(out: &mut BufWriter<File>, words: &[Word]) -> std::io::Result<()> {
        for word in words {
            out.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    fn header(&self, title: &str) -> Vec<Word> {
        let mut title_bytes = [b' '; TITLE_BYTES];
        let raw = title.as_bytes();
        let n = raw.len().min(TITLE_BYTES);
        title_bytes[..n].copy_from_slice(&raw[..n]);

        let mut header = Vec::with_capacity(HEADER_WORDS);
        header.extend_from_slice(&[
            FILE_MAGIC,
            FILE_FORMAT_VERSION,
            self.run_number,
            self.continuation,
        ]);
        header.extend(
            title_bytes
                .chunks_exact(WORD_BYTES)
                .map(|c| Word::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        header
    }
}

impl Default for RunFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFile for RunFileWriter {
    fn is_open(&self) -> bool {
        self.out.is_some()
    }

    fn open(&mut self, request: FileRequest<'_>) -> Result<(), AcqError> {
        if self.is_open() {
            return Err(AcqError::FileOpenFailure(
                "a file is already open".to_string(),
            ));
        }

        if request.continuation && request.run_number == self.run_number {
            self.continuation += 1;
        } else {
            self.continuation = 0;
        }
        self.run_number = request.run_number;

        let path = run_file_path(
            request.directory,
            request.prefix,
            request.run_number,
            self.continuation,
        );
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| AcqError::FileOpenFailure(format!("{}: {}", path.display(), e)))?;

        let mut out = BufWriter::new(file);
        let header = self.header(request.title);
        Self::put_words(&mut out, &header)?;

        self.size = (header.len() * WORD_BYTES) as u64;
        self.spills = 0;
        self.out = Some(out);
        info!("Opened output file {}", path.display());
        self.path = Some(path);
        Ok(())
    }

    fn close(&mut self) -> Result<(), AcqError> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        Self::put_words(&mut out, &[EOF_MAGIC, self.spills])?;
        out.flush()?;
        self.size += (2 * WORD_BYTES) as u64;
        if let Some(path) = &self.path {
            info!("Closed output file {} ({} bytes)", path.display(), self.size);
        }
        Ok(())
    }

    fn current_size(&self) -> u64 {
        self.size
    }

    fn write(&mut self, words: &[Word]) -> Result<(), AcqError> {
        let out = self.out.as_mut().ok_or(AcqError::NoOpenFile)?;
        Self::put_words(out, words)?;
        self.size += (words.len() * WORD_BYTES) as u64;
        self.spills += 1;
        Ok(())
    }

    fn current_filename(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn run_number(&self) -> u32 {
        self.run_number
    }

    fn next_run_number(&self, directory: &Path, prefix: &str, start: u32) -> u32 {
        let mut run = start;
        while run_file_path(directory, prefix, run, 0).exists() {
            run += 1;
        }
        run
    }
}

/// Output settings owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    /// Directory run files are created in.
    pub directory: PathBuf,
    /// File name prefix.
    pub prefix: String,
    /// Run title written into every header.
    pub title: String,
    /// Run number of the next run.
    pub run_number: u32,
    /// Upper bound of any file's size in bytes.
    pub max_file_size: u64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            prefix: "run".to_string(),
            title: "poll run".to_string(),
            run_number: 1,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// Result of persisting one spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Words written.
    pub words: usize,
    /// A continuation file was opened before writing.
    pub rolled_over: bool,
}

/// Decides file boundaries and run numbering for persisted spills.
pub struct OutputSinkCoordinator {
    file: Box<dyn OutputFile>,
    settings: OutputSettings,
    /// Spill bytes in the current file.
    data_bytes: u64,
}

impl OutputSinkCoordinator {
    /// Create a coordinator writing through `file`.
    ///
    /// The run number is advanced past any run file already in the directory.
    pub fn new(file: Box<dyn OutputFile>, mut settings: OutputSettings) -> Self {
        settings.run_number =
            file.next_run_number(&settings.directory, &settings.prefix, settings.run_number);
        Self {
            file,
            settings,
            data_bytes: 0,
        }
    }

    /// Current output settings.
    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    /// Whether a file is open.
    pub fn is_open(&self) -> bool {
        self.file.is_open()
    }

    /// Size of the open file in bytes, 0 when closed.
    pub fn current_size(&self) -> u64 {
        if self.is_open() {
            self.file.current_size()
        } else {
            0
        }
    }

    /// Name of the open file.
    pub fn current_filename(&self) -> Option<String> {
        if !self.is_open() {
            return None;
        }
        self.file
            .current_filename()
            .map(|p| p.display().to_string())
    }

    /// Run number of the open file, or of the next run when closed.
    pub fn run_number(&self) -> u32 {
        if self.is_open() {
            self.file.run_number()
        } else {
            self.settings.run_number
        }
    }

    fn ensure_closed(&self, what: &'static str) -> Result<(), AcqError> {
        if self.is_open() {
            return Err(AcqError::FileOpen(what));
        }
        Ok(())
    }

    /// Change the output directory.
    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) -> Result<(), AcqError> {
        self.ensure_closed("output directory")?;
        self.settings.directory = directory.into();
        self.settings.run_number = self.file.next_run_number(
            &self.settings.directory,
            &self.settings.prefix,
            self.settings.run_number,
        );
        Ok(())
    }

    /// Change the file name prefix.
    pub fn set_prefix(&mut self, prefix: impl Into<String>) -> Result<(), AcqError> {
        self.ensure_closed("file prefix")?;
        self.settings.prefix = prefix.into();
        self.settings.run_number = self.file.next_run_number(
            &self.settings.directory,
            &self.settings.prefix,
            self.settings.run_number,
        );
        Ok(())
    }

    /// Change the run title.
    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), AcqError> {
        self.ensure_closed("run title")?;
        self.settings.title = title.into();
        Ok(())
    }

    /// Change the next run number.
    pub fn set_run_number(&mut self, run_number: u32) -> Result<(), AcqError> {
        self.ensure_closed("run number")?;
        self.settings.run_number = run_number;
        Ok(())
    }

    fn open_file(&mut self, continuation: bool) -> Result<(), AcqError> {
        let request = FileRequest {
            title: &self.settings.title,
            run_number: self.settings.run_number,
            prefix: &self.settings.prefix,
            directory: &self.settings.directory,
            continuation,
        };
        self.file.open(request)?;
        self.data_bytes = 0;
        Ok(())
    }

    /// Open the first file of a new run. Statistics start from zero.
    pub fn open_run(&mut self, stats: &mut RunStatistics) -> Result<(), AcqError> {
        self.open_file(false)?;
        stats.clear();
        Ok(())
    }

    /// Close the run's file and advance the next run number past existing files.
    pub fn close_run(&mut self) -> Result<(), AcqError> {
        if !self.is_open() {
            return Ok(());
        }
        let closed = self.file.run_number();
        self.file.close()?;
        self.settings.run_number = self.file.next_run_number(
            &self.settings.directory,
            &self.settings.prefix,
            closed + 1,
        );
        debug!("Next run number {}", self.settings.run_number);
        Ok(())
    }

    /// Persist one spill, rolling to a continuation file first if it would
    /// push the current file past the size limit.
    pub fn write_spill(&mut self, spill: &Spill) -> Result<WriteOutcome, AcqError> {
        if !self.is_open() {
            return Err(AcqError::NoOpenFile);
        }

        let needed = spill.size_bytes() + RESERVED_TRAILER_BYTES;
        let mut rolled_over = false;
        if self.file.current_size() + needed > self.settings.max_file_size && self.data_bytes > 0 {
            info!(
                "File {} reached {} bytes, rolling over",
                self.current_filename().unwrap_or_default(),
                self.file.current_size()
            );
            self.file.close()?;
            self.open_file(true)?;
            rolled_over = true;
        }

        if self.file.current_size() + needed > self.settings.max_file_size {
            warn!(
                "Spill of {} bytes exceeds the file size limit of {} bytes",
                spill.size_bytes(),
                self.settings.max_file_size
            );
        }

        self.file.write(spill.words())?;
        self.data_bytes += spill.size_bytes();
        Ok(WriteOutcome {
            words: spill.len_words(),
            rolled_over,
        })
    }
}
