
use std::fs::{File, OpenOptions};
use std::io::{BufRead, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Error, Op, Result};
use crate::extent::{self, Copier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Attempt to share extents before copying.
    pub clone: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { clone: true }
    }
}

/// How a single source ended up in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Cloned { bytes: u64 },
    Copied { bytes: u64 },
}

impl Outcome {
    pub fn bytes(&self) -> u64 {
        match self {
            Outcome::Cloned { bytes } | Outcome::Copied { bytes } => *bytes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub cloned: usize,
    pub copied: usize,
    /// Blank lines in the source list.
    pub skipped: usize,
    pub bytes: u64,
}

impl Report {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Cloned { .. } => self.cloned += 1,
            Outcome::Copied { .. } => self.copied += 1,
        }
        self.bytes += outcome.bytes();
    }

    pub fn sources(&self) -> usize {
        self.cloned + self.copied
    }
}

/// Appends whole files to a single target, sharing extents where the
/// filesystem allows it and copying bytes where it doesn't.
pub struct Engine {
    target: File,
    path: PathBuf,
    options: Options,
}

impl Engine {
    /// Open `path` for writing, creating it with mode 0644 if needed. Existing
    /// content is kept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, Options::default())
    }

    pub fn with_options(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let path = path.as_ref();
        let mut open = OpenOptions::new();
        open.write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open.mode(0o644);
        }
        let target = open
            .open(path)
            .map_err(|e| Error::new(Op::OpenTarget, path, e))?;

        Ok(Self {
            target,
            path: path.to_path_buf(),
            options,
        })
    }

    /// Append every source named in `input`, one path per line, stopping at
    /// the first failure. Empty lines are skipped.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<Report> {
        let mut report = Report::default();

        for line in input.split(b'\n') {
            let line = line.map_err(|e| Error::new(Op::ReadInput, "<stdin>", e))?;
            if line.is_empty() {
                report.skipped += 1;
                continue;
            }
            let source = path_from_bytes(line);
            let outcome = self.append(&source)?;
            report.record(outcome);
        }

        tracing::info!(
            cloned = report.cloned,
            copied = report.copied,
            skipped = report.skipped,
            bytes = report.bytes,
            "done"
        );
        Ok(report)
    }

    /// Append the whole of `source` at the target's current end of file.
    #[tracing::instrument(skip_all, fields(source = %source.display()))]
    pub fn append(&mut self, source: &Path) -> Result<Outcome> {
        // Always ask the filesystem: the target may have grown since the
        // last append.
        let offset = self.end_of_target()?;

        let src = File::open(source).map_err(|e| Error::new(Op::OpenSource, source, e))?;

        if self.options.clone {
            match extent::clone_range(&src, &self.target, offset) {
                Ok(()) => {
                    let bytes = self.end_of_target()? - offset;
                    tracing::debug!(offset, bytes, "cloned");
                    return Ok(Outcome::Cloned { bytes });
                }
                Err(e) => tracing::debug!(offset, "clone rejected: {}", e),
            }
        }

        let bytes = self.copy_from(&src, source)?;
        tracing::debug!(offset, bytes, "copied");
        Ok(Outcome::Copied { bytes })
    }

    fn end_of_target(&mut self) -> Result<u64> {
        self.target
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::new(Op::Seek, &self.path, e))
    }

    /// Copy all of `src` to the target's current write position. Each call
    /// asks for exactly what is still outstanding.
    fn copy_from(&mut self, mut src: &File, source: &Path) -> Result<u64> {
        let seek_err = |e: std::io::Error| Error::new(Op::Seek, source, e);
        let len = src.seek(SeekFrom::End(0)).map_err(seek_err)?;
        src.seek(SeekFrom::Start(0)).map_err(seek_err)?;

        let mut copier = Copier::new();
        let mut remaining = len;
        while remaining > 0 {
            let want = usize::try_from(remaining).unwrap_or(usize::MAX);
            let n = copier
                .copy_chunk(src, &self.target, want)
                .map_err(|e| Error::new(Op::FallbackCopy, source, e))?;
            if n == 0 {
                return Err(Error::short_copy(source, remaining));
            }
            remaining -= n as u64;
        }
        Ok(len)
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Append each path in `sources` in order. Empty paths are skipped, the same
/// as blank lines in `run`.
pub fn append_all<I, P>(engine: &mut Engine, sources: I) -> Result<Report>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut report = Report::default();
    for source in sources {
        let source = source.as_ref();
        if source.as_os_str().is_empty() {
            report.skipped += 1;
            continue;
        }
        report.record(engine.append(source)?);
    }
    Ok(report)
}
