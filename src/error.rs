use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// The step of a run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    OpenTarget,
    OpenSource,
    Seek,
    FallbackCopy,
    ReadInput,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::OpenTarget => "Failed opening target",
            Op::OpenSource => "Failed opening source",
            Op::Seek => "Seek failed",
            Op::FallbackCopy => "Fallback copy failed",
            Op::ReadInput => "Failed reading source list",
        };
        f.write_str(s)
    }
}

/// Platform independent classification of a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    CrossDevice,
    Io,
    /// The copy primitive moved zero bytes while data remained.
    ShortCopy,
    Other,
}

impl ErrorKind {
    fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => ErrorKind::ShortCopy,
            _ => match err.raw_os_error() {
                Some(code) if code == EXDEV => ErrorKind::CrossDevice,
                Some(code) if code == EIO => ErrorKind::Io,
                _ if err.kind() == io::ErrorKind::Other => ErrorKind::Other,
                _ => ErrorKind::Io,
            },
        }
    }
}

#[cfg(unix)]
const EXDEV: i32 = nix::errno::Errno::EXDEV as i32;
#[cfg(unix)]
const EIO: i32 = nix::errno::Errno::EIO as i32;
#[cfg(not(unix))]
const EXDEV: i32 = 18;
#[cfg(not(unix))]
const EIO: i32 = 5;

/// A fatal failure: what was being done, to which path, and why.
#[derive(Debug)]
pub struct Error {
    pub op: Op,
    pub path: PathBuf,
    pub kind: ErrorKind,
    source: io::Error,
}

impl Error {
    pub fn new(op: Op, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self {
            op,
            path: path.as_ref().to_path_buf(),
            kind: ErrorKind::classify(&source),
            source,
        }
    }

    pub fn short_copy(path: impl AsRef<Path>, remaining: u64) -> Self {
        let source = io::Error::new(
            io::ErrorKind::WriteZero,
            format!("copy stalled with {} bytes remaining", remaining),
        );
        Self::new(Op::FallbackCopy, path, source)
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.raw_os_error()
    }

    /// Process exit status for this failure: the OS error number when one
    /// was captured, otherwise 1.
    pub fn exit_code(&self) -> u8 {
        match self.raw_os_error() {
            Some(code) if (1..=255).contains(&code) => code as u8,
            _ => 1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.op, self.path.display(), self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
