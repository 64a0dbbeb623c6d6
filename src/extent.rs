//! Extent sharing and bulk copy primitives.
//!
//! On Linux the clone is a `FICLONERANGE` ioctl and the bulk copy is
//! `copy_file_range(2)`, both driven through `nix`. Elsewhere cloning is
//! always rejected and copies go through userspace.

use std::fs::File;
use std::io::{self, Read, Write};

const BUF_SIZE: usize = 128 * 1024;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs::File;
    use std::io;
    use std::os::fd::AsRawFd;

    /// Mirrors the kernel's `struct file_clone_range`.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CloneRange {
        pub src_fd: i64,
        pub src_offset: u64,
        /// Zero means "through the end of the source".
        pub src_length: u64,
        pub dest_offset: u64,
    }

    nix::ioctl_write_ptr!(ficlonerange, 0x94, 13, CloneRange);

    pub fn clone_range(src: &File, dest: &File, dest_offset: u64) -> io::Result<()> {
        let range = CloneRange {
            src_fd: src.as_raw_fd() as i64,
            src_offset: 0,
            src_length: 0,
            dest_offset,
        };
        // SAFETY: both descriptors are borrowed from live `File`s and `range`
        // outlives the call.
        unsafe { ficlonerange(dest.as_raw_fd(), &range) }
            .map(drop)
            .map_err(io::Error::from)
    }

    pub fn kernel_copy(src: &File, dest: &File, len: usize) -> io::Result<usize> {
        nix::fcntl::copy_file_range(src, None, dest, None, len).map_err(io::Error::from)
    }

    /// Errors meaning the kernel won't do this copy in-kernel at all, as
    /// opposed to the copy itself failing.
    pub fn refuses_kernel_copy(err: &io::Error) -> bool {
        use nix::errno::Errno;

        matches!(
            err.raw_os_error().map(Errno::from_raw),
            Some(Errno::EXDEV | Errno::ENOSYS | Errno::EOPNOTSUPP | Errno::EINVAL)
        )
    }
}

#[cfg(target_os = "linux")]
pub use linux::CloneRange;

/// Share the whole of `src` into `dest` starting at `dest_offset`.
///
/// Any error is a rejection: wrong filesystem, cross-device, misaligned
/// offset, or an extent too small for the filesystem to link.
#[cfg(target_os = "linux")]
pub fn clone_range(src: &File, dest: &File, dest_offset: u64) -> io::Result<()> {
    linux::clone_range(src, dest, dest_offset)
}

#[cfg(not(target_os = "linux"))]
pub fn clone_range(_src: &File, _dest: &File, _dest_offset: u64) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "extent cloning is not available on this platform",
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPath {
    Kernel,
    Userspace,
}

/// Moves bytes from the current position of a source to the current position
/// of a destination, one call at a time.
pub struct Copier {
    path: CopyPath,
    buf: Vec<u8>,
}

impl Copier {
    pub fn new() -> Self {
        let path = if cfg!(target_os = "linux") {
            CopyPath::Kernel
        } else {
            CopyPath::Userspace
        };
        Self {
            path,
            buf: Vec::new(),
        }
    }

    pub fn userspace() -> Self {
        Self {
            path: CopyPath::Userspace,
            buf: Vec::new(),
        }
    }

    #[cfg(test)]
    fn path(&self) -> CopyPath {
        self.path
    }

    /// Copy at most `len` bytes, returning how many were moved. Zero means
    /// the source had nothing left to give.
    pub fn copy_chunk(&mut self, src: &File, dest: &File, len: usize) -> io::Result<usize> {
        #[cfg(target_os = "linux")]
        {
            if self.path == CopyPath::Kernel {
                match linux::kernel_copy(src, dest, len) {
                    Ok(n) => return Ok(n),
                    Err(e) if linux::refuses_kernel_copy(&e) => {
                        tracing::debug!("in-kernel copy refused, using userspace: {}", e);
                        self.path = CopyPath::Userspace;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.user_copy(src, dest, len)
    }

    fn user_copy(&mut self, mut src: &File, mut dest: &File, len: usize) -> io::Result<usize> {
        if self.buf.is_empty() {
            self.buf = vec![0; BUF_SIZE];
        }
        let want = len.min(self.buf.len());
        let n = loop {
            match src.read(&mut self.buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        dest.write_all(&self.buf[..n])?;
        Ok(n)
    }
}

impl Default for Copier {
    fn default() -> Self {
        Self::new()
    }
}
