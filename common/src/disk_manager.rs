//! Reads and writes fixed-size pages of a single file.
use super::api::PAGE_SIZE;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt; // Using positioned I/O for better concurrency
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Manages reading and writing pages to a file on disk.
/// This implementation uses positioned I/O (`read_at`, `write_at`) to allow
/// multiple concurrent reads and writes without a global lock on the file.
#[derive(Debug)]
pub struct DiskManager {
    db_file: File,
    path: PathBuf,
    next_page_no: AtomicUsize,
}

impl DiskManager {
    /// Opens (creating if needed) the file at `path`.
    ///
    /// With `direct_io` the file is opened with `O_DIRECT` on Linux, bypassing
    /// the OS page cache. Other platforms ignore the flag.
    pub fn new(path: impl AsRef<Path>, direct_io: bool) -> io::Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        if direct_io {
            enable_direct_io(&mut options);
        }
        let file = options.open(path)?;
        let metadata = file.metadata()?;
        let next_page_no = (metadata.len() / PAGE_SIZE as u64) as usize;

        Ok(Self {
            db_file: file,
            path: path.to_path_buf(),
            next_page_no: AtomicUsize::new(next_page_no),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a page into the provided buffer using positioned I/O.
    ///
    /// A page that was allocated but never written reads back as zeroes.
    pub fn read_page(&self, page_no: usize, data: &mut [u8]) -> io::Result<()> {
        let offset = (page_no * PAGE_SIZE) as u64;
        match self.db_file.read_exact_at(data, offset) {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                data.fill(0);
                Ok(())
            }
            result => result,
        }
    }

    /// Writes a page from the buffer into the file using positioned I/O.
    pub fn write_page(&self, page_no: usize, data: &[u8]) -> io::Result<()> {
        let offset = (page_no * PAGE_SIZE) as u64;
        self.db_file.write_all_at(data, offset)
    }

    /// Allocates a new page number at the end of the file.
    pub fn allocate_page(&self) -> usize {
        self.next_page_no.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of pages allocated so far, written or not.
    pub fn num_pages(&self) -> usize {
        self.next_page_no.load(Ordering::SeqCst)
    }

    pub fn sync(&self) -> io::Result<()> {
        self.db_file.sync_data()
    }
}

#[cfg(target_os = "linux")]
fn enable_direct_io(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.custom_flags(libc::O_DIRECT);
}

#[cfg(not(target_os = "linux"))]
fn enable_direct_io(_options: &mut OpenOptions) {
    tracing::warn!("direct I/O requested but not supported on this platform");
}
