use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
};

/// Whole-file storage used by the cleaner.
///
/// Kept synchronous and tiny so tests can swap in an in-memory store.
pub trait FileStore: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Replace the whole file.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Append to the file, creating it if needed. Never truncates.
    fn append(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Create a new file; fails with `AlreadyExists` instead of overwriting.
    fn create_new(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsStore;

impl FileStore for FsStore {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn create_new(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}
