//! File system access used by the resolver and the combiner.
//!
//! Everything that touches the disk goes through [`FileSystem`], so the whole
//! pipeline can also run against [`MemoryFileSystem`].

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use glob::Pattern;
use parking_lot::Mutex;

/// The file operations the resolver and combiner need.
pub trait FileSystem {
    /// List the files in `dir` whose names start with `prefix`.
    fn find(&self, dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>>;

    /// Check whether a file exists.
    fn exists(&self, path: &Path) -> bool;

    /// Length of a file in bytes.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Read at most `limit` bytes from the start of a file.
    fn read_prefix(&self, path: &Path, limit: usize) -> io::Result<Vec<u8>>;

    /// Copy a file, replacing `to` if it exists.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create (or truncate) a file for writing.
    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>>;
}

/// The real file system.
///
/// Files are opened with the standard library defaults, which on Windows share
/// read access, so a running game client can keep streaming the fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn find(&self, dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
        let dir_pattern = Pattern::escape(&dir.to_string_lossy());
        let pattern = Path::new(&dir_pattern).join(format!("{}*", Pattern::escape(prefix)));

        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(io::Error::from)?;
            if path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn read_prefix(&self, path: &Path, limit: usize) -> io::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(limit);
        File::open(path)?.take(limit as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>> {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

/// An in-memory file system.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileSystem {
    /// Create an empty file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.into(), data.into());
    }

    /// Remove a file, returning its contents.
    pub fn remove(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().remove(path)
    }

    /// Contents of a file.
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// All file paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )
    }
}

impl FileSystem for MemoryFileSystem {
    fn find(&self, dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|path| path.parent() == Some(dir))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(prefix))
            })
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        self.files
            .lock()
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| Self::not_found(path))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| Self::not_found(path))
    }

    fn read_prefix(&self, path: &Path, limit: usize) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .map(|data| data[..data.len().min(limit)].to_vec())
            .ok_or_else(|| Self::not_found(path))
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let data = self.read(from)?;
        self.insert(to, data);
        Ok(())
    }

    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>> {
        self.insert(path, Vec::new());
        Ok(Box::new(MemoryWriter {
            files: &self.files,
            path: path.to_path_buf(),
        }))
    }
}

/// Appends to a [`MemoryFileSystem`] entry as it is written.
struct MemoryWriter<'a> {
    files: &'a Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    path: PathBuf,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.files
            .lock()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
