//! Append-only SQL output.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use timbre_core::sql::{SqlUpdateRecord, SQL_HEADER};

/// Destination for per-track update records.
pub trait ResultSink {
    /// Append one record.
    fn append(&mut self, record: &SqlUpdateRecord) -> io::Result<()>;

    /// Push everything appended so far to durable storage.
    fn flush(&mut self) -> io::Result<()>;
}

/// Writes records as SQL text blocks.
#[derive(Debug)]
pub struct SqlSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> SqlSink<W> {
    /// Wrap a writer without emitting a header.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Wrap a writer, starting with the file header.
    pub fn with_header(mut writer: W) -> io::Result<Self> {
        writer.write_all(SQL_HEADER.as_bytes())?;
        writer.flush()?;
        Ok(Self::new(writer))
    }

    /// Records appended through this sink.
    pub const fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl SqlSink<File> {
    /// Open `path` for appending, writing the header only if the file is
    /// new or empty. Earlier runs' records are kept.
    pub fn open_append(path: &Path) -> io::Result<Self> {
        create_parent(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            Self::with_header(file)
        } else {
            Ok(Self::new(file))
        }
    }

    /// Create or truncate `path` and write the header.
    pub fn create(path: &Path) -> io::Result<Self> {
        create_parent(path)?;
        Self::with_header(File::create(path)?)
    }
}

/// A writer that can force its contents to stable storage.
pub trait Durable: Write {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Durable for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl Durable for Vec<u8> {}

impl<W: Durable> ResultSink for SqlSink<W> {
    fn append(&mut self, record: &SqlUpdateRecord) -> io::Result<()> {
        write!(self.writer, "{record}")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.sync()
    }
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
