//! Reading and writing JAR archives
//!
//! An archive is handled as a flat list of [`Entry`]s: every entry is read fully into memory up
//! front, and written out again in one go at the end.

use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One entry of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_directory: bool,
    pub bytes: Vec<u8>,

    /// Entries are written back with the same method if they were stored, and deflated otherwise
    pub compression: CompressionMethod,
}

impl Entry {
    /// Regular file entry
    pub fn file(name: impl Into<String>, bytes: Vec<u8>) -> Entry {
        Entry {
            name: name.into(),
            is_directory: false,
            bytes,
            compression: CompressionMethod::Deflated,
        }
    }

    pub fn directory(name: impl Into<String>) -> Entry {
        Entry {
            name: name.into(),
            is_directory: true,
            bytes: vec![],
            compression: CompressionMethod::Stored,
        }
    }
}

/// Read every entry of an archive, in the order they appear in the central directory
pub fn read_entries<R: Read + Seek>(reader: R) -> ZipResult<Vec<Entry>> {
    let mut archive = ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx)?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        entries.push(Entry {
            name: file.name().to_owned(),
            is_directory: file.is_dir(),
            bytes,
            compression: file.compression(),
        });
    }
    Ok(entries)
}

/// Write entries out as a new archive
pub fn write_entries<W: Write + Seek>(writer: W, entries: &[Entry]) -> ZipResult<W> {
    let mut zip = ZipWriter::new(writer);
    for entry in entries {
        let compression = match entry.compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default().compression_method(compression);
        if entry.is_directory {
            zip.add_directory(entry.name.as_str(), options)?;
        } else {
            zip.start_file(entry.name.as_str(), options)?;
            zip.write_all(&entry.bytes)?;
        }
    }
    zip.finish()
}

pub fn read_jar(path: &Path) -> ZipResult<Vec<Entry>> {
    read_entries(File::open(path)?)
}

/// Write a JAR to disk
///
/// Nothing appears at `path` unless the whole archive got written: the archive is built in a
/// temporary file next to it and then renamed into place.
pub fn write_jar(path: &Path, entries: &[Entry]) -> ZipResult<()> {
    let temp_path = temporary_path(path)?;
    let result = File::create(&temp_path)
        .map_err(Into::into)
        .and_then(|file| write_entries(file, entries))
        .and_then(|file| file.sync_all().map_err(Into::into))
        .and_then(|()| fs::rename(&temp_path, path).map_err(Into::into));

    if result.is_err() {
        if let Err(err) = fs::remove_file(&temp_path) {
            log::debug!("Could not remove {}: {}", temp_path.display(), err);
        }
    }
    result
}

/// `dir/.name.tmp` for `dir/name`
fn temporary_path(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a file path", path.display()),
        )
    })?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}
