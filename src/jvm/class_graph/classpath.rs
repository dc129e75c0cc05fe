use super::{ClassInfo, ClassLookup};
use crate::jvm::class_file::ClassFile;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Mutex;
use zip::result::{ZipError, ZipResult};
use zip::ZipArchive;

/// Lookup of classes inside library archives (eg. the dependencies of the JAR being processed)
///
/// Archives are searched in the order they were added. Entries that can't be read or parsed are
/// treated as missing.
pub struct LibraryClasses<R: Read + Seek> {
    archives: Vec<Mutex<ZipArchive<R>>>,
}

impl LibraryClasses<File> {
    /// Open library archives from disk
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> ZipResult<LibraryClasses<File>> {
        let mut libraries = LibraryClasses::new();
        for path in paths {
            let file = File::open(path.as_ref())?;
            libraries.add(file)?;
        }
        Ok(libraries)
    }
}

impl<R: Read + Seek> LibraryClasses<R> {
    pub fn new() -> LibraryClasses<R> {
        LibraryClasses { archives: vec![] }
    }

    pub fn add(&mut self, reader: R) -> ZipResult<()> {
        self.archives.push(Mutex::new(ZipArchive::new(reader)?));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    fn read_class(archive: &Mutex<ZipArchive<R>>, entry_name: &str) -> Option<Vec<u8>> {
        let mut archive = archive.lock().ok()?;
        let mut file = match archive.by_name(entry_name) {
            Ok(file) if file.is_file() => file,
            Ok(_) | Err(ZipError::FileNotFound) => return None,
            Err(err) => {
                log::debug!("Failed to read {} from library: {}", entry_name, err);
                return None;
            }
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes).ok()?;
        Some(bytes)
    }
}

impl<R: Read + Seek> Default for LibraryClasses<R> {
    fn default() -> Self {
        LibraryClasses::new()
    }
}

impl<R: Read + Seek + Send> ClassLookup for LibraryClasses<R> {
    fn lookup(&self, name: &str) -> Option<ClassInfo> {
        let entry_name = format!("{}.class", name);
        self.archives.iter().find_map(|archive| {
            let bytes = Self::read_class(archive, &entry_name)?;
            match ClassFile::parse(&bytes).and_then(|class| ClassInfo::from_class(&class)) {
                Ok(info) => Some(info),
                Err(err) => {
                    log::debug!("Ignoring library class {}: {}", name, err);
                    None
                }
            }
        })
    }
}
