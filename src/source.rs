use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Error, Result};

/// A read-only memory map of the input file.
///
/// Lines handed to the pipeline borrow from the map, so no line is copied
/// until a worker turns it into a record.
pub struct MappedFile {
    path: PathBuf,
    // Zero-length files cannot be mapped.
    mmap: Option<Mmap>,
}

impl MappedFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?
            .len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only and the input is not expected to be
            // truncated while a run is in progress.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|source| Error::Map {
                path: path.clone(),
                source,
            })?;
            Some(mmap)
        };
        tracing::debug!(?path, bytes = len, "mapped input");
        Ok(MappedFile { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn lines(&self) -> Lines<'_> {
        lines(self.bytes())
    }
}

/// Splits `data` into lines on `\n`, trimming trailing whitespace (and so any
/// `\r`). A final line without a newline is still yielded.
pub fn lines(data: &[u8]) -> Lines<'_> {
    Lines { data, offset: 0 }
}

#[derive(Debug, Clone)]
pub struct Lines<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let start = self.offset;
        let end = self.data[start..]
            .iter()
            .position(|&x| x == b'\n')
            .map(|x| start + x)
            .unwrap_or(self.data.len());
        self.offset = end + 1;
        Some(self.data[start..end].trim_ascii_end())
    }
}
