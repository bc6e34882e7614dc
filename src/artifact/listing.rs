//! Directory overview of a tarball, shown to reviewers in the gate

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::LaneError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn archive_error(path: &Path, err: impl std::fmt::Display) -> LaneError {
    LaneError::Archive {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Sorted directory entries inside a (optionally gzip-compressed) tarball
pub fn list_directories(path: &Path) -> Result<Vec<String>, LaneError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let gzipped = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
    file.seek(SeekFrom::Start(0))?;

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut archive = Archive::new(reader);
    let mut dirs = Vec::new();
    for entry in archive.entries().map_err(|e| archive_error(path, e))? {
        let entry = entry.map_err(|e| archive_error(path, e))?;
        if entry.header().entry_type().is_dir() {
            let name = entry.path().map_err(|e| archive_error(path, e))?;
            let name = name.to_string_lossy().trim_end_matches('/').to_string();
            if !name.is_empty() {
                dirs.push(name);
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}
