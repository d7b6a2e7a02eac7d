// src/conffile/hash.rs

//! Content hashes of conffiles
//!
//! Hashes are lowercase hex MD5, the form the packaging ecosystem records.
//! A missing file hashes to [`NONEXISTENT_HASH`]; a file that cannot be
//! read hashes to [`EMPTY_HASH`], which never matches a real digest and
//! therefore counts as locally modified.

use crate::pkg::{EMPTY_HASH, NONEXISTENT_HASH};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::Path;
use tracing::warn;

/// Hash the file at `path`
pub fn file_hash(package: &str, path: &Path) -> String {
    match try_hash(path) {
        Ok(hash) => hash,
        Err(e) if e.kind() == ErrorKind::NotFound => NONEXISTENT_HASH.to_string(),
        Err(e) => {
            warn!(
                "{}: unable to open conffile {} for hash: {}",
                package,
                path.display(),
                e
            );
            EMPTY_HASH.to_string()
        }
    }
}

fn try_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty");
        fs::write(&empty, b"").unwrap();
        assert_eq!(file_hash("foo", &empty), "d41d8cd98f00b204e9800998ecf8427e");

        let abc = dir.path().join("abc");
        fs::write(&abc, b"abc").unwrap();
        assert_eq!(file_hash("foo", &abc), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_sentinels() {
        let dir = TempDir::new().unwrap();
        assert_eq!(file_hash("foo", &dir.path().join("missing")), NONEXISTENT_HASH);

        // A directory opens but cannot be read
        assert_eq!(file_hash("foo", dir.path()), EMPTY_HASH);
    }
}
