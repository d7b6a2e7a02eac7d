// src/conffile/deref.rs

//! Follow a conffile's symlinks inside the install root
//!
//! Absolute link targets are re-rooted at the install root, relative ones
//! resolve against the directory holding the link. A chain longer than
//! [`MAX_LINK_HOPS`] is treated as a loop. `..` is folded lexically after
//! every hop and a path climbing above the install root is refused.

use crate::buffer::VarBuf;
use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub const MAX_LINK_HOPS: usize = 25;

/// Append `path` to `root`, avoiding a doubled slash for the live root
fn push_rooted(buf: &mut VarBuf, root: &Path, path: &[u8]) {
    buf.reset();
    if root != Path::new("/") {
        buf.add_path(root);
    }
    if path.first() != Some(&b'/') {
        buf.add_char(b'/');
    }
    buf.add_bytes(path);
}

/// Drop `.` and fold `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` (as recorded, relative to `root`) to the file actually used
///
/// A missing file is fine: the returned path is where it would be. Errors
/// are loops, unreadable links and things that are neither regular files
/// nor symlinks.
pub fn deref(package: &str, root: &Path, path: &str) -> Result<PathBuf> {
    let mut result = VarBuf::new();
    push_rooted(&mut result, root, path.as_bytes());
    let root = normalize(root);

    let mut hops = 0;
    loop {
        let working = normalize(result.as_path());
        if !working.starts_with(&root) {
            return Err(Error::ConffileDeref(format!(
                "{}: conffile '{}' resolves outside the install root (= '{}')",
                package,
                path,
                result.to_string_lossy()
            )));
        }
        result.reset();
        result.add_path(&working);
        debug!("deref {} working={}", path, result.to_string_lossy());

        let meta = match fs::symlink_metadata(result.as_path()) {
            Ok(meta) => meta,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(
                        "{}: unable to stat config file '{}' (= '{}'): {}",
                        package,
                        path,
                        result.to_string_lossy(),
                        e
                    );
                }
                debug!("deref {} nonexistent", path);
                return Ok(result.as_path().to_path_buf());
            }
        };

        let file_type = meta.file_type();
        if file_type.is_file() {
            debug!("deref {} -> {}", path, result.to_string_lossy());
            return Ok(result.as_path().to_path_buf());
        }

        if !file_type.is_symlink() {
            return Err(Error::ConffileDeref(format!(
                "{}: conffile '{}' is not a plain file or symlink (= '{}')",
                package,
                path,
                result.to_string_lossy()
            )));
        }

        if hops >= MAX_LINK_HOPS {
            return Err(Error::CircularLink {
                package: package.to_string(),
                path: path.to_string(),
                resolved: result.to_string_lossy(),
            });
        }
        hops += 1;

        let target = fs::read_link(result.as_path()).map_err(|e| {
            Error::ConffileDeref(format!(
                "{}: unable to readlink conffile '{}' (= '{}'): {}",
                package,
                path,
                result.to_string_lossy(),
                e
            ))
        })?;
        let target = target.as_os_str().as_bytes();
        debug!("deref readlink gave '{}'", String::from_utf8_lossy(target));

        if target.first() == Some(&b'/') {
            push_rooted(&mut result, &root, target);
        } else {
            let dir_end = result
                .as_bytes()
                .iter()
                .rposition(|&b| b == b'/')
                .ok_or_else(|| {
                    Error::ConffileDeref(format!(
                        "{}: conffile '{}' resolves to degenerate filename ('{}' is a symlink to '{}')",
                        package,
                        path,
                        result.to_string_lossy(),
                        String::from_utf8_lossy(target)
                    ))
                })?;
            result.truncate(dir_end + 1);
            result.add_bytes(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_plain_and_missing() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(root.path().join("etc/foo.conf"), "x").unwrap();

        let got = deref("foo", root.path(), "/etc/foo.conf").unwrap();
        assert_eq!(got, root.path().join("etc/foo.conf"));

        let missing = deref("foo", root.path(), "/etc/none.conf").unwrap();
        assert_eq!(missing, root.path().join("etc/none.conf"));
    }

    #[test]
    fn test_relative_and_absolute_links() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc/foo")).unwrap();
        fs::create_dir_all(root.path().join("srv")).unwrap();
        fs::write(root.path().join("srv/real.conf"), "x").unwrap();

        // Absolute target stays inside the root
        symlink("/srv/real.conf", root.path().join("etc/foo/abs.conf")).unwrap();
        // Relative target resolves next to the link
        symlink("abs.conf", root.path().join("etc/foo/rel.conf")).unwrap();

        assert_eq!(
            deref("foo", root.path(), "/etc/foo/rel.conf").unwrap(),
            root.path().join("srv/real.conf")
        );
    }

    #[test]
    fn test_circular_link() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        symlink("loop.conf", root.path().join("etc/loop.conf")).unwrap();

        let err = deref("foo", root.path(), "/etc/loop.conf").unwrap_err();
        assert!(matches!(err, Error::CircularLink { .. }));
    }

    #[test]
    fn test_chain_length_limit() {
        let root = TempDir::new().unwrap();
        let etc = root.path().join("etc");
        fs::create_dir_all(&etc).unwrap();
        fs::write(etc.join("end"), "x").unwrap();

        // 25 hops resolve
        symlink("end", etc.join("l0")).unwrap();
        for i in 1..MAX_LINK_HOPS {
            symlink(format!("l{}", i - 1), etc.join(format!("l{}", i))).unwrap();
        }
        let last = format!("/etc/l{}", MAX_LINK_HOPS - 1);
        assert_eq!(deref("foo", root.path(), &last).unwrap(), etc.join("end"));

        // 26 do not
        symlink(format!("l{}", MAX_LINK_HOPS - 1), etc.join("too-far")).unwrap();
        assert!(matches!(
            deref("foo", root.path(), "/etc/too-far"),
            Err(Error::CircularLink { .. })
        ));
    }

    #[test]
    fn test_relative_link_above_root_refused() {
        let base = TempDir::new().unwrap();
        let root = base.path().join("root");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(base.path().join("outside.conf"), "host file\n").unwrap();
        symlink("../../outside.conf", root.join("etc/foo.conf")).unwrap();

        assert!(matches!(
            deref("foo", &root, "/etc/foo.conf"),
            Err(Error::ConffileDeref(msg)) if msg.contains("outside the install root")
        ));
    }

    #[test]
    fn test_absolute_link_above_root_refused() {
        let base = TempDir::new().unwrap();
        let root = base.path().join("root");
        fs::create_dir_all(root.join("etc")).unwrap();
        symlink("/../../x", root.join("etc/foo.conf")).unwrap();

        assert!(matches!(
            deref("foo", &root, "/etc/foo.conf"),
            Err(Error::ConffileDeref(_))
        ));
    }

    #[test]
    fn test_dotdot_inside_root_allowed() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc/foo")).unwrap();
        fs::write(root.path().join("etc/real.conf"), "x").unwrap();
        symlink("../real.conf", root.path().join("etc/foo/foo.conf")).unwrap();

        assert_eq!(
            deref("foo", root.path(), "/etc/foo/foo.conf").unwrap(),
            root.path().join("etc/real.conf")
        );
    }

    #[test]
    fn test_not_a_file() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("etc/dir.conf")).unwrap();
        assert!(matches!(
            deref("foo", root.path(), "/etc/dir.conf"),
            Err(Error::ConffileDeref(_))
        ));
    }
}
