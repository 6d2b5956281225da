//! Profile integrity checking - content hashing over a directory tree

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{HarnessError, HarnessResult};

/// Digest of a directory tree's structure and contents.
///
/// Two trees with identical relative paths and identical byte content hash
/// equal; any added, removed, renamed, or modified entry changes the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHash(String);

impl DirectoryHash {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DirectoryHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the SHA-256 digest of everything under `root`.
///
/// Entries are sorted by relative path before being folded into the digest,
/// so traversal order never affects the result. Each entry is framed with
/// its path, a type tag, and (for files) its length, so content cannot
/// shift between files without changing the value.
pub fn hash_tree(root: impl AsRef<Path>) -> HarnessResult<DirectoryHash> {
    let root = root.as_ref();

    let mut entries = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| HarnessError::Io(e.into()))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        entries.push((rel, entry));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel, entry) in entries {
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            hasher.update(b"link\0");
            let target = std::fs::read_link(entry.path())?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"dir\0");
        } else {
            let len = entry.metadata().map_err(|e| HarnessError::Io(e.into()))?.len();
            hasher.update(b"file\0");
            hasher.update(len.to_le_bytes());

            let mut file = std::fs::File::open(entry.path())?;
            let mut buffer = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
        }
    }

    Ok(DirectoryHash(hex::encode(hasher.finalize())))
}

/// Fail with `ProfileMutated` if the two digests of `profile` differ.
pub fn assert_unchanged(
    profile: impl AsRef<Path>,
    before: &DirectoryHash,
    after: &DirectoryHash,
) -> HarnessResult<()> {
    if before == after {
        Ok(())
    } else {
        Err(HarnessError::ProfileMutated {
            profile: profile.as_ref().to_path_buf(),
            before: before.to_string(),
            after: after.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("prefs.js"), b"user_pref(\"a\", true);\n").unwrap();
        std::fs::write(dir.path().join("sub/data.bin"), b"\x00\x01\x02").unwrap();
        dir
    }

    #[test]
    fn test_retraversal_is_invariant() {
        let dir = scratch_tree();
        let first = hash_tree(dir.path()).unwrap();
        let second = hash_tree(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_content_change_is_detected() {
        let dir = scratch_tree();
        let before = hash_tree(dir.path()).unwrap();
        std::fs::write(dir.path().join("prefs.js"), b"user_pref(\"a\", false);\n").unwrap();
        let after = hash_tree(dir.path()).unwrap();
        assert_ne!(before, after);

        let err = assert_unchanged(dir.path(), &before, &after).unwrap_err();
        assert!(matches!(err, HarnessError::ProfileMutated { .. }));
    }

    #[test]
    fn test_rename_is_detected() {
        let dir = scratch_tree();
        let before = hash_tree(dir.path()).unwrap();
        std::fs::rename(dir.path().join("prefs.js"), dir.path().join("prefs2.js")).unwrap();
        let after = hash_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_same_content_different_trees_hash_equal() {
        let a = scratch_tree();
        let b = scratch_tree();
        assert_eq!(hash_tree(a.path()).unwrap(), hash_tree(b.path()).unwrap());
    }
}
