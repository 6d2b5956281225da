//! Integrity checker tests against realistic profile-shaped trees

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use test_case::test_case;

use veilcheck::hash_tree;

/// Lay out a small profile-shaped tree.
fn profile_fixture() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    let root = dir.path();

    fs::create_dir_all(root.join("extensions")).expect("mkdir extensions");
    fs::create_dir_all(root.join("storage/default")).expect("mkdir storage");

    fs::write(
        root.join("prefs.js"),
        b"user_pref(\"network.proxy.type\", 1);\nuser_pref(\"privacy.resistFingerprinting\", true);\n",
    )
    .expect("write prefs.js");
    fs::write(root.join("extensions/blocker.xpi"), vec![0x50, 0x4b, 0x03, 0x04])
        .expect("write xpi");
    fs::write(root.join("storage/default/ls.sqlite"), b"SQLite format 3\0")
        .expect("write sqlite");

    dir
}

fn apply_mutation(root: &Path, kind: &str) {
    match kind {
        "modify-content" => {
            fs::write(root.join("prefs.js"), b"user_pref(\"network.proxy.type\", 0);\n")
                .expect("modify prefs.js");
        }
        "add-file" => {
            fs::write(root.join("places.sqlite"), b"SQLite format 3\0").expect("add file");
        }
        "remove-file" => {
            fs::remove_file(root.join("extensions/blocker.xpi")).expect("remove file");
        }
        "rename-file" => {
            fs::rename(
                root.join("extensions/blocker.xpi"),
                root.join("extensions/blocker2.xpi"),
            )
            .expect("rename file");
        }
        "add-empty-dir" => {
            fs::create_dir(root.join("cache2")).expect("add dir");
        }
        other => panic!("unknown mutation: {}", other),
    }
}

#[test]
fn unchanged_tree_hashes_equal_across_traversals() {
    let profile = profile_fixture();
    let first = hash_tree(profile.path()).expect("first hash");
    let second = hash_tree(profile.path()).expect("second hash");
    assert_eq!(first, second);
}

#[test]
fn identically_built_trees_hash_equal() {
    // Two fixtures created independently (and so with different inode and
    // mtime history) must still agree: only paths and bytes matter.
    let a = profile_fixture();
    let b = profile_fixture();
    assert_eq!(
        hash_tree(a.path()).expect("hash a"),
        hash_tree(b.path()).expect("hash b")
    );
}

#[test_case("modify-content")]
#[test_case("add-file")]
#[test_case("remove-file")]
#[test_case("rename-file")]
#[test_case("add-empty-dir")]
fn mutation_changes_the_digest(kind: &str) {
    let profile = profile_fixture();
    let before = hash_tree(profile.path()).expect("hash before");

    apply_mutation(profile.path(), kind);

    let after = hash_tree(profile.path()).expect("hash after");
    assert_ne!(before, after, "mutation {:?} went undetected", kind);
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let gone = dir.path().join("never-created");
    assert!(hash_tree(&gone).is_err());
}

#[test]
fn digest_is_hex_encoded_sha256() {
    let profile = profile_fixture();
    let digest = hash_tree(profile.path()).expect("hash");
    assert_eq!(digest.as_hex().len(), 64);
    assert!(digest.as_hex().chars().all(|c| c.is_ascii_hexdigit()));
}
