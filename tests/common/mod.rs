#![allow(dead_code)]

use assert_fs::TempDir;
use assert_fs::fixture::{FileWriteStr, PathChild};
use bytes::Bytes;
use dirc::areas::index::UpdateIndexOptions;
use dirc::areas::repository::Repository;
use dirc::artifacts::index::index_path::IndexPath;
use dirc::artifacts::objects::object_id::ObjectId;
use fake::Fake;
use fake::faker::lorem::en::{Word, Words};

/// Options for the common "stage this file" case.
pub fn add_options() -> UpdateIndexOptions {
    UpdateIndexOptions {
        add: true,
        replace: false,
    }
}

pub fn init_repository(dir: &TempDir) -> Repository {
    Repository::init(dir.path()).expect("failed to initialize repository")
}

/// Write a working-tree file (creating parents) and return its index path.
pub fn write_file(dir: &TempDir, name: &str, content: &str) -> IndexPath {
    if let Some(parent) = std::path::Path::new(name).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir.path().join(parent)).expect("failed to create parents");
    }

    let file = dir.child(name);
    file.write_str(content).expect("failed to write file");

    IndexPath::try_parse(name).expect("invalid index path")
}

/// Stage a blob directly into the object store, bypassing the work tree.
pub fn store_blob(repository: &Repository, content: &str) -> ObjectId {
    repository
        .object_store()
        .write_blob(Bytes::copy_from_slice(content.as_bytes()))
        .expect("failed to store blob")
}

pub fn random_file_name() -> String {
    format!("{}.txt", Word().fake::<String>())
}

pub fn random_content() -> String {
    Words(5..10).fake::<Vec<String>>().join(" ")
}

pub fn path(name: &str) -> IndexPath {
    IndexPath::try_parse(name).expect("invalid index path")
}
