use dirc::areas::index::Index;
use dirc::artifacts::index::index_entry::ENTRY_BLOCK;
use dirc::artifacts::index::stage::Stage;
use pretty_assertions::assert_eq;
use sha1::{Digest, Sha1};

mod common;

#[test]
fn empty_index_round_trips_to_the_canonical_32_bytes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    repository.index_mut().rehydrate()?;
    repository.index_mut().write_updates()?;

    let on_disk = std::fs::read(repository.index().path())?;

    let header = b"\x44\x49\x52\x43\x00\x00\x00\x02\x00\x00\x00\x00";
    let mut expected = header.to_vec();
    expected.extend_from_slice(&Sha1::digest(header));

    assert_eq!(on_disk, expected);
    assert_eq!(on_disk.len(), 32);

    Ok(())
}

#[test]
fn missing_index_file_reads_as_a_fresh_empty_index() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    repository.index_mut().rehydrate()?;

    assert_eq!(repository.index().entry_count(), 0);
    assert_eq!(repository.index().version(), 2);
    assert!(!repository.index().path().exists());

    Ok(())
}

#[test]
fn staging_a_file_records_mode_size_and_blob_hash() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;

    let entry = repository.index().get(&path).expect("entry missing");
    assert_eq!(entry.metadata.mode.as_u32(), 0o100644);
    assert_eq!(entry.metadata.size, 6);
    assert_eq!(
        entry.oid.as_ref(),
        "ce013625030ba8dba906f756967f9e9ca394464a"
    );
    assert_eq!(entry.stage(), Stage::Zero);

    // 12-byte header + 62 fixed + 5 name + 5 padding + 20 trailer
    repository.index_mut().write_updates()?;
    let on_disk = std::fs::read(repository.index().path())?;
    assert_eq!(on_disk.len(), 104);

    Ok(())
}

#[test]
fn written_index_reads_back_entry_for_entry() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    for _ in 0..5 {
        let path = common::write_file(&dir, &common::random_file_name(), &common::random_content());
        repository.add_file(&path, &common::add_options())?;
    }
    repository.index_mut().write_updates()?;

    let written: Vec<_> = repository.index().entries().cloned().collect();

    let mut reread = Index::new(repository.index().path().to_path_buf().into_boxed_path());
    reread.rehydrate()?;
    let read_back: Vec<_> = reread.entries().cloned().collect();

    assert_eq!(read_back.len(), written.len());
    for (read, wrote) in read_back.iter().zip(&written) {
        assert_eq!(read.path, wrote.path);
        assert_eq!(read.oid, wrote.oid);
        assert_eq!(read.metadata, wrote.metadata);
        assert_eq!(read.flags, wrote.flags);
    }

    Ok(())
}

#[test]
fn write_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    for name in ["b.txt", "a.txt", "dir/nested.txt"] {
        let path = common::write_file(&dir, name, &common::random_content());
        repository.add_file(&path, &common::add_options())?;
    }

    let mut first = Vec::new();
    repository.index_mut().write_to(&mut first)?;
    let mut second = Vec::new();
    repository.index_mut().write_to(&mut second)?;

    assert_eq!(first, second);

    Ok(())
}

#[test]
fn trailer_is_the_sha1_of_the_preceding_bytes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, &common::random_file_name(), &common::random_content());
    repository.add_file(&path, &common::add_options())?;

    let mut buffer = Vec::new();
    repository.index_mut().write_to(&mut buffer)?;

    let (body, trailer) = buffer.split_at(buffer.len() - 20);
    assert_eq!(trailer, Sha1::digest(body).as_slice());

    Ok(())
}

#[test]
fn entries_are_stored_in_path_then_stage_order() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    // deliberately staged out of order; "dir.txt" must sort before "dir/a"
    // because '.' < '/' in byte order
    for name in ["dir/a", "dir.txt", "b", "a"] {
        let path = common::write_file(&dir, name, &common::random_content());
        repository.add_file(&path, &common::add_options())?;
    }

    let paths: Vec<_> = repository
        .index()
        .entries()
        .map(|e| e.path.as_str().to_string())
        .collect();
    assert_eq!(paths, vec!["a", "b", "dir.txt", "dir/a"]);

    let entries: Vec<_> = repository.index().entries().collect();
    for pair in entries.windows(2) {
        assert!((&pair[0].path, pair[0].stage()) < (&pair[1].path, pair[1].stage()));
    }

    Ok(())
}

#[test]
fn every_entry_occupies_a_multiple_of_eight_bytes() -> Result<(), Box<dyn std::error::Error>> {
    use dirc::artifacts::objects::object::Packable;

    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    for length in 1..=24 {
        let name = "x".repeat(length);
        let path = common::write_file(&dir, &name, "content");
        repository.add_file(&path, &common::add_options())?;
    }

    for entry in repository.index().entries() {
        let bytes = entry.serialize()?;
        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);

        let padding = bytes.len() - 62 - entry.path.len();
        assert!((1..=ENTRY_BLOCK).contains(&padding));
    }

    Ok(())
}

#[test]
fn corrupted_signature_aborts_the_load() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    repository.index_mut().write_updates()?;

    let index_path = repository.index().path().to_path_buf();
    let mut bytes = std::fs::read(&index_path)?;
    bytes[0] = b'X';
    std::fs::write(&index_path, &bytes)?;

    let error = repository.index_mut().rehydrate().unwrap_err();
    assert!(error.to_string().contains("signature"));

    Ok(())
}

#[test]
fn version_4_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let header = b"DIRC\x00\x00\x00\x04\x00\x00\x00\x00";
    let mut bytes = header.to_vec();
    bytes.extend_from_slice(&Sha1::digest(header));
    std::fs::write(repository.index().path(), &bytes)?;

    let error = repository.index_mut().rehydrate().unwrap_err();
    assert!(error.to_string().contains("not supported"));

    Ok(())
}

#[test]
fn corrupted_trailer_fails_strict_load_but_not_permissive()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    repository.index_mut().write_updates()?;

    let index_path = repository.index().path().to_path_buf();
    let mut bytes = std::fs::read(&index_path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&index_path, &bytes)?;

    assert!(repository.index_mut().rehydrate().is_err());

    repository.index_mut().rehydrate_unverified()?;
    assert_eq!(repository.index().entry_count(), 1);

    Ok(())
}

#[test]
fn skip_worktree_round_trips_through_a_version_3_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    repository.index_mut().set_skip_worktree(&path, true)?;

    assert_eq!(repository.index().version(), 3);
    repository.index_mut().write_updates()?;

    let mut reread = Index::new(repository.index().path().to_path_buf().into_boxed_path());
    reread.rehydrate()?;

    assert_eq!(reread.version(), 3);
    let entry = reread.get(&path).expect("entry missing");
    assert!(entry.skip_worktree());
    assert!(entry.flags.extended());

    Ok(())
}

#[test]
fn a_stale_lock_file_blocks_writing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let lock_path = repository.index().path().with_file_name("index.lock");
    std::fs::write(&lock_path, b"")?;

    let error = repository.index_mut().write_updates().unwrap_err();
    assert!(error.to_string().contains("lock"));

    // the stale lock is left for the operator to inspect
    assert!(lock_path.exists());

    Ok(())
}
