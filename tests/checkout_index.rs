use dirc::areas::checkout::{CheckoutIndexOptions, CheckoutStage};
use dirc::artifacts::index::entry_mode::EntryMode;
use dirc::artifacts::index::stage::Stage;
use pretty_assertions::assert_eq;
use std::os::unix::fs::PermissionsExt;

mod common;

fn force() -> CheckoutIndexOptions {
    CheckoutIndexOptions {
        force: true,
        ..Default::default()
    }
}

#[test]
fn checkout_restores_a_deleted_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    std::fs::remove_file(dir.path().join("a.txt"))?;

    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&CheckoutIndexOptions::default(), &[path], &mut out, &mut err)?;

    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt"))?, "hello\n");
    assert!(err.is_empty());

    Ok(())
}

#[test]
fn checkout_skips_a_clean_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;

    let before = std::fs::metadata(dir.path().join("a.txt"))?.modified()?;

    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&CheckoutIndexOptions::default(), &[path], &mut out, &mut err)?;

    let after = std::fs::metadata(dir.path().join("a.txt"))?.modified()?;
    assert_eq!(before, after);
    assert!(err.is_empty());

    Ok(())
}

#[test]
fn checkout_reports_an_existing_dirty_file_without_force() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    common::write_file(&dir, "a.txt", "edited locally\n");

    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(
        &CheckoutIndexOptions::default(),
        &[path],
        &mut out,
        &mut err,
    )?;

    assert!(String::from_utf8(err)?.contains("already exists, no checkout"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.txt"))?,
        "edited locally\n"
    );

    Ok(())
}

#[test]
fn force_overwrites_a_dirty_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    common::write_file(&dir, "a.txt", "edited locally\n");

    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&force(), &[path], &mut out, &mut err)?;

    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt"))?, "hello\n");
    assert!(err.is_empty());

    Ok(())
}

#[test]
fn a_directory_in_the_way_is_fatal_without_force() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "x", "blob content\n");
    repository.add_file(&path, &common::add_options())?;

    std::fs::remove_file(dir.path().join("x"))?;
    std::fs::create_dir(dir.path().join("x"))?;
    common::write_file(&dir, "x/inside.txt", "occupying\n");

    let mut out = Vec::new();
    let mut err = Vec::new();
    let error = repository
        .checkout_index(
            &CheckoutIndexOptions::default(),
            &[path.clone()],
            &mut out,
            &mut err,
        )
        .unwrap_err();
    assert!(error.to_string().contains("cannot create directory"));
    assert!(dir.path().join("x").is_dir());

    repository.checkout_index(&force(), &[path], &mut out, &mut err)?;
    assert_eq!(
        std::fs::read_to_string(dir.path().join("x"))?,
        "blob content\n"
    );

    Ok(())
}

#[test]
fn a_file_blocking_a_parent_directory_is_killed() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "dir/nested.txt", "nested\n");
    repository.add_file(&path, &common::add_options())?;

    std::fs::remove_dir_all(dir.path().join("dir"))?;
    common::write_file(&dir, "dir", "now a file\n");

    let mut out = Vec::new();
    let mut err = Vec::new();
    let error = repository
        .checkout_index(
            &CheckoutIndexOptions::default(),
            &[path.clone()],
            &mut out,
            &mut err,
        )
        .unwrap_err();
    assert!(error.to_string().contains("File exists"));

    repository.checkout_index(&force(), &[path], &mut out, &mut err)?;
    assert_eq!(
        std::fs::read_to_string(dir.path().join("dir/nested.txt"))?,
        "nested\n"
    );

    Ok(())
}

#[test]
fn checkout_all_operates_on_every_entry() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let mut names = Vec::new();
    for i in 0..4 {
        let name = format!("{i}-{}", common::random_file_name());
        let path = common::write_file(&dir, &name, &common::random_content());
        repository.add_file(&path, &common::add_options())?;
        names.push(name);
    }
    for name in &names {
        std::fs::remove_file(dir.path().join(name))?;
    }

    let all = CheckoutIndexOptions {
        all: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&all, &[], &mut out, &mut err)?;

    for name in &names {
        assert!(dir.path().join(name).is_file());
    }

    Ok(())
}

#[test]
fn mixing_all_with_named_files_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;

    let all = CheckoutIndexOptions {
        all: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    let error = repository
        .checkout_index(&all, &[path], &mut out, &mut err)
        .unwrap_err();
    assert!(error.to_string().contains("--all"));

    Ok(())
}

#[test]
fn unmerged_entries_abort_a_stage_0_checkout() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::path("f");
    for (stage, content) in [(Stage::One, "base\n"), (Stage::Two, "ours\n")] {
        let oid = common::store_blob(&repository, content);
        repository.add_stage(
            &path,
            EntryMode::Regular,
            oid,
            stage,
            content.len() as u32,
            0,
            &common::add_options(),
        )?;
    }

    let mut out = Vec::new();
    let mut err = Vec::new();
    let error = repository
        .checkout_index(
            &CheckoutIndexOptions::default(),
            &[path],
            &mut out,
            &mut err,
        )
        .unwrap_err();
    assert!(error.to_string().contains("unmerged entries"));

    Ok(())
}

#[test]
fn a_single_merge_stage_can_be_checked_out() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::path("f");
    for (stage, content) in [
        (Stage::One, "base\n"),
        (Stage::Two, "ours\n"),
        (Stage::Three, "theirs\n"),
    ] {
        let oid = common::store_blob(&repository, content);
        repository.add_stage(
            &path,
            EntryMode::Regular,
            oid,
            stage,
            content.len() as u32,
            0,
            &common::add_options(),
        )?;
    }

    let ours_only = CheckoutIndexOptions {
        stage: CheckoutStage::Single(Stage::Two),
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&ours_only, &[path], &mut out, &mut err)?;

    assert_eq!(std::fs::read_to_string(dir.path().join("f"))?, "ours\n");

    Ok(())
}

#[test]
fn no_create_skips_the_write() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    std::fs::remove_file(dir.path().join("a.txt"))?;

    let no_create = CheckoutIndexOptions {
        no_create: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&no_create, &[path], &mut out, &mut err)?;

    assert!(!dir.path().join("a.txt").exists());

    Ok(())
}

#[test]
fn a_prefix_redirects_the_output_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;

    let prefixed = CheckoutIndexOptions {
        prefix: String::from("export/"),
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&prefixed, &[path.clone()], &mut out, &mut err)?;

    assert_eq!(
        std::fs::read_to_string(dir.path().join("export/a.txt"))?,
        "hello\n"
    );
    // the original file was left alone
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt"))?, "hello\n");

    Ok(())
}

#[test]
fn update_stat_refreshes_the_entry_and_persists_the_index()
-> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "a.txt", "hello\n");
    repository.add_file(&path, &common::add_options())?;
    std::fs::remove_file(dir.path().join("a.txt"))?;

    let update = CheckoutIndexOptions {
        update_stat: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&update, &[path.clone()], &mut out, &mut err)?;

    assert!(repository.index().path().exists());
    assert!(!repository.index().is_changed());

    let entry = repository.index().get(&path).unwrap();
    let fresh = repository.workspace().stat_file(&path)?;
    assert!(entry.compare_stat(&fresh).is_ok());

    Ok(())
}

#[test]
fn checkout_preserves_the_executable_bit() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let path = common::write_file(&dir, "run.sh", "#!/bin/sh\n");
    std::fs::set_permissions(
        dir.path().join("run.sh"),
        std::fs::Permissions::from_mode(0o755),
    )?;
    repository.add_file(&path, &common::add_options())?;

    let entry = repository.index().get(&path).unwrap();
    assert_eq!(entry.metadata.mode, EntryMode::Executable);

    std::fs::remove_file(dir.path().join("run.sh"))?;
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index(&CheckoutIndexOptions::default(), &[path], &mut out, &mut err)?;

    let mode = std::fs::metadata(dir.path().join("run.sh"))?.permissions().mode();
    assert_eq!(mode & 0o111, 0o111);

    Ok(())
}

#[test]
fn stdin_driven_checkout_processes_each_listed_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let mut repository = common::init_repository(&dir);

    let first = common::write_file(&dir, "a.txt", "first\n");
    let second = common::write_file(&dir, "b.txt", "second\n");
    repository.add_file(&first, &common::add_options())?;
    repository.add_file(&second, &common::add_options())?;
    std::fs::remove_file(dir.path().join("a.txt"))?;
    std::fs::remove_file(dir.path().join("b.txt"))?;

    let input = b"a.txt\nb.txt\nmissing.txt\n" as &[u8];
    let mut out = Vec::new();
    let mut err = Vec::new();
    repository.checkout_index_from_reader(
        &CheckoutIndexOptions::default(),
        input,
        &mut out,
        &mut err,
    )?;

    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt"))?, "first\n");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("b.txt"))?,
        "second\n"
    );
    // the unknown path is simply not in the index; nothing to report
    assert!(!dir.path().join("missing.txt").exists());

    Ok(())
}
