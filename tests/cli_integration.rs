use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn fedsearch() -> Command {
    Command::cargo_bin("fedsearch").expect("fedsearch binary is built")
}

#[test]
fn test_help_lists_commands() -> Result<(), Box<dyn std::error::Error>> {
    fedsearch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("sources"))
        .stdout(predicate::str::contains("completions"));
    Ok(())
}

#[test]
fn test_sources_command() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("config.toml");
    fs::write(&config, "[sources]\ndisabled = [\"tpb\"]\n")?;

    fedsearch()
        .arg("--config")
        .arg(&config)
        .arg("sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("TPB"))
        .stdout(predicate::str::contains("Archive.org"))
        .stdout(predicate::str::contains("torrent-index"))
        .stdout(predicate::str::contains("disabled"));
    Ok(())
}

#[test]
fn test_bad_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let config = temp_dir.path().join("config.toml");
    fs::write(&config, "[pools]\ncloud_threads = 0\n")?;

    fedsearch()
        .arg("--config")
        .arg(&config)
        .arg("sources")
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_unknown_source_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    fedsearch()
        .args(["search", "free music", "--source", "nowhere", "--timeout-secs", "1"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_blank_query_does_not_search() -> Result<(), Box<dyn std::error::Error>> {
    fedsearch()
        .args(["search", " ... ", "--timeout-secs", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to search for"));
    Ok(())
}

#[test]
fn test_completions() -> Result<(), Box<dyn std::error::Error>> {
    fedsearch()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fedsearch"));
    Ok(())
}

#[test]
fn test_log_file_is_written() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let log = temp_dir.path().join("logs/fedsearch.log");

    fedsearch()
        .arg("--log")
        .arg(&log)
        .arg("sources")
        .assert()
        .success();
    let content = fs::read_to_string(&log)?;
    assert!(content.contains("Application started"));
    Ok(())
}
