use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use quire::config::{self, CliArgs, LoadError, LogFormat};
use serial_test::serial;
use tempfile::TempDir;
use tracing::level_filters::LevelFilter;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("quire.toml");
    std::fs::write(&path, body).expect("write config file");
    path
}

fn args(config_file: &Path, rest: &[&str]) -> CliArgs {
    let mut argv = vec![
        "quire".to_string(),
        "--config-file".to_string(),
        config_file.display().to_string(),
    ];
    argv.extend(rest.iter().map(|arg| arg.to_string()));
    CliArgs::parse_from(argv)
}

const SAMPLE: &str = r#"
[logging]
level = "warn"

[render]
direct_limit = 200
standard_chunk_size = 80
standard_pacing_ms = 5
pause_recovery_timeout_ms = 250

[memory]
sampling_interval_ms = 500
warning_process_mib = 256

[cache]
max_entries = 8
max_age_secs = 0
"#;

#[test]
#[serial]
fn config_file_values_are_applied() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, SAMPLE);

    let settings = config::load(&args(&path, &["analyze", "notes.md"])).expect("settings load");

    assert_eq!(settings.logging.level, LevelFilter::WARN);
    assert_eq!(settings.render.thresholds.direct_limit, 200);
    assert_eq!(settings.render.thresholds.standard_chunk_size, 80);
    assert_eq!(settings.render.standard_pacing, Duration::from_millis(5));
    assert_eq!(
        settings.render.pause_recovery_timeout,
        Duration::from_millis(250)
    );
    assert_eq!(settings.memory.sampling_interval, Duration::from_millis(500));
    assert_eq!(settings.memory.thresholds.warning_process_mib, 256);
    assert_eq!(settings.cache.max_entries, 8);
    assert_eq!(settings.cache.max_age_secs, None);
}

#[test]
#[serial]
fn subcommand_flags_override_the_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, SAMPLE);

    let cli = args(
        &path,
        &[
            "render",
            "notes.md",
            "--interactive",
            "--log-level",
            "trace",
            "--log-json",
            "true",
        ],
    );
    let settings = config::load(&cli).expect("settings load");

    assert_eq!(settings.logging.level, LevelFilter::TRACE);
    assert_eq!(settings.logging.format, LogFormat::Json);
    assert!(settings.render.interactive);
}

#[test]
#[serial]
fn environment_overrides_the_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, SAMPLE);

    // SAFETY: serialised with every other test that reads the environment.
    unsafe { std::env::set_var("QUIRE__LOGGING__LEVEL", "error") };
    let result = config::load(&args(&path, &["chunk", "notes.md"]));
    unsafe { std::env::remove_var("QUIRE__LOGGING__LEVEL") };

    let settings = result.expect("settings load");
    assert_eq!(settings.logging.level, LevelFilter::ERROR);
    assert_eq!(settings.render.thresholds.direct_limit, 200);
}

#[test]
#[serial]
fn missing_config_file_fails_to_build() {
    let dir = TempDir::new().expect("temp dir");
    let missing = dir.path().join("absent.toml");

    let err = config::load(&args(&missing, &["analyze", "notes.md"])).expect_err("missing file");
    assert!(matches!(err, LoadError::Build(_)));
}

#[test]
#[serial]
fn invalid_values_name_their_key() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "[cache]\nmax_bytes = 0\n");

    let err = config::load(&args(&path, &["analyze", "notes.md"])).expect_err("invalid cache");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_bytes",
            ..
        }
    ));
    assert!(err.to_string().contains("cache.max_bytes"));
}
