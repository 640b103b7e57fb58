use super::{run, Cli};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn test_parse_config_argument() {
    let cli = Cli::try_parse_from(["cobble", "/etc/cobble.toml"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("/etc/cobble.toml"));
    assert!(!cli.check);
}

#[test]
fn test_parse_check_flag() {
    let cli = Cli::try_parse_from(["cobble", "--check", "cobble.toml"]).unwrap();
    assert!(cli.check);
}

#[test]
fn test_check_validates_without_binding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cobble.toml");
    std::fs::write(
        &path,
        "[storage]\ndirectory = \"/srv\"\n[http]\nlisten = \"127.0.0.1\"\nport = 1\nthreads = 1\n[http.cors]\norigins = [\"*\"]\n",
    )
    .unwrap();
    let cli = Cli {
        config: path,
        check: true,
    };
    run(&cli).unwrap();
}

#[test]
fn test_check_reports_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cobble.toml");
    std::fs::write(
        &path,
        "[storage]\ndirectory = \"/srv\"\n[http]\nlisten = \"127.0.0.1\"\nport = 1\nthreads = 0\n[http.cors]\norigins = []\n",
    )
    .unwrap();
    let cli = Cli {
        config: path,
        check: true,
    };
    let err = run(&cli).unwrap_err();
    assert!(format!("{err:#}").contains("threads count must be above zero"));
}
