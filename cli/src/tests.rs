use super::*;
use tempfile::tempdir;

/// Parses `args`, pinning the timezone so a host `TZ` cannot leak in.
fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["hydrograph"];
    argv.extend_from_slice(args);
    if !args.contains(&"--timezone") {
        argv.extend(["--timezone", "America/Montreal"]);
    }
    Cli::parse_from(argv)
}

#[test]
fn test_station_number_builds_url() {
    let cli = parse(&["--station-number", "043301", "--graph-url", ""]);
    let config = cli.config().unwrap();

    assert_eq!(
        config.graph_url,
        "https://www.cehq.gouv.qc.ca/suivihydro/graphique.asp?noStation=043301"
    );
}

#[test]
fn test_graph_url_overrides_station() {
    let cli = parse(&[
        "--station-number",
        "043301",
        "--graph-url",
        "https://example.org/graph",
    ]);

    assert_eq!(cli.config().unwrap().graph_url, "https://example.org/graph");
}

#[test]
fn test_invalid_station_is_rejected() {
    let cli = parse(&["--station-number", "03 03", "--graph-url", ""]);

    assert!(matches!(cli.config(), Err(ConfigError::Station(_))));
}

#[test]
fn test_check_stale_flag() {
    assert!(parse(&["--check-stale"]).check_stale);
}

#[test]
fn test_paths_from_flags() {
    let cli = parse(&[
        "--status-file",
        "/tmp/state.json",
        "--output-dir",
        "/tmp/graphs",
        "--backup-dir",
        "/tmp/backup",
        "--backup-script",
        "/tmp/backup.sh",
    ]);
    let config = cli.config().unwrap();

    assert_eq!(config.status_file, PathBuf::from("/tmp/state.json"));
    assert_eq!(config.public_status_file(), PathBuf::from("/tmp/graphs/last_success.json"));
    assert_eq!(config.backup_dir, PathBuf::from("/tmp/backup"));
    assert_eq!(config.backup_script, PathBuf::from("/tmp/backup.sh"));
}

#[test]
fn test_timezone_is_parsed() {
    let cli = parse(&["--timezone", "Europe/Paris"]);

    assert_eq!(cli.config().unwrap().timezone, chrono_tz::Europe::Paris);
}

#[test]
fn test_unknown_timezone_is_rejected() {
    let cli = parse(&["--timezone", "Mars/Olympus_Mons"]);

    assert!(matches!(cli.config(), Err(ConfigError::Timezone(_))));
}

mod settings {
    use super::*;

    #[test]
    fn test_retry_flags_override_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("hydrograph.toml");
        std::fs::write(
            &path,
            "[capture]\nretry_count = 7\nretry_delay_secs = 30\nstale_threshold_hours = 6\n",
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--retry-count",
            "2",
            "--retry-delay-secs",
            "5",
        ]);
        let capture = cli.config().unwrap().settings.capture;

        assert_eq!(capture.retry_count, 2);
        assert_eq!(capture.retry_delay_secs, 5);
        assert_eq!(capture.stale_threshold_hours, 6);
    }

    #[test]
    fn test_missing_file_means_defaults() {
        let temp = tempdir().unwrap();
        let cli = parse(&[
            "--config",
            temp.path().join("absent.toml").to_str().unwrap(),
            "--retry-count",
            "3",
            "--retry-delay-secs",
            "10",
        ]);

        assert_eq!(cli.config().unwrap().settings, Settings::default());
    }

    #[test]
    fn test_zero_retry_count_is_repaired() {
        let cli = parse(&["--retry-count", "0"]);

        assert_eq!(cli.config().unwrap().settings.capture.retry_count, 3);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("hydrograph.toml");
        std::fs::write(&path, "[capture\n").unwrap();

        let cli = parse(&["--config", path.to_str().unwrap()]);

        assert!(matches!(cli.config(), Err(ConfigError::Settings(_))));
    }
}
