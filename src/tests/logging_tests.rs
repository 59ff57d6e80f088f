use super::*;
use serial_test::serial;

#[test]
fn test_level_used_without_rust_log() {
    let filter = env_filter(None, "warn").unwrap();
    assert_eq!(filter.to_string(), "warn");

    let filter = env_filter(Some("  "), "debug").unwrap();
    assert_eq!(filter.to_string(), "debug");
}

#[test]
fn test_rust_log_wins_over_level() {
    let filter = env_filter(Some("ranger_provider=trace"), "info").unwrap();
    assert!(filter.to_string().contains("ranger_provider=trace"), "{}", filter);
}

#[test]
#[serial]
fn test_file_subscriber_writes_plain_text() {
    std::env::remove_var("RUST_LOG");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranger.log");

    let subscriber = subscriber("info", Some(&path)).unwrap();
    tracing::subscriber::with_default(subscriber, || {
        tracing::warn!("log file smoke test");
        tracing::debug!("below the level");
    });

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("log file smoke test"), "{}", content);
    assert!(!content.contains("below the level"), "{}", content);
    assert!(!content.contains('\u{1b}'), "no ANSI escapes in files");
}

#[test]
#[serial]
fn test_subscriber_reads_rust_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ranger.log");

    std::env::set_var("RUST_LOG", "warn");
    let subscriber = subscriber("trace", Some(&path));
    std::env::remove_var("RUST_LOG");

    tracing::subscriber::with_default(subscriber.unwrap(), || {
        tracing::debug!("filtered by RUST_LOG");
        tracing::warn!("kept by RUST_LOG");
    });

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("kept by RUST_LOG"), "{}", content);
    assert!(!content.contains("filtered by RUST_LOG"), "{}", content);
}
