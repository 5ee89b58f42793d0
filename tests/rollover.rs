use std::fs;

use vortex::log::logger::{self, LoggerConfig};
use vortex::log_info;

#[test]
fn rolls_to_a_new_file_past_the_configured_size() {
    drop(env_logger::try_init());

    let dir = tempfile::tempdir().unwrap();

    logger::initialize(LoggerConfig {
        directory: dir.path().to_path_buf(),
        file_prefix: "roll".into(),
        roll_size_mb: 1,
    })
    .unwrap();

    // Each line carries enough padding to make the roll predictable without
    // depending on exact per-field encoding overhead.
    let padding = "x".repeat(200);
    for i in 0..8_000u32 {
        log_info!(i, padding.as_str());
    }

    logger::shutdown();

    let first = dir.path().join("roll1.txt");
    let second = dir.path().join("roll2.txt");
    assert!(second.exists(), "expected a second roll file to exist");

    let first_len = fs::metadata(&first).unwrap().len();
    assert!(
        first_len > 1024 * 1024,
        "first roll file should exceed the 1 MiB roll size, was {first_len} bytes"
    );
}
