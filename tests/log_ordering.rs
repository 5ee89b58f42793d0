use std::fs;
use std::thread;

use vortex::log::logger::{self, LoggerConfig};
use vortex::log_info;

#[test]
fn four_producers_each_log_ten_thousand_lines_in_order() {
    drop(env_logger::try_init());

    let dir = tempfile::tempdir().unwrap();

    logger::initialize(LoggerConfig {
        directory: dir.path().to_path_buf(),
        file_prefix: "ordering".into(),
        roll_size_mb: 64,
    })
    .unwrap();

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u32 = 10_000;

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            thread::spawn(|| {
                for i in 0..PER_PRODUCER {
                    log_info!(i);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    logger::shutdown();

    let contents = fs::read_to_string(dir.path().join("ordering1.txt")).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), PRODUCERS * PER_PRODUCER as usize);

    let mut per_thread: std::collections::HashMap<u64, Vec<u32>> = std::collections::HashMap::new();
    for line in &lines {
        let tid = extract_tid(line);
        let value = extract_trailing_int(line);
        per_thread.entry(tid).or_default().push(value);
    }

    assert_eq!(per_thread.len(), PRODUCERS);
    for sequence in per_thread.values() {
        assert_eq!(sequence.len(), PER_PRODUCER as usize);
        for window in sequence.windows(2) {
            assert!(window[0] < window[1], "sequence not strictly increasing: {window:?}");
        }
    }
}

fn extract_tid(line: &str) -> u64 {
    // `[timestamp][LEVEL][tid][file:func:line] value`
    let rest = line.splitn(3, "][").nth(2).expect("malformed line");
    rest.split(']').next().unwrap().parse().expect("tid not numeric")
}

fn extract_trailing_int(line: &str) -> u32 {
    line.rsplit(' ').next().unwrap().parse().expect("value not numeric")
}
