use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    path::Path,
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use rotating_file_logger::{
    debug, info, log, warn, FileLogging, FormatRequest, Level, LogConfig, Logger, MemoryOutput,
    RotateOutcome, RotationPolicy,
};
use tempfile::TempDir;

fn bare(request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
    writeln!(buf, "{}", request.message)
}

fn caller_line(request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
    writeln!(buf, "{} {}", request.caller.line(), request.message)
}

fn read_lines(dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let contents = fs::read_to_string(entry.unwrap().path()).unwrap();
        lines.extend(contents.lines().map(str::to_string));
    }
    lines
}

#[test]
fn concurrent_loggers_survive_rotation() {
    const LOGGERS: usize = 4;
    const RECORDS: usize = 200;
    const HALF: usize = RECORDS / 2;
    const THREE_QUARTERS: usize = RECORDS * 3 / 4;

    let dir = TempDir::new().unwrap();
    let logging = FileLogging::new(RotationPolicy::new(dir.path(), "log").with_max_size(1))
        .unwrap()
        .with_formatter(bare);
    let loggers: Vec<Arc<Logger>> = (0..LOGGERS)
        .map(|n| logging.logger(format!("worker-{n}")))
        .collect();

    // 前半を書き込んだ後にローテーションを開始し、3/4を書き込むまでに完了させる
    let halfway = Barrier::new(LOGGERS + 1);
    let rotated = Barrier::new(LOGGERS + 1);
    let outcome = thread::scope(|scope| {
        for logger in &loggers {
            let (halfway, rotated) = (&halfway, &rotated);
            scope.spawn(move || {
                for i in 0..RECORDS {
                    if i == HALF {
                        halfway.wait();
                    }
                    if i == THREE_QUARTERS {
                        rotated.wait();
                    }
                    info!(logger, "{}-{}", logger.name(), i);
                }
            });
        }
        halfway.wait();
        let outcome = logging.rotate_check().unwrap();
        rotated.wait();
        outcome
    });

    let (previous, current) = match outcome {
        RotateOutcome::Rotated {
            previous: Some(previous),
            current,
        } => (previous, current),
        other => panic!("expected a rotation, got {other:?}"),
    };
    logging.stop().unwrap();

    let lines = read_lines(dir.path());
    let unique: HashSet<&String> = lines.iter().collect();
    assert_eq!(LOGGERS * RECORDS, lines.len());
    assert_eq!(LOGGERS * RECORDS, unique.len());
    assert_eq!(2, fs::read_dir(dir.path()).unwrap().count());
    assert!(loggers.iter().all(|logger| logger.dropped_records() == 0));

    let before = fs::read_to_string(&previous).unwrap();
    let after = fs::read_to_string(&current).unwrap();
    for logger in &loggers {
        let name = logger.name();
        for i in 0..HALF {
            let line = format!("{name}-{i}");
            assert!(before.lines().any(|l| l == line), "{line} missing before rotation");
        }
        for i in THREE_QUARTERS..RECORDS {
            let line = format!("{name}-{i}");
            assert!(after.lines().any(|l| l == line), "{line} missing after rotation");
        }
    }
}

#[test]
fn rotate_then_expire_keeps_only_current_file() {
    let dir = TempDir::new().unwrap();
    let policy = RotationPolicy::new(dir.path(), "log")
        .with_max_size(1)
        .with_max_age(Duration::ZERO);
    let logging = FileLogging::new(policy).unwrap().with_formatter(bare);
    let first = logging.logger("first");
    let second = logging.logger("second");

    for i in 0..3 {
        let logger = if i % 2 == 0 { &first } else { &second };
        logger.info(format!("record {i}"));
        let outcome = logging.rotate_check().unwrap();
        assert!(matches!(outcome, RotateOutcome::Rotated { .. }));
    }

    let files = logging.log_files().unwrap();
    assert!(files.len() >= 2);
    let mut lines = read_lines(dir.path());
    lines.sort();
    assert_eq!(vec!["record 0", "record 1", "record 2"], lines);

    let current = logging.current_path().unwrap();
    let report = logging.expire().unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(files.len() - 1, report.removed.len());

    let remaining = logging.log_files().unwrap();
    assert_eq!(1, remaining.len());
    assert_eq!(current, remaining[0].path);

    // 削除後も現在のファイルに出力できる
    second.info("after expire");
    assert_eq!("after expire\n", fs::read_to_string(&current).unwrap());
}

#[test]
fn config_driven_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config: LogConfig = serde_json::from_value(serde_json::json!({
        "enable_file": true,
        "directory": dir.path().join("logs"),
        "prefix": "svc",
        "level": "warn",
    }))
    .unwrap();

    let logging = FileLogging::from_config(config).unwrap().with_formatter(bare);
    assert_eq!(20 << 20, logging.policy().max_size());
    logging.start().unwrap();

    let logger = logging.logger("svc");
    assert_eq!(Level::Warn, logger.level());
    info!(logger, "filtered");
    warn!(logger, "kept {}", 1);

    let path = logging.current_path().unwrap();
    assert!(path.starts_with(dir.path().join("logs")));

    logging.stop().unwrap();
    logging.stop().unwrap();
    assert!(!logging.is_running());
    assert_eq!("kept 1\n", fs::read_to_string(path).unwrap());
}

#[test]
fn macros_report_call_site() {
    let output = MemoryOutput::new();
    let logger = Logger::builder("macros")
        .level(Level::Debug)
        .formatter(caller_line)
        .output(output.clone())
        .build();

    debug!(logger, "value={}", 7);
    let debug_line = line!() - 1;
    log!(logger.tag("db"), Level::Error, "tagged");
    let tagged_line = line!() - 1;
    log!(logger, Level::Trace, "filtered");

    assert_eq!(
        vec![
            format!("{debug_line} value=7"),
            format!("{tagged_line} tagged"),
        ],
        output.lines()
    );
}
