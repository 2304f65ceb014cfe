use std::{
    env, fs,
    io::{self, Write},
    path::Path,
    process::{Command, Output},
};

use rotating_file_logger::{fatal, FormatRequest, Level, LogOutput, Logger};
use tempfile::TempDir;

/// 子プロセスで実行する処理を指定する環境変数
const CHILD_MODE: &str = "ROTATING_FILE_LOGGER_FATAL_MODE";
const CHILD_PATH: &str = "ROTATING_FILE_LOGGER_FATAL_PATH";

fn bare(request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
    writeln!(buf, "{}", request.message)
}

/// 常に書き込みに失敗する出力先
struct Broken;

impl Write for Broken {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "device gone"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "device gone"))
    }
}

impl LogOutput for Broken {}

/// このテストを子プロセスで実行する。
fn run_child(test_name: &str, mode: &str, path: &Path) -> Output {
    Command::new(env::current_exe().unwrap())
        .args(["--exact", test_name, "--nocapture", "--test-threads=1"])
        .env(CHILD_MODE, mode)
        .env(CHILD_PATH, path)
        .output()
        .unwrap()
}

/// 子プロセスとして起動された場合は、`fatal!`を呼び出して終了する。
fn fatal_in_child() {
    let Ok(mode) = env::var(CHILD_MODE) else {
        return;
    };
    let path = env::var_os(CHILD_PATH).unwrap();

    let builder = Logger::builder("fatal").level(Level::Error).formatter(bare);
    let logger = match mode.as_str() {
        "file" => builder
            .output(
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .unwrap(),
            )
            .build(),
        _ => builder.output(Broken).build(),
    };
    fatal!(logger, "shutting down: {}", "disk full");
}

#[test]
fn fatal_exits_after_writing_record() {
    fatal_in_child();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fatal.log");
    let output = run_child("fatal_exits_after_writing_record", "file", &path);

    assert_eq!(Some(1), output.status.code());
    assert_eq!(
        "shutting down: disk full\n",
        fs::read_to_string(&path).unwrap()
    );
}

#[test]
fn fatal_exits_even_when_write_fails() {
    fatal_in_child();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unused.log");
    let output = run_child("fatal_exits_even_when_write_fails", "broken", &path);

    assert_eq!(Some(1), output.status.code());
    assert!(!path.exists());
}
