use std::{
    fmt,
    io::{self, Write},
    panic::Location,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use crate::{
    buffer_pool::BufferPool,
    formatter::{DefaultFormatter, FormatRequest, Formatter},
    output::LogOutput,
    Level, LOG_TARGET,
};

static NEXT_LOGGER_ID: AtomicU64 = AtomicU64::new(1);

/// ロガーの識別子
///
/// 同じ設定のロガーであっても、インスタンスごとに異なる値を持つ。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoggerId(u64);

/// レベル別にレコードを整形して、出力先に書き込むロガー
///
/// 複数のスレッドから参照で共有される。出力先への書き込みと出力先の差し替えは、
/// ロガーごとのロックで直列化されるため、書き込み中に出力先が差し替わることはない。
///
/// 書き込みに失敗したレコードは破棄され、`dropped_records`に計上された上で、
/// `tracing`に報告される。この方針はすべてのレベルで共通。
/// `Fatal`のレコードは、書き込みの成否にかかわらずプロセスを終了させる。
pub struct Logger {
    id: LoggerId,
    name: String,
    level: AtomicU8,
    caller_depth: usize,
    formatter: Arc<dyn Formatter>,
    output: Mutex<Box<dyn LogOutput>>,
    pool: BufferPool,
    dropped: AtomicU64,
}

/// `Logger`のビルダー
pub struct LoggerBuilder {
    name: String,
    level: Level,
    caller_depth: usize,
    formatter: Option<Arc<dyn Formatter>>,
    output: Option<Box<dyn LogOutput>>,
}

impl LoggerBuilder {
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// 整形器に渡す呼び出し元の深さ
    ///
    /// 呼び出し元の位置は`#[track_caller]`で取得するため、`DefaultFormatter`はこの値を
    /// 使用しない。ラッパー関数を経由する場合に、独自の整形器で参照する。
    pub fn caller_depth(mut self, depth: usize) -> Self {
        self.caller_depth = depth;
        self
    }

    pub fn formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// 複数のロガーで整形器を共有する。
    pub fn shared_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn output(mut self, output: impl LogOutput) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            id: LoggerId(NEXT_LOGGER_ID.fetch_add(1, Ordering::Relaxed)),
            name: self.name,
            level: AtomicU8::new(self.level as u8),
            caller_depth: self.caller_depth,
            formatter: self
                .formatter
                .unwrap_or_else(|| Arc::new(DefaultFormatter::new())),
            output: Mutex::new(self.output.unwrap_or_else(|| Box::new(io::stdout()))),
            pool: BufferPool::new(),
            dropped: AtomicU64::new(0),
        }
    }
}

macro_rules! level_methods {
    ($($level:ident => $plain:ident, $formatted:ident;)*) => {
        $(
            #[track_caller]
            #[inline]
            pub fn $plain(&self, msg: impl fmt::Display) {
                self.log(Level::$level, msg)
            }

            #[track_caller]
            #[inline]
            pub fn $formatted(&self, args: fmt::Arguments<'_>) {
                self.log_fmt(Level::$level, args)
            }
        )*
    };
}

impl Logger {
    /// 標準出力に既定の形式で出力するロガーを作成する。
    pub fn new(name: impl Into<String>, level: Level) -> Logger {
        Logger::builder(name).level(level).build()
    }

    pub fn builder(name: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder {
            name: name.into(),
            level: Level::Info,
            caller_depth: 0,
            formatter: None,
            output: None,
        }
    }

    pub fn id(&self) -> LoggerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// `level`のレコードが出力されるか確認する。
    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 >= self.level.load(Ordering::Relaxed)
    }

    pub fn caller_depth(&self) -> usize {
        self.caller_depth
    }

    /// 書き込みに失敗して破棄されたレコードの数
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 出力先を差し替えて、それまでの出力先を返却する。
    ///
    /// 実行中の書き込みが完了してから差し替わる。
    pub fn set_output(&self, output: Box<dyn LogOutput>) -> Box<dyn LogOutput> {
        let mut current = self.lock_output();
        std::mem::replace(&mut *current, output)
    }

    /// 出力先を閉じる。
    ///
    /// 閉じた後に出力されたレコードは、書き込みに失敗したものとして扱う。
    pub fn close(&self) -> io::Result<()> {
        let mut previous = self.set_output(Box::new(Closed));
        previous.close()
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock_output().flush()
    }

    /// タグ付きのレコードを作成する。
    pub fn tag<'a>(&'a self, tag: &'a str) -> Record<'a> {
        Record {
            logger: self,
            tag: Some(tag),
            caller_depth: self.caller_depth,
        }
    }

    pub fn record(&self) -> Record<'_> {
        Record {
            logger: self,
            tag: None,
            caller_depth: self.caller_depth,
        }
    }

    #[track_caller]
    #[inline]
    pub fn log(&self, level: Level, msg: impl fmt::Display) {
        self.record().log(level, msg)
    }

    #[track_caller]
    #[inline]
    pub fn log_fmt(&self, level: Level, args: fmt::Arguments<'_>) {
        self.record().log_fmt(level, args)
    }

    level_methods! {
        Trace => trace, trace_fmt;
        Debug => debug, debug_fmt;
        Info => info, info_fmt;
        Warn => warn, warn_fmt;
        Error => error, error_fmt;
    }

    /// `Fatal`のレコードを出力して、プロセスを終了する。
    #[track_caller]
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        self.record().fatal(msg)
    }

    #[track_caller]
    pub fn fatal_fmt(&self, args: fmt::Arguments<'_>) -> ! {
        self.record().fatal_fmt(args)
    }

    /// 整形済みのバイト列を出力先に書き込む。
    pub(crate) fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        self.lock_output().write_all(bytes)
    }

    fn emit(
        &self,
        level: Level,
        tag: Option<&str>,
        caller_depth: usize,
        caller: &'static Location<'static>,
        message: fmt::Arguments<'_>,
    ) {
        let mut buf = self.pool.acquire();
        let request = FormatRequest {
            level,
            logger: &self.name,
            tag,
            caller,
            caller_depth,
            message,
        };
        let result = self
            .formatter
            .format(&request, &mut buf)
            .and_then(|()| self.write_bytes(&buf));
        // 書き込みが完了してからバッファを返却する
        self.pool.release(buf);

        if let Err(err) = result {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                target: LOG_TARGET,
                logger = %self.name,
                %level,
                error = %err,
                "dropped log record"
            );
        }
    }

    fn terminate(&self) -> ! {
        let _ = self.flush();
        std::process::exit(1)
    }

    fn lock_output(&self) -> MutexGuard<'_, Box<dyn LogOutput>> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("level", &self.level())
            .field("caller_depth", &self.caller_depth)
            .finish_non_exhaustive()
    }
}

/// 1回の出力を表すレコード
///
/// タグと呼び出し元の深さを指定して、ロガーと同じレベル別の出力メソッドを呼び出す。
#[derive(Clone, Copy)]
pub struct Record<'a> {
    logger: &'a Logger,
    tag: Option<&'a str>,
    caller_depth: usize,
}

impl<'a> Record<'a> {
    /// このレコードの呼び出し元の深さを変更する。
    ///
    /// `FormatRequest::caller_depth`として整形器に渡される。`DefaultFormatter`は
    /// この値を使用しないため、独自の整形器を指定した場合のみ出力に影響する。
    pub fn caller_depth(mut self, depth: usize) -> Self {
        self.caller_depth = depth;
        self
    }

    #[track_caller]
    #[inline]
    pub fn log(&self, level: Level, msg: impl fmt::Display) {
        self.log_fmt(level, format_args!("{}", msg))
    }

    #[track_caller]
    pub fn log_fmt(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.logger.enabled(level) {
            return;
        }

        self.logger
            .emit(level, self.tag, self.caller_depth, Location::caller(), args);
        if level == Level::Fatal {
            self.logger.terminate();
        }
    }

    level_methods! {
        Trace => trace, trace_fmt;
        Debug => debug, debug_fmt;
        Info => info, info_fmt;
        Warn => warn, warn_fmt;
        Error => error, error_fmt;
    }

    #[track_caller]
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        self.fatal_fmt(format_args!("{}", msg))
    }

    #[track_caller]
    pub fn fatal_fmt(&self, args: fmt::Arguments<'_>) -> ! {
        self.logger
            .emit(Level::Fatal, self.tag, self.caller_depth, Location::caller(), args);
        self.logger.terminate()
    }
}

/// 閉じられたロガーの出力先
struct Closed;

impl Write for Closed {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "log output is closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogOutput for Closed {}
