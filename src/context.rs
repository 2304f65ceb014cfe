use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    config::{LogConfig, RotationPolicy},
    formatter::{DefaultFormatter, Formatter},
    logger::{Logger, LoggerBuilder},
    registry::Registry,
    rotating::{ExpireReport, LogFile, RotateOutcome, RotatingFileOutput},
    Error, Level, Result, LOG_TARGET,
};

/// 1つのローテーション設定を共有するロガーの実行環境
///
/// ローテーションの設定、現在のログファイル、ロガーの集合を保持する。
/// `start`でファイルサイズの確認と期限切れファイルの削除を、それぞれ別のスレッドで
/// 定期的に実行する。
pub struct FileLogging {
    policy: Arc<RotationPolicy>,
    output: Arc<RotatingFileOutput>,
    registry: Arc<Registry>,
    formatter: Arc<dyn Formatter>,
    default_level: Level,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl FileLogging {
    /// ファイル出力が有効な場合は、最初のログファイルを開く。
    pub fn new(policy: RotationPolicy) -> Result<Self> {
        let policy = Arc::new(policy);
        let output = Arc::new(RotatingFileOutput::new(Arc::clone(&policy))?);
        let registry = Arc::new(Registry::new(policy.enabled()));
        if policy.enabled() {
            output.open(&registry)?;
        }

        Ok(Self {
            policy,
            output,
            registry,
            formatter: Arc::new(DefaultFormatter::new()),
            default_level: Level::Info,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// 設定を検証して作成する。
    pub fn from_config(config: LogConfig) -> Result<Self> {
        let level = config.level;
        let mut logging = Self::new(config.into_policy()?)?;
        logging.default_level = level;

        Ok(logging)
    }

    /// `logger`で作成するロガーが共有する整形器を差し替える。
    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn output(&self) -> &RotatingFileOutput {
        &self.output
    }

    /// ロガーを作成して登録する。
    ///
    /// ファイル出力が無効な場合は、標準出力に出力するロガーを返却する。
    pub fn logger(&self, name: impl Into<String>) -> Arc<Logger> {
        self.build_logger(
            Logger::builder(name)
                .level(self.default_level)
                .shared_formatter(Arc::clone(&self.formatter)),
        )
    }

    /// ビルダーからロガーを作成して登録する。
    pub fn build_logger(&self, builder: LoggerBuilder) -> Arc<Logger> {
        let logger = Arc::new(builder.build());
        self.attach(&logger);
        logger
    }

    /// ロガーを登録して、現在のログファイルに出力するように切り替える。
    ///
    /// ファイル出力が無効な場合は何もしない。
    pub fn attach(&self, logger: &Arc<Logger>) -> bool {
        self.output.attach(&self.registry, logger)
    }

    /// ロガーの登録を解除する。
    ///
    /// 出力先は現在のログファイルのまま変更しない。
    pub fn detach(&self, logger: &Logger) -> bool {
        self.registry.detach(logger.id()).is_some()
    }

    pub fn current_path(&self) -> Option<std::path::PathBuf> {
        self.output.current_path()
    }

    pub fn log_files(&self) -> Result<Vec<LogFile>> {
        self.output.log_files()
    }

    /// ファイルサイズを確認して、必要であればローテーションする。
    pub fn rotate_check(&self) -> Result<RotateOutcome> {
        self.ensure_enabled()?;
        self.output.rotate_check(&self.registry)
    }

    /// 期限切れのログファイルを削除する。
    pub fn expire(&self) -> Result<ExpireReport> {
        self.ensure_enabled()?;
        self.output.expire()
    }

    /// 定期処理のスレッドを開始する。
    ///
    /// ファイル出力が無効な場合と、既に開始している場合は何もしない。
    pub fn start(&self) -> Result<()> {
        if !self.policy.enabled() {
            return Ok(());
        }
        let mut tasks = self.lock_tasks();
        if !tasks.is_empty() {
            return Ok(());
        }

        let output = Arc::clone(&self.output);
        let registry = Arc::clone(&self.registry);
        tasks.push(PeriodicTask::spawn(
            "log-rotate",
            self.policy.rotate_interval(),
            move || {
                if let Err(err) = output.rotate_check(&registry) {
                    tracing::warn!(
                        target: LOG_TARGET,
                        error = %err,
                        "log rotation failed, retrying on next tick"
                    );
                }
            },
        )?);

        let output = Arc::clone(&self.output);
        let expire = PeriodicTask::spawn("log-expire", self.policy.expire_interval(), move || {
            match output.expire() {
                Ok(report) => {
                    for failure in &report.failures {
                        tracing::warn!(target: LOG_TARGET, error = %failure, "failed to expire log file");
                    }
                    if !report.removed.is_empty() {
                        tracing::debug!(
                            target: LOG_TARGET,
                            removed = report.removed.len(),
                            "expired log files"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(target: LOG_TARGET, error = %err, "log expiry sweep failed");
                }
            }
        });
        match expire {
            Ok(task) => tasks.push(task),
            Err(err) => {
                // 片方だけが動いている状態にはしない
                tasks.drain(..).for_each(PeriodicTask::stop);
                return Err(err);
            }
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.lock_tasks().is_empty()
    }

    /// 定期処理を停止して、登録されているすべてのロガーを閉じる。
    ///
    /// ロガーを閉じる処理に失敗しても、残りのロガーは閉じる。
    ///
    /// # 戻り値
    ///
    /// 最初に発生したエラー。
    pub fn stop(&self) -> Result<()> {
        self.stop_tasks();

        let mut first_error = None;
        for logger in self.registry.drain() {
            if let Err(err) = logger.close() {
                tracing::warn!(
                    target: LOG_TARGET,
                    logger = logger.name(),
                    error = %err,
                    "failed to close logger"
                );
                first_error.get_or_insert(Error::Io(err));
            }
        }
        self.output.close();

        first_error.map_or(Ok(()), Err)
    }

    fn stop_tasks(&self) {
        self.lock_tasks().drain(..).for_each(PeriodicTask::stop);
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.policy.enabled() {
            Ok(())
        } else {
            Err(Error::Config("file logging is disabled".to_string()))
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<PeriodicTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for FileLogging {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

/// 一定間隔で処理を実行するスレッド
///
/// 停止用のチャネルが閉じられると終了する。
struct PeriodicTask {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    fn spawn(
        name: &str,
        interval: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        // 1回の失敗でスレッドを終了させない
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(&mut tick)) {
                            let current = thread::current();
                            tracing::error!(
                                target: LOG_TARGET,
                                task = current.name().unwrap_or_default(),
                                panic = panic_message(payload.as_ref()),
                                "periodic task panicked, continuing on next tick"
                            );
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self { stop, handle })
    }

    fn stop(self) {
        drop(self.stop);
        let name = self.handle.thread().name().map(str::to_string);
        if self.handle.join().is_err() {
            tracing::error!(target: LOG_TARGET, task = ?name, "periodic task panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::{self, Write},
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use tempfile::TempDir;

    use super::*;
    use crate::formatter::FormatRequest;

    fn bare(request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
        writeln!(buf, "{}", request.message)
    }

    #[test]
    fn test_disabled_mode_does_not_attach() {
        let logging = FileLogging::new(RotationPolicy::disabled()).unwrap();
        let logger = logging.logger("stdout");

        assert!(logging.registry().is_empty());
        assert!(logging.current_path().is_none());
        assert!(matches!(logging.rotate_check(), Err(Error::Config(_))));
        logging.start().unwrap();
        assert!(!logging.is_running());
        drop(logger);
    }

    #[test]
    fn test_logger_writes_to_current_file() {
        let dir = TempDir::new().unwrap();
        let logging = FileLogging::new(RotationPolicy::new(dir.path(), "app"))
            .unwrap()
            .with_formatter(bare);
        let logger = logging.logger("main");
        logger.info("hello");

        let path = logging.current_path().unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("app_"));
        assert_eq!("hello\n", fs::read_to_string(path).unwrap());
    }

    #[test]
    fn test_detached_logger_is_not_repointed() {
        let dir = TempDir::new().unwrap();
        let logging = FileLogging::new(RotationPolicy::new(dir.path(), "log").with_max_size(1))
            .unwrap()
            .with_formatter(bare);
        let stays = logging.logger("stays");
        let leaves = logging.logger("leaves");
        let first = logging.current_path().unwrap();

        assert!(logging.detach(&leaves));
        assert!(!logging.detach(&leaves));
        stays.info("x");
        logging.rotate_check().unwrap();
        leaves.info("old file");
        stays.info("new file");

        let second = logging.current_path().unwrap();
        assert_eq!("x\nold file\n", fs::read_to_string(first).unwrap());
        assert_eq!("new file\n", fs::read_to_string(second).unwrap());
    }

    #[test]
    fn test_periodic_task_survives_panicking_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = PeriodicTask::spawn("flaky", Duration::from_millis(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first tick fails");
            }
        })
        .unwrap();

        for _ in 0..200 {
            if ticks.load(Ordering::SeqCst) >= 3 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 3);
        assert!(!task.handle.is_finished());
        task.stop();
    }

    #[test]
    fn test_background_rotation_and_stop() {
        let dir = TempDir::new().unwrap();
        let policy = RotationPolicy::new(dir.path(), "log")
            .with_max_size(1)
            .with_rotate_interval(Duration::from_millis(20))
            .with_expire_interval(Duration::from_millis(20));
        let logging = FileLogging::new(policy).unwrap().with_formatter(bare);
        let logger = logging.logger("bg");
        let first = logging.current_path().unwrap();

        logging.start().unwrap();
        logging.start().unwrap();
        assert!(logging.is_running());
        logger.info("trigger");

        let mut rotated = false;
        for _ in 0..100 {
            if logging.current_path().as_ref() != Some(&first) {
                rotated = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(rotated);

        logging.stop().unwrap();
        assert!(!logging.is_running());
        assert!(logging.registry().is_empty());
        assert!(logging.current_path().is_none());

        logger.info("after stop");
        assert_eq!(1, logger.dropped_records());
    }
}
