//! Rotating File Logger
//!
//! ----------------------------------------------------------------------------
//!
//! このクレートは、プロセス内で使用する構造化ロガーを提供する。
//! ロガーは、レベルで絞り込んだレコードを整形器で1行に整形して、出力先に書き込む。
//!
//! ファイルに出力する場合は、`FileLogging`にロガーを登録する。
//! `FileLogging`は、以下の処理をそれぞれ別のスレッドで定期的に実行する。
//!
//! - 現在のログファイルが指定されたサイズに達したとき、新しいファイルに切り替え、
//!   登録されているすべてのロガーの出力先を新しいファイルに変更する
//! - 指定された期間より古いログファイルを削除する
//!
//! ログファイル名は`{接頭語}_{YYYYMMDD}_{HHMMSS}.log`の形式である。
//! 日時のオフセットは`RotationPolicy::with_utc_offset`で指定する。指定しない場合は
//! ローカル時刻のオフセットを使用するが、Unix系のOSで複数のスレッドが動作している
//! プロセスではオフセットを取得できず、UTCになる。
//!
//! ```no_run
//! use rotating_file_logger::{info, FileLogging, RotationPolicy};
//!
//! let logging = FileLogging::new(RotationPolicy::new("/var/log/app", "app"))?;
//! logging.start()?;
//!
//! let logger = logging.logger("http");
//! info!(logger, "listening on {}", 8080);
//! logger.tag("db").warn("slow query");
//!
//! logging.stop()?;
//! # Ok::<(), rotating_file_logger::Error>(())
//! ```

#[macro_use]
mod macros;

pub mod bridge;
pub mod buffer_pool;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod formatter;
pub mod global;
pub mod level;
pub mod logger;
pub mod output;
pub mod registry;
pub mod rotating;

pub use bridge::LoggerMakeWriter;
pub use buffer_pool::BufferPool;
pub use clock::CachedClock;
pub use config::{LogConfig, RotationPolicy};
pub use context::FileLogging;
pub use error::{Error, Result};
pub use formatter::{DefaultFormatter, FormatRequest, Formatter};
pub use global::{global, set_global};
pub use level::Level;
pub use logger::{Logger, LoggerBuilder, LoggerId, Record};
pub use output::{LogOutput, MemoryOutput, SharedFile};
pub use registry::Registry;
pub use rotating::{ExpireReport, LogFile, RotateOutcome, RotatingFileOutput};

/// クレート内部の診断を出力する`tracing`のターゲット
pub(crate) const LOG_TARGET: &str = "rotating_file_logger";
