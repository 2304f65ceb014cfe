use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use time::UtcOffset;

use crate::{Error, Level, Result};

/// ログファイル名の既定の接頭語
pub const DEFAULT_PREFIX: &str = "log";

/// 設定ファイルで指定できるファイルサイズの下限(MiB)
pub const MIN_MAX_SIZE_MB: u64 = 20;

/// ログファイルを残す既定の期間(秒)
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

const DEFAULT_INTERVAL_SECS: u64 = 5;

/// 外部から読み込むログ設定
///
/// すべての項目に既定値がある。`into_policy`で検証して`RotationPolicy`に変換する。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ファイルに出力するか。
    pub enable_file: bool,
    /// ログファイルを作成するディレクトリ。省略時は実行ファイルのディレクトリ。
    pub directory: Option<PathBuf>,
    /// ログファイル名の接頭語。
    pub prefix: String,
    /// ローテーションするファイルサイズ(MiB)。
    pub max_size_mb: u64,
    /// ログファイルを残す期間(秒)。
    pub max_age_secs: u64,
    /// ファイルサイズを確認する間隔(秒)。
    pub rotate_interval_secs: u64,
    /// 期限切れのファイルを削除する間隔(秒)。
    pub expire_interval_secs: u64,
    /// ロガーの最小レベル。
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enable_file: false,
            directory: None,
            prefix: DEFAULT_PREFIX.to_string(),
            max_size_mb: MIN_MAX_SIZE_MB,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            rotate_interval_secs: DEFAULT_INTERVAL_SECS,
            expire_interval_secs: DEFAULT_INTERVAL_SECS,
            level: Level::Info,
        }
    }
}

impl LogConfig {
    /// 設定を検証して、ローテーションの設定に変換する。
    ///
    /// ファイルサイズは`MIN_MAX_SIZE_MB`、保存期間は1秒を下限として切り上げる。
    pub fn into_policy(self) -> Result<RotationPolicy> {
        if self.rotate_interval_secs == 0 {
            return Err(Error::Config(
                "rotate_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.expire_interval_secs == 0 {
            return Err(Error::Config(
                "expire_interval_secs must be at least 1".to_string(),
            ));
        }

        let prefix = if self.prefix.is_empty() {
            DEFAULT_PREFIX.to_string()
        } else {
            self.prefix
        };
        let directory = self.directory.unwrap_or_else(default_directory);

        let policy = RotationPolicy {
            enabled: self.enable_file,
            directory,
            prefix,
            max_size: self.max_size_mb.max(MIN_MAX_SIZE_MB) << 20,
            max_age: Duration::from_secs(self.max_age_secs.max(1)),
            rotate_interval: Duration::from_secs(self.rotate_interval_secs),
            expire_interval: Duration::from_secs(self.expire_interval_secs),
            utc_offset: None,
        };
        policy.validate()?;

        Ok(policy)
    }
}

/// ローテーションの設定
///
/// ロガーが動作を開始した後は変更しない。
#[derive(Clone, Debug)]
pub struct RotationPolicy {
    enabled: bool,
    directory: PathBuf,
    prefix: String,
    max_size: u64,
    max_age: Duration,
    rotate_interval: Duration,
    expire_interval: Duration,
    utc_offset: Option<UtcOffset>,
}

impl RotationPolicy {
    /// ファイル出力を有効にした設定を作成する。
    ///
    /// ここで指定した値は、切り上げずにそのまま使用する。
    ///
    /// # 引数
    ///
    /// * directory: ファイルを作成するディレクトリ。
    /// * prefix: ファイル名の接頭語。
    pub fn new(directory: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        Self {
            enabled: true,
            directory: directory.as_ref().to_path_buf(),
            prefix: prefix.into(),
            max_size: MIN_MAX_SIZE_MB << 20,
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            rotate_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            expire_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            utc_offset: None,
        }
    }

    /// ファイル出力を無効にした設定を作成する。
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(default_directory(), DEFAULT_PREFIX)
        }
    }

    /// ローテーションするファイルサイズ(バイト)
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_rotate_interval(mut self, interval: Duration) -> Self {
        self.rotate_interval = interval;
        self
    }

    pub fn with_expire_interval(mut self, interval: Duration) -> Self {
        self.expire_interval = interval;
        self
    }

    /// ファイル名の日時に使用するオフセットを指定する。
    ///
    /// 指定しない場合は、作成時にローカル時刻のオフセットを取得する。
    /// Unix系のOSでは、複数のスレッドが動作しているプロセスでローカル時刻の
    /// オフセットを取得できず、UTCになる。
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = Some(offset);
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn rotate_interval(&self) -> Duration {
        self.rotate_interval
    }

    pub fn expire_interval(&self) -> Duration {
        self.expire_interval
    }

    pub fn utc_offset(&self) -> Option<UtcOffset> {
        self.utc_offset
    }

    /// 設定を検証する。
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("prefix must not be empty".to_string()));
        }
        if self.prefix.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "prefix `{}` must not contain a path separator",
                self.prefix
            )));
        }
        if self.rotate_interval.is_zero() || self.expire_interval.is_zero() {
            return Err(Error::Config(
                "check intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// 実行ファイルのディレクトリを返却する。
///
/// 取得できない場合は、カレントディレクトリを返却する。
fn default_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}
