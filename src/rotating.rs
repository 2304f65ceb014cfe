use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use regex::Regex;
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::{
    clock::local_offset, config::RotationPolicy, logger::Logger, output::SharedFile,
    registry::Registry, Error, Result,
};

/// パターンに一致したログファイル
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    /// ファイル名から復元した作成日時。
    pub created: OffsetDateTime,
    /// 同じ秒に作成されたファイルを区別する連番。
    pub sequence: u32,
}

/// `rotate_check`の結果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotateOutcome {
    /// ファイルサイズが上限未満のため、切り替えなかった。
    Kept { size: u64 },
    /// 新しいファイルに切り替えた。
    Rotated {
        previous: Option<PathBuf>,
        current: PathBuf,
    },
}

/// `expire`の結果
///
/// 1つのファイルの削除に失敗しても、残りのファイルの処理は継続する。
#[derive(Debug, Default)]
pub struct ExpireReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<Error>,
}

/// サイズでローテーションするログファイルの出力先
///
/// 同時に開いているファイルは1つだけ。ローテーションでは新しいファイルを開き、
/// 登録されたすべてのロガーを新しいファイルに切り替えてから、古いファイルへの参照を
/// 破棄する。古いファイルは、最後の参照が破棄されたときに閉じられるため、
/// 閉じられたファイルにロガーが書き込むことはない。
pub struct RotatingFileOutput {
    policy: Arc<RotationPolicy>,
    pattern: Regex,
    offset: UtcOffset,
    active: Mutex<Option<SharedFile>>,
    sweep: Mutex<()>,
}

impl RotatingFileOutput {
    /// ファイルを開いていない状態で作成する。
    pub fn new(policy: Arc<RotationPolicy>) -> Result<Self> {
        policy.validate()?;
        let pattern = log_filename_pattern(policy.prefix())?;
        let offset = policy.utc_offset().unwrap_or_else(local_offset);

        Ok(Self {
            policy,
            pattern,
            offset,
            active: Mutex::new(None),
            sweep: Mutex::new(()),
        })
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// 現在のファイル
    pub fn current(&self) -> Option<SharedFile> {
        self.lock_active().clone()
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.lock_active()
            .as_ref()
            .map(|file| file.path().to_path_buf())
    }

    /// ファイルを開いていない場合は、新しいファイルを開いて登録されたロガーに通知する。
    ///
    /// # 戻り値
    ///
    /// 現在のファイル。
    pub fn open(&self, registry: &Registry) -> Result<SharedFile> {
        let mut active = self.lock_active();
        if let Some(file) = active.as_ref() {
            return Ok(file.clone());
        }

        let file = self.create_file(None)?;
        registry.notify(&file);
        *active = Some(file.clone());
        tracing::debug!(target: crate::LOG_TARGET, path = %file.path().display(), "opened log file");

        Ok(file)
    }

    /// 現在のファイルのサイズを確認して、上限以上であれば新しいファイルに切り替える。
    ///
    /// 現在のファイルが存在しない場合も、新しいファイルを開く。
    /// 失敗した場合は、それまでのファイルを使い続ける。
    pub fn rotate_check(&self, registry: &Registry) -> Result<RotateOutcome> {
        let mut active = self.lock_active();

        if let Some(file) = active.as_ref() {
            match fs::metadata(file.path()) {
                Ok(metadata) if metadata.len() < self.policy.max_size() => {
                    return Ok(RotateOutcome::Kept {
                        size: metadata.len(),
                    });
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(Error::Stat {
                        path: file.path().to_path_buf(),
                        source,
                    })
                }
            }
        }

        let next = self.create_file(active.as_ref())?;
        // 古いファイルを手放す前に、すべてのロガーを切り替える
        registry.notify(&next);
        let previous = active.replace(next.clone());
        let previous = previous.map(|file| file.path().to_path_buf());
        tracing::info!(
            target: crate::LOG_TARGET,
            previous = ?previous,
            current = %next.path().display(),
            "rotated log file"
        );

        Ok(RotateOutcome::Rotated {
            previous,
            current: next.path().to_path_buf(),
        })
    }

    /// 保存期間を過ぎたログファイルを削除する。
    ///
    /// 現在のファイルと、ファイル名がパターンに一致しないファイルは削除しない。
    pub fn expire(&self) -> Result<ExpireReport> {
        let _sweep = self.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        let directory = self.policy.directory();
        let entries = fs::read_dir(directory).map_err(|source| Error::ReadDirectory {
            path: directory.to_path_buf(),
            source,
        })?;

        let now = SystemTime::now();
        let mut report = ExpireReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    report.failures.push(Error::ReadDirectory {
                        path: directory.to_path_buf(),
                        source,
                    });
                    continue;
                }
            };
            let path = entry.path();
            let matches = entry
                .file_name()
                .to_str()
                .and_then(|name| self.parse_log_filename(name))
                .is_some();
            if !matches {
                continue;
            }

            let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
                Ok(modified) => modified,
                Err(source) => {
                    report.failures.push(Error::Stat { path, source });
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < self.policy.max_age() {
                continue;
            }

            // 削除中に現在のファイルが切り替わらないようにする
            let active = self.lock_active();
            if active.as_ref().is_some_and(|file| file.path() == path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => report.failures.push(Error::RemoveFile { path, source }),
            }
        }

        Ok(report)
    }

    /// パターンに一致するログファイルを、古い順に返却する。
    pub fn log_files(&self) -> Result<Vec<LogFile>> {
        let directory = self.policy.directory();
        let entries = fs::read_dir(directory).map_err(|source| Error::ReadDirectory {
            path: directory.to_path_buf(),
            source,
        })?;

        let mut files: Vec<LogFile> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let (created, sequence) = self.parse_log_filename(name.to_str()?)?;
                Some(LogFile {
                    path: entry.path(),
                    created,
                    sequence,
                })
            })
            .collect();
        files.sort_by_key(|file| (file.created, file.sequence));

        Ok(files)
    }

    /// 現在のファイルへの参照を破棄する。
    ///
    /// # 戻り値
    ///
    /// 開いていたファイルのパス。
    pub fn close(&self) -> Option<PathBuf> {
        self.lock_active()
            .take()
            .map(|file| file.path().to_path_buf())
    }

    /// ロガーを登録して、現在のファイルに出力するように切り替える。
    pub(crate) fn attach(&self, registry: &Registry, logger: &Arc<Logger>) -> bool {
        let active = self.lock_active();
        if !registry.attach(Arc::clone(logger)) {
            return false;
        }
        if let Some(file) = active.as_ref() {
            drop(logger.set_output(Box::new(file.clone())));
        }
        true
    }

    /// ファイル名を解析して、作成日時と連番を返却する。
    ///
    /// パターンに一致しないファイル名の場合は`None`を返却する。
    fn parse_log_filename(&self, name: &str) -> Option<(OffsetDateTime, u32)> {
        let captures = self.pattern.captures(name)?;
        let created = PrimitiveDateTime::parse(
            captures.get(1)?.as_str(),
            format_description!("[year][month][day]_[hour][minute][second]"),
        )
        .ok()?
        .assume_offset(self.offset);
        let sequence = match captures.get(2) {
            Some(sequence) => sequence.as_str().parse().ok()?,
            None => 0,
        };

        Some((created, sequence))
    }

    /// 新しいログファイルを作成する。
    ///
    /// 同じ名前のファイルが既に存在する場合は、ファイル名に連番を付加する。
    fn create_file(&self, current: Option<&SharedFile>) -> Result<SharedFile> {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        let filename = create_log_filename(self.policy.prefix(), &now)?;
        let directory = self.policy.directory();

        let mut path = directory.join(&filename);
        let mut sequence = 0;
        while path.exists() || current.is_some_and(|file| file.path() == path) {
            sequence += 1;
            path = directory.join(sequenced_filename(&filename, sequence));
        }

        let file = create_writer(&path)?;
        Ok(SharedFile::new(path, file))
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<SharedFile>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// ログファイル名のパターンを作成する。
fn log_filename_pattern(prefix: &str) -> Result<Regex> {
    let expression = format!(r"^{}_(\d{{8}}_\d{{6}})(?:\.(\d+))?\.log$", regex::escape(prefix));

    Regex::new(&expression).map_err(|err| Error::Config(err.to_string()))
}

/// ログファイルの名前を作成して、返却する。
///
/// ログファイル名は、`{filename_prefix}_<yyyymmdd>_<hhmmss>.log`となる。
///
/// # 引数
///
/// - filename_prefix: ファイル名の接頭語。
/// - at: ファイルの作成日時。
///
/// # 戻り値
///
/// ログファイル名。
fn create_log_filename(filename_prefix: &str, at: &OffsetDateTime) -> Result<String> {
    let stamp = at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;

    Ok(format!("{}_{}.log", filename_prefix, stamp))
}

/// `foo_20220526_152532.log`を`foo_20220526_152532.{sequence}.log`にする。
fn sequenced_filename(filename: &str, sequence: u32) -> String {
    let stem = filename.strip_suffix(".log").unwrap_or(filename);
    format!("{}.{}.log", stem, sequence)
}

/// ライターを作成する。
///
/// ディレクトリが存在しない場合は、ディレクトリを作成する。
///
/// # 引数
///
/// * path: ログファイルパス。
///
/// # 戻り値
///
/// `File`インスタンス。
fn create_writer(path: &Path) -> Result<fs::File> {
    let mut open_options = OpenOptions::new();
    open_options.append(true).create(true);

    match open_options.open(path) {
        Ok(file) => Ok(file),
        Err(err) => {
            let Some(parent) = path.parent().filter(|parent| !parent.exists()) else {
                return Err(Error::OpenFile {
                    path: path.to_path_buf(),
                    source: err,
                });
            };
            fs::create_dir_all(parent).map_err(|source| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
            open_options.open(path).map_err(|source| Error::OpenFile {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
