use std::{io, path::PathBuf};

/// このクレートの処理結果。
pub type Result<T> = std::result::Result<T, Error>;

/// ロガーとローテーションで発生するエラー
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// ログディレクトリを作成できなかった。
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },

    /// ログファイルを開けなかった。
    #[error("failed to open log file {path}: {source}")]
    OpenFile { path: PathBuf, source: io::Error },

    /// ログファイルの情報を取得できなかった。
    #[error("failed to stat log file {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },

    /// ログディレクトリを走査できなかった。
    #[error("failed to read log directory {path}: {source}")]
    ReadDirectory { path: PathBuf, source: io::Error },

    /// 期限切れのログファイルを削除できなかった。
    #[error("failed to remove log file {path}: {source}")]
    RemoveFile { path: PathBuf, source: io::Error },

    /// ファイル名の日時を整形できなかった。
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    /// 設定値が不正。
    #[error("invalid configuration: {0}")]
    Config(String),

    /// ログレベルの文字列を解釈できなかった。
    #[error("unknown log level `{0}`")]
    InvalidLevel(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
