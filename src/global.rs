use std::sync::{Arc, OnceLock};

use crate::logger::Logger;

static GLOBAL: OnceLock<Arc<Logger>> = OnceLock::new();

/// プロセス全体で共有するロガーを返却する。
///
/// `set_global`で設定されていない場合は、標準出力に`Info`以上を出力するロガーを作成する。
/// ファイルに出力する場合は、`FileLogging::attach`で登録する。
pub fn global() -> &'static Arc<Logger> {
    GLOBAL.get_or_init(|| Arc::new(Logger::builder("global").build()))
}

/// プロセス全体で共有するロガーを設定する。
///
/// # 戻り値
///
/// 既に設定または使用されている場合は、引数のロガーをそのまま返却する。
pub fn set_global(logger: Arc<Logger>) -> Result<(), Arc<Logger>> {
    GLOBAL.set(logger)
}
