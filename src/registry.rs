use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    logger::{Logger, LoggerId},
    output::SharedFile,
};

/// ローテーションの設定を共有するロガーの集合
///
/// ローテーションで新しいファイルが開かれたとき、登録されているすべてのロガーの
/// 出力先を新しいファイルに切り替える。ロガーは識別子で比較する。
pub struct Registry {
    enabled: bool,
    loggers: Mutex<Vec<Arc<Logger>>>,
}

impl Registry {
    /// # 引数
    ///
    /// * enabled: ファイル出力が有効か。無効な場合は、ロガーを登録しない。
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            loggers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// ロガーを登録する。
    ///
    /// # 戻り値
    ///
    /// 新たに登録した場合は`true`。ファイル出力が無効な場合と、
    /// 既に登録されている場合は`false`。
    pub fn attach(&self, logger: Arc<Logger>) -> bool {
        if !self.enabled {
            return false;
        }

        let mut loggers = self.lock();
        if loggers.iter().any(|attached| attached.id() == logger.id()) {
            return false;
        }
        loggers.push(logger);
        true
    }

    /// ロガーの登録を解除する。
    ///
    /// # 戻り値
    ///
    /// 登録を解除したロガー。登録されていなかった場合は`None`。
    pub fn detach(&self, id: LoggerId) -> Option<Arc<Logger>> {
        let mut loggers = self.lock();
        let index = loggers.iter().position(|attached| attached.id() == id)?;
        Some(loggers.remove(index))
    }

    pub fn contains(&self, id: LoggerId) -> bool {
        self.lock().iter().any(|attached| attached.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 登録されているすべてのロガーの出力先を`target`に切り替える。
    ///
    /// 集合のロックを保持したまま、ロガーごとのロックを1つずつ取得して解放する。
    pub fn notify(&self, target: &SharedFile) {
        if !self.enabled {
            return;
        }

        let loggers = self.lock();
        for logger in loggers.iter() {
            // 切り替え前の出力先は、ロガーのロックを解放した後に破棄される
            drop(logger.set_output(Box::new(target.clone())));
        }
    }

    /// すべてのロガーの登録を解除して返却する。
    pub(crate) fn drain(&self) -> Vec<Arc<Logger>> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Logger>>> {
        self.loggers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
