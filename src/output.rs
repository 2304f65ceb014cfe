use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

/// ロガーの出力先
///
/// バイト列を書き込めるものであれば何でもよい。
/// 明示的に閉じる必要がある出力先は、`close`を実装する。
pub trait LogOutput: Write + Send + 'static {
    /// 出力先を閉じる。
    ///
    /// 既定の実装はフラッシュのみ。
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl LogOutput for io::Stdout {}

impl LogOutput for io::Stderr {}

impl LogOutput for io::Sink {}

impl LogOutput for File {
    fn close(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// 複数のロガーで共有するログファイル
///
/// 最後の参照が破棄されたときにファイルが閉じられる。
/// ローテーションでは、すべてのロガーが新しいファイルに切り替わった後に、
/// 古いファイルへの参照が破棄される。
#[derive(Clone, Debug)]
pub struct SharedFile {
    inner: Arc<OpenedFile>,
}

#[derive(Debug)]
struct OpenedFile {
    path: PathBuf,
    file: File,
}

impl SharedFile {
    pub(crate) fn new(path: PathBuf, file: File) -> Self {
        Self {
            inner: Arc::new(OpenedFile { path, file }),
        }
    }

    /// ファイルパス
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// 同じファイルを指しているか確認する。
    pub fn same_file(&self, other: &SharedFile) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.inner.file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.inner.file).flush()
    }
}

impl LogOutput for SharedFile {}

/// メモリ上に出力を蓄積する出力先
///
/// クローンしたインスタンスは、同じバッファを共有する。
#[derive(Clone, Default)]
pub struct MemoryOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 蓄積された内容を文字列で返却する。
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogOutput for MemoryOutput {}
