use crossbeam_queue::ArrayQueue;

/// 保持するバッファの最大数
const DEFAULT_POOL_SIZE: usize = 64;

/// この容量を超えたバッファはプールに戻さずに破棄する。
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// レコードの整形に使用するバッファのプール
///
/// 外部でロックせずに、複数のスレッドから取得と返却ができる。
/// プールが空の場合は新しいバッファを割り当てる。
pub struct BufferPool {
    buffers: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_SIZE)
    }

    /// 最大`size`個のバッファを保持するプールを作成する。
    pub fn with_capacity(size: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(size.max(1)),
        }
    }

    /// 空のバッファを取得する。
    pub fn acquire(&self) -> Vec<u8> {
        match self.buffers.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::with_capacity(256),
        }
    }

    /// バッファをプールに返却する。
    ///
    /// バッファの内容を出力し終えた後に呼び出すこと。
    pub fn release(&self, buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        // プールが満杯の場合は破棄する
        let _ = self.buffers.push(buf);
    }

    /// プールに保持されているバッファの数
    pub fn idle(&self) -> usize {
        self.buffers.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
