use std::{
    io::{self, Write},
    sync::Arc,
};

use tracing_subscriber::fmt::MakeWriter;

use crate::logger::Logger;

/// `tracing-subscriber`の出力先としてロガーを使用する。
///
/// 整形済みのイベントを、ロガーの現在の出力先にロガーのロックを取得して書き込む。
/// ロガーがローテーションに登録されていれば、イベントも新しいファイルに切り替わる。
/// レベルによる絞り込みは`tracing-subscriber`側で行う。
#[derive(Clone)]
pub struct LoggerMakeWriter {
    logger: Arc<Logger>,
}

impl LoggerMakeWriter {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

pub struct LoggerWriter<'a> {
    logger: &'a Logger,
}

impl Write for LoggerWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.logger.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.logger.flush()
    }
}

impl<'a> MakeWriter<'a> for LoggerMakeWriter {
    type Writer = LoggerWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LoggerWriter {
            logger: &self.logger,
        }
    }
}
