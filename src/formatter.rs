use std::{
    fmt,
    io::{self, Write},
    panic::Location,
};

use crate::{clock::CachedClock, Level};

/// レコードの整形に必要な情報
///
/// フィールドを追加しても既存の`Formatter`実装が壊れないように、
/// 位置引数ではなく構造体で渡す。
#[derive(Clone, Copy)]
pub struct FormatRequest<'a> {
    /// ログレベル。
    pub level: Level,
    /// レコードを出力するロガーの名前。
    pub logger: &'a str,
    /// モジュール名などのタグ。
    pub tag: Option<&'a str>,
    /// ログを出力した呼び出し元。
    pub caller: &'static Location<'static>,
    /// 呼び出し元を自分で解決する整形器のための、スタックの深さ。
    pub caller_depth: usize,
    /// メッセージ。
    pub message: fmt::Arguments<'a>,
}

/// レコードをバイト列に整形する。
pub trait Formatter: Send + Sync {
    /// `request`を`buf`に追記する。
    ///
    /// `buf`は空の状態で渡される。
    fn format(&self, request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()>;
}

impl<F> Formatter for F
where
    F: Fn(&FormatRequest<'_>, &mut Vec<u8>) -> io::Result<()> + Send + Sync,
{
    fn format(&self, request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
        self(request, buf)
    }
}

/// 既定の整形器
///
/// `[tag] yyyy-mm-dd hh:mm:ss,mmm file:line LEVEL msg: text`形式で出力する。
/// タグが空の場合は、`[tag] `を省略する。
#[derive(Default)]
pub struct DefaultFormatter {
    clock: CachedClock,
}

impl DefaultFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: CachedClock) -> Self {
        Self { clock }
    }
}

impl Formatter for DefaultFormatter {
    fn format(&self, request: &FormatRequest<'_>, buf: &mut Vec<u8>) -> io::Result<()> {
        if let Some(tag) = request.tag.filter(|tag| !tag.is_empty()) {
            buf.push(b'[');
            buf.extend_from_slice(tag.as_bytes());
            buf.extend_from_slice(b"] ");
        }

        self.clock.write_now(buf);
        write!(
            buf,
            " {}:{} {} msg: ",
            request.caller.file(),
            request.caller.line(),
            request.level
        )?;
        buf.write_fmt(request.message)?;
        buf.push(b'\n');

        Ok(())
    }
}
