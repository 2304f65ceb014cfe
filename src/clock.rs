use std::{io::Write, sync::Arc};

use arc_swap::ArcSwap;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

/// ローカル時刻のオフセットを返却する。
///
/// オフセットを安全に取得できない場合は、UTCを返却する。
/// Unix系のOSでは、複数のスレッドが動作していると取得できないため、
/// プロセスの起動直後以外はUTCになることが多い。
pub(crate) fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// 秒単位で整形済みの時刻
#[derive(Debug)]
struct Snapshot {
    unix_secs: i64,
    text: String,
}

impl Snapshot {
    fn at(at: OffsetDateTime) -> Self {
        let text = at
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_else(|_| at.unix_timestamp().to_string());

        Self {
            unix_secs: at.unix_timestamp(),
            text,
        }
    }
}

/// 秒単位の文字列を1秒に1回だけ整形する時計
///
/// 秒までの部分はキャッシュし、ミリ秒は呼び出しごとに付加する。
/// キャッシュは不変のスナップショットをアトミックに差し替えるため、
/// 読み取り側はロックを取得しない。
pub struct CachedClock {
    offset: UtcOffset,
    last: ArcSwap<Snapshot>,
}

impl CachedClock {
    /// ローカル時刻で整形する時計を作成する。
    pub fn new() -> Self {
        Self::with_offset(local_offset())
    }

    pub fn with_offset(offset: UtcOffset) -> Self {
        let now = OffsetDateTime::now_utc().to_offset(offset);

        Self {
            offset,
            last: ArcSwap::from_pointee(Snapshot::at(now)),
        }
    }

    /// 現在時刻を`YYYY-MM-DD hh:mm:ss,mmm`形式で返却する。
    pub fn now(&self) -> String {
        let now = self.current();
        let snapshot = self.snapshot_at(now);

        format!("{},{:03}", snapshot.text, now.millisecond())
    }

    /// 現在時刻をバッファに追記する。
    pub fn write_now(&self, buf: &mut Vec<u8>) {
        let now = self.current();
        let snapshot = self.snapshot_at(now);

        buf.extend_from_slice(snapshot.text.as_bytes());
        // Vec<u8>への書き込みは失敗しない
        let _ = write!(buf, ",{:03}", now.millisecond());
    }

    fn current(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    /// `at`の秒に対応するスナップショットを返却する。
    ///
    /// キャッシュがより新しい秒を保持している場合は、それを返却する。
    /// そのため、返却される秒が過去に戻ることはない。
    fn snapshot_at(&self, at: OffsetDateTime) -> Arc<Snapshot> {
        let secs = at.unix_timestamp();
        let cached = self.last.load_full();
        if cached.unix_secs >= secs {
            return cached;
        }

        let fresh = Arc::new(Snapshot::at(at));
        let previous = self.last.rcu(|current| {
            if current.unix_secs >= secs {
                Arc::clone(current)
            } else {
                Arc::clone(&fresh)
            }
        });

        if previous.unix_secs >= secs {
            previous
        } else {
            fresh
        }
    }
}

impl Default for CachedClock {
    fn default() -> Self {
        Self::new()
    }
}
