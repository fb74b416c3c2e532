use std::{
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{FixedOffset, Offset, TimeZone, Utc};
use log::info;

/// Readings at or below this are treated as "clock not yet synchronized".
/// Freshly booted hardware reports seconds since reset until SNTP lands.
pub const MIN_PLAUSIBLE_EPOCH: i64 = 100_000;

/// Source of wall-clock readings, seconds since the Unix epoch.
pub trait EpochSource {
    fn now_epoch(&mut self) -> i64;
}

/// System clock. On the ESP-IDF target this reflects SNTP once the first
/// sync completes; until then it reads as seconds since reset.
#[derive(Debug, Default)]
pub struct SystemClock;

impl EpochSource for SystemClock {
    fn now_epoch(&mut self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(_) => 0,
        }
    }
}

/// Blocking access to remote-authority time.
///
/// The SNTP client itself runs in the background (platform-owned); this
/// wrapper polls the local clock until a plausible value appears. The wait
/// is open-ended by design: there is no safe value to report without it.
pub struct TimeAuthority<S: EpochSource> {
    source: S,
    poll_interval: Duration,
}

impl<S: EpochSource> TimeAuthority<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    pub fn wait_for_epoch(&mut self) -> i64 {
        let mut reported_waiting = false;
        loop {
            let epoch = self.source.now_epoch();
            if epoch > MIN_PLAUSIBLE_EPOCH {
                return epoch;
            }
            if !reported_waiting {
                info!("waiting for clock synchronization (read {epoch})");
                reported_waiting = true;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Render an epoch as a local wall-clock `HH:MM:SS` string using the
/// configured fixed UTC offset.
pub fn format_local(epoch: i64, utc_offset_secs: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix());
    match offset.timestamp_opt(epoch, 0).single() {
        Some(stamp) => stamp.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}
