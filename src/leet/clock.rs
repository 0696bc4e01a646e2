/*!
 * Target instant and scoring window arithmetic
 */

use chrono::{DateTime, Duration, TimeZone, Timelike};

/// The fixed hour:minute the game centers on every day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    hour: u32,
    minute: u32,
}

impl Clock {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Clock firing one minute after `now`, used to get a full cycle right after startup
    pub fn one_minute_after<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let next = now.clone() + Duration::minutes(1);
        Self { hour: next.hour(), minute: next.minute() }
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Today's target instant. On a DST gap swallowing the target, `now` is returned as is.
    pub fn target_on<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        now.date_naive()
            .and_hms_opt(self.hour, self.minute, 0)
            .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest())
            .unwrap_or_else(|| now.clone())
    }
}

/// Whether `timestamp` falls in the target minute or, unless `only_target`, the minute right
/// before it. Only the wall clock hour and minute are compared.
pub fn is_on_target<Tz: TimeZone, Tz2: TimeZone>(
    timestamp: &DateTime<Tz2>,
    target: &DateTime<Tz>,
    only_target: bool,
) -> bool {
    let timestamp = timestamp.with_timezone(&target.timezone());
    let same_minute =
        |t: &DateTime<Tz>| t.hour() == timestamp.hour() && t.minute() == timestamp.minute();

    if same_minute(target) {
        return true;
    }
    !only_target && same_minute(&(target.clone() - Duration::minutes(1)))
}

/// Signed offset from the target in milliseconds, negative when early
pub fn score<Tz: TimeZone, Tz2: TimeZone>(timestamp: &DateTime<Tz2>, target: &DateTime<Tz>) -> i64 {
    (timestamp.naive_utc() - target.naive_utc()).num_milliseconds()
}

/// Where the day's game stands, as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Within the minute before the target
    Approaching,
    /// Within the target minute
    Target,
    /// Past the target minute, winners not posted yet
    Announcing,
}

impl Phase {
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>, target: &DateTime<Tz>, announcing: bool) -> Self {
        if is_on_target(now, target, true) {
            Self::Target
        } else if is_on_target(now, target, false) {
            Self::Approaching
        } else if announcing {
            Self::Announcing
        } else {
            Self::Idle
        }
    }

    /// In-window phases poll every second
    pub fn is_hot(self) -> bool {
        !matches!(self, Self::Idle)
    }
}
