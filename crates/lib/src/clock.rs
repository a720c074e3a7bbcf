use chrono::{FixedOffset, Local, Offset, TimeZone, Utc};
use std::{cell::Cell, rc::Rc};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock {
    fn now_millis(&self) -> i64;

    /// Last millisecond (`23:59:59.999`) of the calendar day containing `at`.
    fn end_of_day_millis(&self, at: i64) -> i64;

    fn is_same_day(&self, a: i64, b: i64) -> bool {
        self.end_of_day_millis(a) == self.end_of_day_millis(b)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn end_of_day_millis(&self, at: i64) -> i64 {
        (**self).end_of_day_millis(at)
    }
}

fn end_of_day_in<Tz: TimeZone>(tz: &Tz, at: i64) -> i64 {
    tz.timestamp_millis_opt(at)
        .single()
        .and_then(|moment| moment.date_naive().and_hms_milli_opt(23, 59, 59, 999))
        .and_then(|end| tz.from_local_datetime(&end).latest())
        .map(|end| end.timestamp_millis())
        // only reachable for out of range timestamps, fall back to the UTC day
        .unwrap_or_else(|| at - at.rem_euclid(MILLIS_PER_DAY) + MILLIS_PER_DAY - 1)
}

/// The device clock in its local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn end_of_day_millis(&self, at: i64) -> i64 {
        end_of_day_in(&Local, at)
    }
}

/// Virtual clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<i64>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: i64, offset: FixedOffset) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
            offset,
        }
    }

    pub fn utc(now: i64) -> Self {
        Self::new(now, Utc.fix())
    }

    /// `None` when the offset is a day or more away from UTC.
    pub fn with_offset_minutes(now: i64, minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self::new(now, offset))
    }

    pub fn set(&self, now: i64) {
        self.now.set(now);
    }

    pub fn advance(&self, millis: i64) {
        self.now.set(self.now.get() + millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.get()
    }

    fn end_of_day_millis(&self, at: i64) -> i64 {
        end_of_day_in(&self.offset, at)
    }
}
