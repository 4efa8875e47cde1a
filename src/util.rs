use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};

/// Source of "now" for a cycle; swapped out in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock pinned to one UTC offset, independent of the host's zone.
#[derive(Clone, Copy, Debug)]
pub struct ZoneClock(pub FixedOffset);

impl ZoneClock {
    pub fn from_hours(hours: i32) -> anyhow::Result<Self> {
        FixedOffset::east_opt(hours * 3600)
            .map(Self)
            .ok_or_else(|| anyhow::anyhow!("utc offset {hours}h out of range"))
    }
}

impl Clock for ZoneClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.0)
    }
}

/// `today` and `today + 1 day`, both taken from the same instant.
pub fn scrape_dates(now: DateTime<FixedOffset>) -> (NaiveDate, NaiveDate) {
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    (today, tomorrow)
}

pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn stamp(now: DateTime<FixedOffset>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}
