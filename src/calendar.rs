//! # Calendar
//!
//! Business-day calendars and the single roll-forward rule used for trade dates
//! and maturities. Calendars are plain values handed to whoever needs them.
//!
use std::collections::BTreeSet;

use chrono::Datelike;
use chrono::Duration;
use chrono::Months;
use chrono::NaiveDate;
use chrono::Weekday;
use serde::Deserialize;

pub mod day_count;

pub use day_count::DayCountConvention;

/// Decides whether a date is a business day.
pub trait BusinessCalendar: Send + Sync {
  fn is_business_day(&self, date: NaiveDate) -> bool;
}

impl<C: BusinessCalendar + ?Sized> BusinessCalendar for Box<C> {
  fn is_business_day(&self, date: NaiveDate) -> bool {
    (**self).is_business_day(date)
  }
}

/// First business day on or after `date`.
pub fn next_business_day(date: NaiveDate, calendar: &dyn BusinessCalendar) -> NaiveDate {
  let mut date = date;
  while !calendar.is_business_day(date) {
    date += Duration::days(1);
  }
  date
}

/// Calendar date `months` months after `date`, clamped to month end.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
  date
    .checked_add_months(Months::new(months))
    .unwrap_or(NaiveDate::MAX)
}

/// Business days in the closed interval `[from, to]`, in order.
pub fn business_days<'a>(
  calendar: &'a dyn BusinessCalendar,
  from: NaiveDate,
  to: NaiveDate,
) -> impl Iterator<Item = NaiveDate> + 'a {
  from
    .iter_days()
    .take_while(move |d| *d <= to)
    .filter(move |d| calendar.is_business_day(*d))
}

fn is_weekend(date: NaiveDate) -> bool {
  matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday/Sunday are the only non-business days.
#[derive(Default, Clone, Copy, Debug)]
pub struct WeekendCalendar;

impl BusinessCalendar for WeekendCalendar {
  fn is_business_day(&self, date: NaiveDate) -> bool {
    !is_weekend(date)
  }
}

/// TARGET2 settlement calendar.
///
/// Closed on weekends, New Year's Day, Good Friday, Easter Monday, Labour Day,
/// Christmas Day and 26 December; additionally on 31 December in 1998-2001.
#[derive(Default, Clone, Copy, Debug)]
pub struct TargetCalendar;

impl TargetCalendar {
  pub fn is_holiday(&self, date: NaiveDate) -> bool {
    let y = date.year();
    let easter = easter_sunday(y);

    matches!((date.month(), date.day()), (1, 1) | (5, 1) | (12, 25) | (12, 26))
      || (date.month() == 12 && date.day() == 31 && (1998..=2001).contains(&y))
      || date == easter - Duration::days(2)
      || date == easter + Duration::days(1)
  }
}

impl BusinessCalendar for TargetCalendar {
  fn is_business_day(&self, date: NaiveDate) -> bool {
    !is_weekend(date) && !self.is_holiday(date)
  }
}

/// A base calendar with extra closing days on top.
pub struct HolidayCalendar<C: BusinessCalendar> {
  pub base: C,
  pub holidays: BTreeSet<NaiveDate>,
}

impl<C: BusinessCalendar> HolidayCalendar<C> {
  pub fn new<I>(base: C, holidays: I) -> Self
  where
    I: IntoIterator<Item = NaiveDate>,
  {
    Self {
      base,
      holidays: holidays.into_iter().collect(),
    }
  }
}

impl<C: BusinessCalendar> BusinessCalendar for HolidayCalendar<C> {
  fn is_business_day(&self, date: NaiveDate) -> bool {
    !self.holidays.contains(&date) && self.base.is_business_day(date)
  }
}

/// Calendar selector used by configuration files.
#[derive(Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CalendarKind {
  Weekend,
  #[default]
  Target,
}

impl CalendarKind {
  pub fn build(self) -> Box<dyn BusinessCalendar> {
    match self {
      CalendarKind::Weekend => Box::new(WeekendCalendar),
      CalendarKind::Target => Box::new(TargetCalendar),
    }
  }
}

// Meeus/Jones/Butcher
fn easter_sunday(year: i32) -> NaiveDate {
  let a = year % 19;
  let b = year / 100;
  let c = year % 100;
  let d = b / 4;
  let e = b % 4;
  let f = (b + 8) / 25;
  let g = (b - f + 1) / 3;
  let h = (19 * a + b - d - g + 15) % 30;
  let i = c / 4;
  let k = c % 4;
  let l = (32 + 2 * e + 2 * i - h - k) % 7;
  let m = (a + 11 * h + 22 * l) / 451;
  let month = (h + l - 7 * m + 114) / 31;
  let day = ((h + l - 7 * m + 114) % 31) + 1;

  NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap_or(NaiveDate::MIN)
}
