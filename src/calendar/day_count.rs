//! # Day count
//!
//! $$
//! \tau(d_1,d_2)=\frac{\text{days}(d_1,d_2)}{\text{basis}}
//! $$
//!
use chrono::Datelike;
use chrono::NaiveDate;
use serde::Deserialize;

/// Converts a date interval into a year fraction.
#[derive(Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DayCountConvention {
  /// Actual/365 Fixed
  #[default]
  #[serde(alias = "act365")]
  Actual365Fixed,
  /// Actual/360
  #[serde(alias = "act360")]
  Actual360,
  /// Actual/Actual (ISDA): each calendar year contributes days / days-in-year.
  ActualActualIsda,
  /// 30/360 bond basis
  Thirty360,
  /// 30E/360 (Eurobond basis)
  ThirtyE360,
}

impl DayCountConvention {
  /// Year fraction from `start` to `end`; negative when `end < start`.
  pub fn year_fraction(&self, start: NaiveDate, end: NaiveDate) -> f64 {
    if end < start {
      return -self.year_fraction(end, start);
    }
    let days = (end - start).num_days() as f64;

    match self {
      DayCountConvention::Actual365Fixed => days / 365.0,
      DayCountConvention::Actual360 => days / 360.0,
      DayCountConvention::ActualActualIsda => actual_actual_isda(start, end),
      DayCountConvention::Thirty360 | DayCountConvention::ThirtyE360 => {
        self.thirty_360_days(start, end) / 360.0
      }
    }
  }

  fn thirty_360_days(&self, start: NaiveDate, end: NaiveDate) -> f64 {
    let (y1, m1, d1) = (start.year(), start.month() as i32, start.day() as i32);
    let (y2, m2, d2) = (end.year(), end.month() as i32, end.day() as i32);

    let (d1, d2) = match self {
      DayCountConvention::Thirty360 => {
        let d1 = d1.min(30);
        let d2 = if d1 == 30 { d2.min(30) } else { d2 };
        (d1, d2)
      }
      _ => (d1.min(30), d2.min(30)),
    };

    (360 * (y2 - y1) + 30 * (m2 - m1) + (d2 - d1)) as f64
  }
}

fn days_in_year(year: i32) -> f64 {
  if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
    366.0
  } else {
    365.0
  }
}

fn actual_actual_isda(start: NaiveDate, end: NaiveDate) -> f64 {
  if start.year() == end.year() {
    return (end - start).num_days() as f64 / days_in_year(start.year());
  }

  let year_end = |y: i32| NaiveDate::from_ymd_opt(y + 1, 1, 1).unwrap_or(NaiveDate::MAX);
  let year_start = |y: i32| NaiveDate::from_ymd_opt(y, 1, 1).unwrap_or(NaiveDate::MIN);

  let first = (year_end(start.year()) - start).num_days() as f64 / days_in_year(start.year());
  let last = (end - year_start(end.year())).num_days() as f64 / days_in_year(end.year());
  let whole = (end.year() - start.year() - 1) as f64;

  first + whole + last
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn act_365_fixed() {
    let yf = DayCountConvention::Actual365Fixed.year_fraction(date(2006, 1, 3), date(2006, 3, 3));
    assert_abs_diff_eq!(yf, 59.0 / 365.0, epsilon = 1e-15);
  }

  #[test]
  fn act_360() {
    let yf = DayCountConvention::Actual360.year_fraction(date(2026, 1, 1), date(2026, 4, 1));
    assert_abs_diff_eq!(yf, 90.0 / 360.0, epsilon = 1e-15);
  }

  #[test]
  fn act_act_isda_spans_leap_year() {
    let yf = DayCountConvention::ActualActualIsda.year_fraction(date(2003, 11, 1), date(2004, 5, 1));
    assert_abs_diff_eq!(yf, 61.0 / 365.0 + 121.0 / 366.0, epsilon = 1e-12);
  }

  #[test]
  fn thirty_360_month_ends() {
    let dc = DayCountConvention::Thirty360;
    assert_abs_diff_eq!(dc.year_fraction(date(2006, 1, 31), date(2006, 3, 31)), 60.0 / 360.0);
    let dc = DayCountConvention::ThirtyE360;
    assert_abs_diff_eq!(dc.year_fraction(date(2006, 1, 15), date(2006, 3, 31)), 75.0 / 360.0);
  }

  #[test]
  fn reversed_interval_is_negative() {
    let dc = DayCountConvention::Actual365Fixed;
    assert_abs_diff_eq!(dc.year_fraction(date(2006, 1, 10), date(2006, 1, 3)), -7.0 / 365.0);
  }

  #[test]
  fn same_day_is_zero() {
    let d = date(2006, 1, 3);
    assert_eq!(DayCountConvention::ActualActualIsda.year_fraction(d, d), 0.0);
  }
}
