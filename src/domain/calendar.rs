//! Exchange business-day calendars used for trailing windows.
//!
//! Known exchanges trade Monday to Friday. Exchange holidays are not modelled.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::domain::error::CrosswatchError;

const KNOWN_EXCHANGES: &[&str] = &["NASDAQ", "NYSE", "AMEX", "ASX", "LSE", "XETRA"];

/// Weekday calendar; every known exchange currently shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeCalendar {
    _known: (),
}

impl ExchangeCalendar {
    pub fn for_exchange(exchange: &str) -> Result<Self, CrosswatchError> {
        let upper = exchange.trim().to_uppercase();
        if KNOWN_EXCHANGES.contains(&upper.as_str()) {
            Ok(Self { _known: () })
        } else {
            Err(CrosswatchError::CalendarUnavailable {
                exchange: exchange.to_string(),
            })
        }
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Midnight opening a window of `business_days` business days that ends
    /// on `latest`'s date. Counts `latest`'s date when it is a business day.
    pub fn window_start(&self, latest: NaiveDateTime, business_days: usize) -> NaiveDateTime {
        let wanted = business_days.max(1);
        let mut date = latest.date();
        let mut counted = 0;
        loop {
            if self.is_business_day(date) {
                counted += 1;
                if counted == wanted {
                    return date.and_time(NaiveTime::MIN);
                }
            }
            match date.pred_opt() {
                Some(prev) => date = prev,
                None => return date.and_time(NaiveTime::MIN),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn known_exchange_is_case_insensitive() {
        assert!(ExchangeCalendar::for_exchange("nasdaq").is_ok());
        assert!(ExchangeCalendar::for_exchange(" Xetra ").is_ok());
    }

    #[test]
    fn unknown_exchange() {
        let err = ExchangeCalendar::for_exchange("MOON").unwrap_err();
        assert!(matches!(err, CrosswatchError::CalendarUnavailable { .. }));
    }

    #[test]
    fn weekends_are_not_business_days() {
        let cal = ExchangeCalendar::for_exchange("NYSE").unwrap();
        // 2024-03-09 is a Saturday.
        assert!(!cal.is_business_day(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
        assert!(cal.is_business_day(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()));
    }

    #[test]
    fn window_within_week() {
        let cal = ExchangeCalendar::for_exchange("NYSE").unwrap();
        // Thursday 2024-03-07, 3 business days -> Tuesday 00:00.
        assert_eq!(cal.window_start(at(2024, 3, 7, 15), 3), at(2024, 3, 5, 0));
        assert_eq!(cal.window_start(at(2024, 3, 7, 15), 1), at(2024, 3, 7, 0));
    }

    #[test]
    fn window_spans_weekend() {
        let cal = ExchangeCalendar::for_exchange("ASX").unwrap();
        // Monday 2024-03-11, 2 business days -> Friday 2024-03-08.
        assert_eq!(cal.window_start(at(2024, 3, 11, 10), 2), at(2024, 3, 8, 0));
    }

    #[test]
    fn window_from_weekend_date() {
        let cal = ExchangeCalendar::for_exchange("LSE").unwrap();
        // Sunday 2024-03-10, 1 business day -> Friday.
        assert_eq!(cal.window_start(at(2024, 3, 10, 10), 1), at(2024, 3, 8, 0));
    }
}
