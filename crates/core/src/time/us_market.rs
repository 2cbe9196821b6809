use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::US::Eastern;
use std::collections::HashSet;

// NYSE regular session closes at 16:00 New York time.
const CLOSE_CUTOFF_HOUR_ET: u32 = 16;
const CLOSE_CUTOFF_MINUTE_ET: u32 = 0;

/// Calendar date a ranking run is filed under: the explicit argument when
/// given, otherwise today's date in New York.
pub fn resolve_run_date(
    run_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = run_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"));
    }
    Ok(now_utc.with_timezone(&Eastern).date_naive())
}

/// Most recent trading session whose close has already happened.
pub fn last_closed_session(now_utc: DateTime<Utc>) -> NaiveDate {
    let now_et = now_utc.with_timezone(&Eastern);

    let cutoff_reached =
        (now_et.hour(), now_et.minute()) >= (CLOSE_CUTOFF_HOUR_ET, CLOSE_CUTOFF_MINUTE_ET);
    let mut date = now_et.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    let holidays = configured_holidays();
    while !is_trading_day_with(date, &holidays) {
        date = date - Duration::days(1);
    }
    date
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    is_trading_day_with(date, &configured_holidays())
}

fn is_trading_day_with(date: NaiveDate, holidays: &HashSet<NaiveDate>) -> bool {
    !is_weekend(date) && !holidays.contains(&date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday holidays close the market on Friday and Sunday ones on Monday,
/// except New Year's Day, which is not moved back into December.
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat if date.month() == 1 && date.day() == 1 => None,
        Weekday::Sat => Some(date - Duration::days(1)),
        Weekday::Sun => Some(date + Duration::days(1)),
        _ => Some(date),
    }
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date NYSE holidays only, on their observed day. Floating ones
    // (Thanksgiving, Good Friday, ...) go in US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 1), (6, 19), (7, 4), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d).and_then(observed) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("US_MARKET_HOLIDAYS") {
        out.extend(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .filter_map(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok()),
        );
    }

    out
}
