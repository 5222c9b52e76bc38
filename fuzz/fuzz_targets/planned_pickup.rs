#![no_main]

use chrono::{Datelike, FixedOffset, TimeZone, Timelike, Utc, Weekday};
use libfuzzer_sys::fuzz_target;
use sevensenders_core::{planned_pickup, tracking_link};

fuzz_target!(|data: (u32, i16, &str)| {
    let (secs, offset_minutes, number) = data;
    let Some(offset) = FixedOffset::east_opt(i32::from(offset_minutes % 840) * 60) else {
        return;
    };
    let Some(now) = Utc.timestamp_opt(i64::from(secs), 0).single() else {
        return;
    };
    let now = now.with_timezone(&offset);

    let pickup = planned_pickup(now);
    assert!(!matches!(pickup.weekday(), Weekday::Sat | Weekday::Sun));
    assert!(pickup.date_naive() > now.date_naive());
    assert_eq!((pickup.hour(), pickup.minute(), pickup.second()), (12, 0, 0));

    let link = tracking_link("https://track.example.com/", number);
    assert_eq!(link, format!("https://track.example.com/{number}"));
});
