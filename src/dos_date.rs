//! Packing and unpacking of the 32-bit DOS date/time format used by local
//! headers and central directory headers.
//!
//! The wire format has no timezone. Per the format engine's design, DOS
//! components are treated as naive local time: packing and unpacking never
//! consult or attach a timezone, and a writer/reader pair running in
//! different zones will observe drift. That is documented behavior, not a
//! bug to be "fixed" here.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Result, ZipError};

/// Packs a naive local timestamp into the 32-bit DOS date/time layout.
///
/// Years before 1980 clamp to 1980 (the format's epoch). Seconds round to
/// the nearest even value, since DOS time only stores seconds/2; a
/// 59-second input clamps to 58 rather than carrying into the minute field.
pub fn pack(dt: &NaiveDateTime) -> u32 {
    let year_field = (dt.year().max(1980) - 1980) as u32 & 0x7F;
    let month = dt.month() & 0x0F;
    let day = dt.day() & 0x1F;
    let hour = dt.hour() & 0x1F;
    let minute = dt.minute() & 0x3F;

    let second = dt.second();
    let rounded = ((second + 1) / 2 * 2).min(58);
    let second_field = (rounded / 2) & 0x1F;

    second_field
        | (minute << 5)
        | (hour << 11)
        | (day << 16)
        | (month << 21)
        | (year_field << 25)
}

/// Unpacks a 32-bit DOS date/time value into a naive local timestamp.
///
/// Fails with [`ZipError::Range`] if the packed date or time component does
/// not form a valid calendar date/time (for example, day 0 or month 13).
pub fn unpack(value: u32) -> Result<NaiveDateTime> {
    let second = (value & 0x1F) * 2;
    let minute = (value >> 5) & 0x3F;
    let hour = (value >> 11) & 0x1F;
    let day = (value >> 16) & 0x1F;
    let month = (value >> 21) & 0x0F;
    let year = ((value >> 25) & 0x7F) as i32 + 1980;

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ZipError::Range(format!("invalid DOS date: year {year} month {month} day {day}")))?;
    date.and_hms_opt(hour, minute, second)
        .ok_or_else(|| ZipError::Range(format!("invalid DOS time: {hour:02}:{minute:02}:{second:02}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_an_even_second() {
        let dt = NaiveDate::from_ymd_opt(2023, 4, 5)
            .unwrap()
            .and_hms_opt(11, 22, 34)
            .unwrap();
        let packed = pack(&dt);
        let back = unpack(packed).unwrap();
        assert_eq!(back, dt);
        assert_eq!(unpack(pack(&back)).unwrap(), back);
    }

    #[test]
    fn clamps_years_before_1980() {
        let dt = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let packed = pack(&dt);
        let back = unpack(packed).unwrap();
        assert_eq!(back.year(), 1980);
    }

    #[test]
    fn rounds_odd_seconds_to_even() {
        let dt = NaiveDate::from_ymd_opt(2001, 9, 10)
            .unwrap()
            .and_hms_opt(9, 23, 3)
            .unwrap();
        let packed = pack(&dt);
        let back = unpack(packed).unwrap();
        assert_eq!(back.second(), 4);
    }

    #[test]
    fn rejects_invalid_packed_date() {
        // month = 0 is not a valid calendar month.
        let value = 0u32 << 21;
        assert!(unpack(value).is_err());
    }
}
