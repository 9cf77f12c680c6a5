//! Packed terminal timestamps
//!
//! Terminals store wall-clock time as seconds in a calendar where every month
//! has 31 days and every year 12 months, counted from 2000-01-01 00:00:00.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};

/// Pack a date-time into the terminal format
///
/// Only the last two digits of the year are kept.
///
/// ```
/// use chrono::NaiveDate;
/// use zkwire_types::time::{decode_time, encode_time};
///
/// let dt = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap().and_hms_opt(8, 30, 0).unwrap();
/// assert_eq!(decode_time(encode_time(&dt)).unwrap(), dt);
/// ```
pub fn encode_time(dt: &NaiveDateTime) -> u32 {
    let days = (dt.year().rem_euclid(100) as u32) * 12 * 31 + (dt.month() - 1) * 31 + dt.day() - 1;
    days * 86_400 + (dt.hour() * 60 + dt.minute()) * 60 + dt.second()
}

/// Unpack a terminal timestamp
///
/// # Errors
///
/// [`Error::InvalidTimestamp`] for values naming a day that does not exist,
/// such as the 31st of February.
pub fn decode_time(packed: u32) -> Result<NaiveDateTime> {
    let mut t = packed;
    let second = t % 60;
    t /= 60;
    let minute = t % 60;
    t /= 60;
    let hour = t % 24;
    t /= 24;
    let day = t % 31 + 1;
    t /= 31;
    let month = t % 12 + 1;
    t /= 12;
    let year = t as i32 + 2000;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or(Error::InvalidTimestamp(packed))
}

/// Pack into the 4 little-endian bytes carried on the wire
pub fn encode_time_bytes(dt: &NaiveDateTime) -> [u8; 4] {
    encode_time(dt).to_le_bytes()
}

/// Unpack from at least 4 little-endian bytes
pub fn decode_time_bytes(bytes: &[u8]) -> Result<NaiveDateTime> {
    match bytes {
        [a, b, c, d, ..] => decode_time(u32::from_le_bytes([*a, *b, *c, *d])),
        _ => Err(Error::MalformedRecord {
            record: "timestamp",
            expected: 4,
            actual: bytes.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_epoch() {
        assert_eq!(encode_time(&dt(2000, 1, 1, 0, 0, 0)), 0);
        assert_eq!(decode_time(0).unwrap(), dt(2000, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_known_value() {
        // ((24*12*31) + 2*31 + 14) * 86400 + (8*60+30)*60
        let expected = (24 * 12 * 31 + 2 * 31 + 14) * 86_400 + (8 * 60 + 30) * 60;
        assert_eq!(encode_time(&dt(2024, 3, 15, 8, 30, 0)), expected);
    }

    #[test]
    fn test_roundtrip_month_ends() {
        for value in [dt(2019, 12, 31, 23, 59, 59), dt(2024, 2, 29, 12, 0, 1)] {
            assert_eq!(decode_time(encode_time(&value)).unwrap(), value);
        }
    }

    #[test]
    fn test_impossible_day_rejected() {
        // day slot 30 of February
        let packed = (24 * 12 * 31 + 31 + 30) * 86_400;
        assert!(matches!(decode_time(packed), Err(Error::InvalidTimestamp(p)) if p == packed));
    }

    #[test]
    fn test_bytes_helpers() {
        let value = dt(2023, 7, 4, 9, 15, 0);
        assert_eq!(decode_time_bytes(&encode_time_bytes(&value)).unwrap(), value);
        assert!(decode_time_bytes(&[1, 2]).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_decoded_values_pack_back(packed in 0u32..100 * 12 * 31 * 86_400) {
            if let Ok(value) = decode_time(packed) {
                proptest::prop_assert_eq!(encode_time(&value), packed);
            }
        }
    }
}
