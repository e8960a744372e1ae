use aq_forecast::utils::date_parser::parse_timestamp;
use aq_forecast::utils::{round_to, safe_divide};
use chrono::{TimeZone, Utc};
use rstest::rstest;

#[rstest]
#[case("2024-01-02T03:04:05Z")]
#[case("2024-01-02T05:04:05+02:00")]
#[case("2024-01-02T03:04:05")]
#[case("2024-01-02 03:04:05")]
fn test_timestamp_formats(#[case] input: &str) {
    let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(parse_timestamp(input).unwrap(), expected);
}

#[test]
fn test_bad_timestamp() {
    assert!(parse_timestamp("yesterday").is_err());
}

#[test]
fn test_safe_divide_and_rounding() {
    let out = safe_divide(&[1.0, 2.0, f64::NAN], &[2.0, 0.0, 1.0], 0.5);
    assert_eq!(out, vec![0.5, 0.5, 0.5]);
    assert_eq!(round_to(12.3456, 2), 12.35);
    assert_eq!(round_to(0.12345, 3), 0.123);
}
