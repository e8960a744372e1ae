use aq_forecast::aqi::pm25_to_aqi;
use aq_forecast::metrics::{ForecastStatistics, Trend};
use aq_forecast::ForecastPoint;
use chrono::Utc;
use rstest::rstest;

#[rstest]
#[case(0.0, 0.0)]
#[case(12.0, 50.0)]
#[case(35.4, 100.0)]
#[case(55.4, 150.0)]
#[case(150.4, 200.0)]
#[case(500.4, 500.0)]
#[case(900.0, 500.0)]
fn test_aqi_breakpoints(#[case] pm25: f64, #[case] expected: f64) {
    assert_eq!(pm25_to_aqi(pm25), expected);
}

#[test]
fn test_aqi_monotone_and_bounded() {
    let mut previous = pm25_to_aqi(-10.0);
    assert_eq!(previous, 0.0);

    let mut pm25 = 0.0;
    while pm25 <= 1200.0 {
        let aqi = pm25_to_aqi(pm25);
        assert!((0.0..=500.0).contains(&aqi));
        assert!(aqi >= previous, "AQI decreased at pm25={}", pm25);
        previous = aqi;
        pm25 += 0.05;
    }
    assert_eq!(pm25_to_aqi(f64::NAN), 0.0);
}

fn point(hour_ahead: usize, pm25: f64) -> ForecastPoint {
    ForecastPoint {
        hour_ahead,
        predicted_pm25: pm25,
        predicted_aqi: pm25_to_aqi(pm25),
        confidence: 0.5,
        timestamp: Utc::now(),
        contributing_factors: Vec::new(),
        model_version: "2.2".to_string(),
    }
}

#[test]
fn test_statistics_serialization() {
    let stats = ForecastStatistics::from_points(&[point(1, 10.0), point(2, 14.0)]).unwrap();
    assert_eq!(stats.trend, Trend::Increasing);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["trend"], "increasing");
    assert_eq!(json["min"], 10.0);
    assert_eq!(json["max"], 14.0);
}
