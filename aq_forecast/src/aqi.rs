//! PM2.5 to Air Quality Index conversion (US EPA breakpoints)

/// `(pm_low, pm_high, aqi_low, aqi_high)` bands, linear inside each band
pub const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 7] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.1, 35.4, 51.0, 100.0),
    (35.5, 55.4, 101.0, 150.0),
    (55.5, 150.4, 151.0, 200.0),
    (150.5, 250.4, 201.0, 300.0),
    (250.5, 350.4, 301.0, 400.0),
    (350.5, 500.4, 401.0, 500.0),
];

/// Highest reportable AQI
pub const MAX_AQI: f64 = 500.0;

/// Convert a PM2.5 concentration (µg/m³) to AQI.
///
/// Concentrations falling in the 0.1 µg/m³ gaps between published bands are
/// interpolated along the next band, which keeps the mapping monotonic.
/// The result is always within `[0, 500]`.
pub fn pm25_to_aqi(pm25: f64) -> f64 {
    if pm25.is_nan() {
        return 0.0;
    }
    let pm25 = pm25.clamp(0.0, 1000.0);

    for (bp_low, bp_high, aqi_low, aqi_high) in PM25_BREAKPOINTS {
        if pm25 <= bp_high {
            let fraction = (pm25 - bp_low) / (bp_high - bp_low);
            let aqi = aqi_low + fraction * (aqi_high - aqi_low);
            return aqi.clamp(0.0, MAX_AQI);
        }
    }

    MAX_AQI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_edges_exact() {
        assert_eq!(pm25_to_aqi(0.0), 0.0);
        assert_eq!(pm25_to_aqi(12.0), 50.0);
        assert_eq!(pm25_to_aqi(35.4), 100.0);
        assert_relative_eq!(pm25_to_aqi(55.4), 150.0, epsilon = 1e-9);
        assert_relative_eq!(pm25_to_aqi(500.4), 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(pm25_to_aqi(-10.0), 0.0);
        assert_eq!(pm25_to_aqi(800.0), 500.0);
        assert_eq!(pm25_to_aqi(f64::INFINITY), 500.0);
        assert_eq!(pm25_to_aqi(f64::NAN), 0.0);
    }

    #[test]
    fn test_monotonic_across_gaps() {
        let mut previous = pm25_to_aqi(0.0);
        let mut pm = 0.0;
        while pm <= 600.0 {
            let aqi = pm25_to_aqi(pm);
            assert!(aqi + 1e-9 >= previous, "AQI decreased at pm25={}", pm);
            assert!((0.0..=500.0).contains(&aqi));
            previous = aqi;
            pm += 0.01;
        }
    }
}
