use aq_forecast::data::synthetic_records;
use aq_forecast::{ForecastRequest, ForecastService, PredictorConfig};
use chrono::{TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("AQ Forecast: Basic Forecasting Example");
    println!("======================================\n");

    // Three days of hourly readings with a daily pollution cycle
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let records = synthetic_records(72, start, 42);
    println!("Created {} hourly records\n", records.len());

    let service = ForecastService::new(PredictorConfig::default())?;
    let request = ForecastRequest::new("demo-sensor", records).with_hours_ahead(12);

    println!("Training ensemble and forecasting...");
    let response = service.predict(&request)?;

    let report = &response.model_performance;
    println!(
        "In-sample MAE {:.2}, RMSE {:.2}, R² {:.3} on {} samples",
        report.mae, report.rmse, report.r2_score, report.training_samples
    );
    println!("Ensemble weights: {:?}", report.ensemble_weights.as_map());
    println!("Top features:");
    for feature in report.top_features.iter().take(5) {
        println!("  {:<24} {:.3}", feature.feature, feature.importance);
    }

    println!("\nForecast:");
    for point in &response.predictions {
        let factors: Vec<&str> = point
            .contributing_factors
            .iter()
            .map(|f| f.factor.as_str())
            .collect();
        println!(
            "  {}  +{:>2}h  PM2.5 {:>6.2}  AQI {:>5.1}  conf {:.3}  {:?}",
            point.timestamp.format("%Y-%m-%d %H:%M"),
            point.hour_ahead,
            point.predicted_pm25,
            point.predicted_aqi,
            point.confidence,
            factors
        );
    }

    if let Some(stats) = &response.statistics {
        println!("\nStatistics: {}", stats);
    }

    Ok(())
}
