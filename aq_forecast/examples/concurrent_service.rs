use aq_forecast::data::synthetic_records;
use aq_forecast::{ForecastService, PredictorConfig};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::thread;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("AQ Forecast: Concurrent Service Example");
    println!("=======================================\n");

    let mut config = PredictorConfig::default();
    config.random_forest.n_estimators = 30;
    config.gradient_boosting.n_estimators = 30;

    let service = Arc::new(ForecastService::new(config)?);
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    // Publish an initial predictor
    service.retrain(&synthetic_records(96, start, 1), true)?;

    // Retrain in the background while readers keep forecasting
    let writer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for seed in 2..5 {
                match service.retrain(&synthetic_records(96, start, seed), true) {
                    Ok(report) => println!("retrained: R² {:.3}", report.r2_score),
                    Err(e) => println!("retrain failed: {}", e),
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|reader| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let records = synthetic_records(48, start, 100 + reader);
                for _ in 0..3 {
                    let generation = service.current().map(|p| p.generation());
                    match service.forecast_with_current(&records, 6) {
                        Ok(points) => println!(
                            "reader {} on generation {:?}: first PM2.5 {:.2}",
                            reader, generation, points[0].predicted_pm25
                        ),
                        Err(e) => println!("reader {} failed: {}", reader, e),
                    }
                }
            })
        })
        .collect();

    for handle in readers {
        let _ = handle.join();
    }
    let _ = writer.join();

    let info = service.model_info();
    println!("\nFinal generation: {:?}", info.generation);
    println!("Trained variants: {:?}", info.trained_variants);

    Ok(())
}
