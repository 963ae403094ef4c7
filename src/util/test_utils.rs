// External imports
use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::path::{Path, PathBuf};

fn minute_times(num_rows: usize) -> Result<Vec<String>> {
    let base_date = NaiveDateTime::parse_from_str("2024-08-01 09:30:00", "%Y-%m-%d %H:%M:%S")?;
    Ok((0..num_rows)
        .map(|i| {
            (base_date + Duration::minutes(i as i64))
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .collect())
}

fn ohlcv_frame(
    times: Vec<String>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<i64>,
) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("time".into(), times).into(),
        Series::new("open".into(), open).into(),
        Series::new("high".into(), high).into(),
        Series::new("low".into(), low).into(),
        Series::new("close".into(), close).into(),
        Series::new("volume".into(), volume).into(),
    ])?;
    Ok(df)
}

/// Random-walk minute bars, reproducible for a given seed
pub fn generate_test_dataframe(num_rows: usize, seed: u64) -> Result<DataFrame> {
    let mut rng = StdRng::seed_from_u64(seed);
    let times = minute_times(num_rows)?;

    let mut close_prices = Vec::with_capacity(num_rows);
    let mut open_prices = Vec::with_capacity(num_rows);
    let mut high_prices = Vec::with_capacity(num_rows);
    let mut low_prices = Vec::with_capacity(num_rows);
    let mut volume = Vec::with_capacity(num_rows);

    let mut current_price = 100.0 + rng.random::<f64>() * 50.0;

    for _ in 0..num_rows {
        // Between -1% and +1%
        let movement = (rng.random::<f64>() * 2.0 - 1.0) * 0.01;
        current_price *= 1.0 + movement;

        let open = current_price * (1.0 + (rng.random::<f64>() * 0.01 - 0.005));
        let high = current_price.max(open) * (1.0 + rng.random::<f64>() * 0.005);
        let low = current_price.min(open) * (1.0 - rng.random::<f64>() * 0.005);
        let vol = rng.random_range(10_000..110_000i64);

        close_prices.push(current_price);
        open_prices.push(open);
        high_prices.push(high);
        low_prices.push(low);
        volume.push(vol);
    }

    ohlcv_frame(times, open_prices, high_prices, low_prices, close_prices, volume)
}

/// Close rising by a fixed 0.5 per bar with varying volume
pub fn generate_linear_trend_dataframe(num_rows: usize) -> Result<DataFrame> {
    let times = minute_times(num_rows)?;
    let close: Vec<f64> = (0..num_rows).map(|i| 100.0 + 0.5 * i as f64).collect();
    let open: Vec<f64> = close.iter().map(|c| c - 0.1).collect();
    let high: Vec<f64> = close.iter().map(|c| c + 0.3).collect();
    let low: Vec<f64> = open.iter().map(|o| o - 0.3).collect();
    let volume: Vec<i64> = (0..num_rows).map(|i| 1_000 + ((i * 37) % 500) as i64).collect();

    ohlcv_frame(times, open, high, low, close, volume)
}

/// Writes `df` as `<dir>/<name>` and returns the path
pub fn write_csv(df: &DataFrame, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut file = File::create(&path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(path)
}
