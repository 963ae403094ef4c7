// External crates
use log::debug;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

// Internal modules
use crate::error::{PipelineError, Result};

/// Actual column names found in a price file, keyed by their standard role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceColumns {
    pub time: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

/// Reads a CSV file with a header row into a DataFrame
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// Returns the raw DataFrame, or an input error if the file does not exist
pub fn read_price_csv<P: AsRef<Path>>(file_path: P) -> Result<DataFrame> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(PipelineError::Input(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let file = File::open(path)?;
    let df = CsvReader::new(file).finish()?;
    debug!("Read {} rows from {}", df.height(), path.display());

    Ok(df)
}

/// Maps a column name to its standard role, ignoring case and common abbreviations
fn standard_name(column_name: &str) -> Option<&'static str> {
    let col_lower = column_name.trim().to_lowercase();
    let name = match col_lower.as_str() {
        "open" | "o" | "op" | "openprice" | "open_price" => "open",
        "high" | "h" | "highprice" | "high_price" | "max" => "high",
        "low" | "l" | "lowprice" | "low_price" | "min" => "low",
        "close" | "c" | "cl" | "closeprice" | "close_price" => "close",
        "volume" | "vol" | "v" | "volumes" => "volume",
        "timestamp" | "time" | "date" | "t" | "datetime" | "dt" | "day" => "time",
        _ => return None,
    };
    Some(name)
}

/// Resolves which columns of `df` hold the timestamp and OHLCV values
///
/// The first column matching each role wins. Fails with
/// `PipelineError::MissingColumn` naming the first role that is absent,
/// checked in the order time, open, high, low, close, volume.
pub fn resolve_price_columns(df: &DataFrame) -> Result<PriceColumns> {
    let mut found: [Option<String>; 6] = Default::default();
    let roles = ["time", "open", "high", "low", "close", "volume"];

    for column_name in df.get_column_names() {
        let Some(role) = standard_name(column_name.as_str()) else {
            continue;
        };
        if let Some(slot) = roles.iter().position(|r| *r == role) {
            if found[slot].is_none() {
                found[slot] = Some(column_name.to_string());
            }
        }
    }

    let mut take = |slot: usize| {
        found[slot]
            .take()
            .ok_or_else(|| PipelineError::MissingColumn(roles[slot].to_string()))
    };

    Ok(PriceColumns {
        time: take(0)?,
        open: take(1)?,
        high: take(2)?,
        low: take(3)?,
        close: take(4)?,
        volume: take(5)?,
    })
}

/// Reads a numeric column as a Float64 series, casting integers as needed
pub fn f64_series(df: &DataFrame, name: &str) -> Result<Series> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))?;
    let values = column.cast(&DataType::Float64).map_err(|e| {
        PipelineError::Input(format!("Column '{}' is not numeric: {}", name, e))
    })?;
    Ok(values.as_materialized_series().clone())
}

/// Reads a numeric column as optional f64 values, casting integers as needed
pub fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let values = f64_series(df, name)?.f64()?.into_iter().collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_price_columns_is_case_insensitive() {
        let df = DataFrame::new(vec![
            Series::new("Date".into(), vec!["2024-08-01", "2024-08-02"]).into(),
            Series::new("Open".into(), vec![1.0, 2.0]).into(),
            Series::new("HIGH".into(), vec![1.0, 2.0]).into(),
            Series::new("low".into(), vec![1.0, 2.0]).into(),
            Series::new("Close".into(), vec![1.0, 2.0]).into(),
            Series::new("Vol".into(), vec![10i64, 20]).into(),
        ])
        .unwrap();

        let columns = resolve_price_columns(&df).unwrap();
        assert_eq!(columns.time, "Date");
        assert_eq!(columns.high, "HIGH");
        assert_eq!(columns.volume, "Vol");
    }

    #[test]
    fn test_resolve_price_columns_reports_missing_close() {
        let df = DataFrame::new(vec![
            Series::new("date".into(), vec!["2024-08-01"]).into(),
            Series::new("open".into(), vec![1.0]).into(),
            Series::new("high".into(), vec![1.0]).into(),
            Series::new("low".into(), vec![1.0]).into(),
            Series::new("volume".into(), vec![1.0]).into(),
        ])
        .unwrap();

        match resolve_price_columns(&df) {
            Err(PipelineError::MissingColumn(name)) => assert_eq!(name, "close"),
            other => panic!("expected missing close column, got {:?}", other),
        }
    }

    #[test]
    fn test_read_price_csv_missing_file() {
        let err = read_price_csv("does/not/exist.csv").unwrap_err();
        assert!(err.is_input_error());
    }
}
