// External crates
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{info, warn};
use polars::prelude::*;
use std::path::Path;

// Local modules
use crate::constants::{
    INPUT_ROW_COLUMN, PRICE_COLUMNS, TARGET_COLUMN, TIMESTAMP_COLUMN, VOLUME_COLUMN,
    Z_SCORE_VOLUME_COLUMN,
};
use crate::error::{PipelineError, Result};
use crate::util::file_utils::{f64_series, read_price_csv, resolve_price_columns};

/// Datetime formats tried, in order, for string timestamps without an offset
const NAIVE_DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S UTC",
];

/// Datetime formats carrying a UTC offset
const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];

/// Parses a timestamp string into milliseconds since the Unix epoch
///
/// Offset-aware values are converted to UTC; naive values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.timestamp_millis());
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}

/// Formats epoch milliseconds for console output
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

/// Converts the time column of the raw file into epoch milliseconds
fn timestamps_from_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?;

    let millis: Vec<Option<i64>> = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| match value {
                None => Ok(None),
                Some(text) => parse_timestamp(text).map(Some).ok_or_else(|| {
                    PipelineError::TimestampParse {
                        row,
                        value: text.to_string(),
                    }
                }),
            })
            .collect::<Result<Vec<_>>>()?,
        DataType::Date => {
            let days = column.cast(&DataType::Int32)?;
            days.i32()?
                .into_iter()
                .map(|d| d.map(|d| d as i64 * 86_400_000))
                .collect()
        }
        DataType::Datetime(unit, _) => {
            let divisor = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            let raw = column.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .map(|v| v.map(|v| v / divisor))
                .collect()
        }
        dtype if dtype.is_integer() => {
            // Epoch seconds unless the magnitude only makes sense as milliseconds
            let raw = column.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .map(|v| v.map(|v| if v.abs() < 100_000_000_000 { v * 1_000 } else { v }))
                .collect()
        }
        other => {
            return Err(PipelineError::Input(format!(
                "Unsupported type {} for time column '{}'",
                other, name
            )))
        }
    };

    Ok(millis)
}

/// Natural log of consecutive ratios, undefined for the first bar
fn log_returns(prices: &Series, name: &str) -> Result<Series> {
    let ratio = (prices / &prices.shift(1))?;
    Ok(ratio
        .f64()?
        .apply_values(f64::ln)
        .with_name(name.into())
        .into_series())
}

/// Loads a price file into a chronologically sorted feature table
///
/// The resulting frame holds `timestamp`, raw OHLCV columns and the log
/// returns `lr_open`, `lr_high`, `lr_low`, `lr_close` (null on the first row).
///
/// # Arguments
///
/// * `file_path` - Path to a CSV with a date/time column and OHLCV columns
///
/// # Returns
///
/// Returns the prepared DataFrame, or an input error for missing columns,
/// unparseable dates, non-positive prices or duplicate timestamps
pub fn load_and_prepare_data<P: AsRef<Path>>(file_path: P) -> Result<DataFrame> {
    info!("Loading data from: {}", file_path.as_ref().display());
    let raw = read_price_csv(file_path)?;
    prepare_price_frame(&raw)
}

/// Rejects non-positive prices and non-finite values, reporting the input row
fn check_price_values(df: &DataFrame) -> Result<()> {
    let rows = df.column(INPUT_ROW_COLUMN)?.i64()?;

    for name in PRICE_COLUMNS.iter().copied().chain([VOLUME_COLUMN]) {
        let values = f64_series(df, name)?;
        let is_price = name != VOLUME_COLUMN;
        let bad_row = values
            .f64()?
            .into_iter()
            .zip(rows.into_iter())
            .find(|(value, _)| {
                value.is_some_and(|v| !v.is_finite() || (is_price && v <= 0.0))
            })
            .and_then(|(_, row)| row);

        if let Some(row) = bad_row {
            let problem = if is_price {
                "Non-positive or non-finite"
            } else {
                "Non-finite"
            };
            return Err(PipelineError::Input(format!(
                "{} {} at input row {}",
                problem, name, row
            )));
        }
    }
    Ok(())
}

/// Builds the sorted price table with log returns from an already loaded frame
pub fn prepare_price_frame(raw: &DataFrame) -> Result<DataFrame> {
    let columns = resolve_price_columns(raw)?;

    let input_rows: Vec<i64> = (0..raw.height() as i64).collect();
    let mut frame_columns: Vec<Column> = vec![
        Series::new(INPUT_ROW_COLUMN.into(), input_rows).into(),
        Series::new(
            TIMESTAMP_COLUMN.into(),
            timestamps_from_column(raw, &columns.time)?,
        )
        .into(),
    ];
    let sources = [
        &columns.open,
        &columns.high,
        &columns.low,
        &columns.close,
        &columns.volume,
    ];
    for (name, source) in PRICE_COLUMNS.iter().copied().chain([VOLUME_COLUMN]).zip(sources) {
        frame_columns.push(f64_series(raw, source)?.with_name(name.into()).into());
    }
    let frame = DataFrame::new(frame_columns)?;

    // Keep complete rows only
    let complete = frame.drop_nulls::<String>(None)?;
    let dropped = frame.height() - complete.height();
    if dropped > 0 {
        warn!("Dropped {} rows with missing values", dropped);
    }
    if complete.height() == 0 {
        return Err(PipelineError::Input("No complete price rows in input".into()));
    }
    check_price_values(&complete)?;

    let sorted = complete.sort([TIMESTAMP_COLUMN], SortMultipleOptions::default())?;
    let timestamps: Vec<i64> = sorted
        .column(TIMESTAMP_COLUMN)?
        .i64()?
        .into_no_null_iter()
        .collect();
    if let Some(pair) = timestamps.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(PipelineError::Input(format!(
            "Duplicate timestamp {}",
            format_timestamp(pair[0])
        )));
    }

    let timestamp = sorted
        .column(TIMESTAMP_COLUMN)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    let mut out_columns: Vec<Column> = vec![timestamp];
    let mut log_return_columns: Vec<Column> = Vec::with_capacity(PRICE_COLUMNS.len());
    for name in PRICE_COLUMNS {
        let prices = f64_series(&sorted, name)?;
        log_return_columns.push(log_returns(&prices, &format!("lr_{}", name))?.into());
        out_columns.push(prices.into());
    }
    out_columns.push(f64_series(&sorted, VOLUME_COLUMN)?.into());
    out_columns.extend(log_return_columns);

    let df = DataFrame::new(out_columns)?;
    info!("Prepared {} bars", df.height());
    Ok(df)
}

/// Adds the one-step-ahead close log return as the target and drops the last row
///
/// A table of N rows becomes N-1 rows whose timestamps are the original
/// prefix.
pub fn create_target_variable(df: &DataFrame) -> Result<DataFrame> {
    let n_rows = df.height();
    if n_rows < 2 {
        return Err(PipelineError::Input(format!(
            "Need at least 2 rows to build a target, got {}",
            n_rows
        )));
    }

    let target = f64_series(df, "lr_close")?
        .slice(1, n_rows - 1)
        .with_name(TARGET_COLUMN.into());

    let mut labelled = df.slice(0, n_rows - 1);
    labelled.with_column(target)?;
    Ok(labelled)
}

/// Z-scores traded volume over the whole series
///
/// Statistics span every row, test period included.
pub fn z_score_volume(df: &DataFrame) -> Result<DataFrame> {
    z_score_volume_with_reference(df, df.height())
}

/// Z-scores traded volume using statistics from the first `reference_rows` rows
///
/// The spread is the sample standard deviation (ddof = 1).
pub fn z_score_volume_with_reference(df: &DataFrame, reference_rows: usize) -> Result<DataFrame> {
    if reference_rows == 0 || reference_rows > df.height() {
        return Err(PipelineError::InvalidConfig(format!(
            "Reference rows {} out of range for {} rows",
            reference_rows,
            df.height()
        )));
    }

    let volume = f64_series(df, VOLUME_COLUMN)?;
    let reference = volume.slice(0, reference_rows);
    let reference = reference.f64()?;

    let z_scores = match (reference.mean(), reference.std(1)) {
        (Some(mean), Some(std)) if std > 0.0 && std.is_finite() => &(&volume - mean) / std,
        _ => {
            warn!("Volume has zero variance; z-score column set to 0");
            Series::new(Z_SCORE_VOLUME_COLUMN.into(), vec![0.0; volume.len()])
        }
    };

    let mut out = df.clone();
    out.with_column(z_scores.with_name(Z_SCORE_VOLUME_COLUMN.into()))?;
    Ok(out)
}

/// Reads the timestamp column back as epoch milliseconds
pub fn timestamps_millis(df: &DataFrame) -> Result<Vec<i64>> {
    let column = df
        .column(TIMESTAMP_COLUMN)
        .map_err(|_| PipelineError::MissingColumn(TIMESTAMP_COLUMN.to_string()))?;
    let raw = column.cast(&DataType::Int64)?;
    raw.i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| PipelineError::Input(format!("Null timestamp at row {}", row)))
        })
        .collect()
}
