// External imports
use polars::prelude::*;

// Internal imports
use crate::constants::{TARGET_COLUMN, Z_SCORE_VOLUME_COLUMN};
use crate::error::PipelineError;
use crate::util::file_utils::column_as_f64;
use crate::util::pre_processor::{
    create_target_variable, load_and_prepare_data, prepare_price_frame, timestamps_millis,
    z_score_volume, z_score_volume_with_reference,
};
use crate::util::test_utils::{generate_linear_trend_dataframe, generate_test_dataframe, write_csv};

fn defined(df: &DataFrame, name: &str) -> Vec<f64> {
    column_as_f64(df, name).unwrap().into_iter().flatten().collect()
}

#[test]
fn test_target_drops_last_row() {
    let raw = generate_test_dataframe(50, 1).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let labelled = create_target_variable(&prices).unwrap();

    assert_eq!(labelled.height(), 49);

    let before = timestamps_millis(&prices).unwrap();
    let after = timestamps_millis(&labelled).unwrap();
    assert_eq!(after, before[..49].to_vec());
    assert!(after.windows(2).all(|w| w[0] < w[1]));

    // target[i] is lr_close[i + 1]
    let lr_close = column_as_f64(&prices, "lr_close").unwrap();
    let target = column_as_f64(&labelled, TARGET_COLUMN).unwrap();
    for i in 0..49 {
        assert_eq!(target[i], lr_close[i + 1]);
    }
}

#[test]
fn test_target_needs_two_rows() {
    let raw = generate_test_dataframe(1, 1).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    assert!(matches!(
        create_target_variable(&prices),
        Err(PipelineError::Input(_))
    ));
}

#[test]
fn test_unsorted_input_is_sorted() {
    let raw = generate_linear_trend_dataframe(10).unwrap();
    let reversed = raw.reverse();
    let prices = prepare_price_frame(&reversed).unwrap();

    let close = defined(&prices, "close");
    assert!(close.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(close[0], 100.0);
}

#[test]
fn test_duplicate_timestamps_are_rejected() {
    let raw = generate_linear_trend_dataframe(5).unwrap();
    let doubled = raw.vstack(&raw.slice(0, 1)).unwrap();
    assert!(matches!(
        prepare_price_frame(&doubled),
        Err(PipelineError::Input(_))
    ));
}

#[test]
fn test_non_positive_price_is_rejected() {
    let mut raw = generate_linear_trend_dataframe(5).unwrap();
    raw.with_column(Series::new("low".into(), vec![99.0, 0.0, 99.0, 99.0, 99.0]))
        .unwrap();
    assert!(prepare_price_frame(&raw).unwrap_err().is_input_error());
}

#[test]
fn test_bad_price_reports_input_row_after_dropped_rows() {
    let mut raw = generate_linear_trend_dataframe(5).unwrap();
    let close = vec![Some(100.0), None, Some(-1.0), Some(101.5), Some(102.0)];
    raw.with_column(Series::new("close".into(), close)).unwrap();

    match prepare_price_frame(&raw) {
        Err(PipelineError::Input(message)) => {
            assert!(message.contains("close"), "{}", message);
            assert!(message.ends_with("input row 2"), "{}", message);
        }
        other => panic!("expected input error, got {:?}", other.map(|df| df.height())),
    }
}

#[test]
fn test_prepared_frame_has_no_loader_columns() {
    let raw = generate_linear_trend_dataframe(6).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let names: Vec<String> = prices
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "timestamp", "open", "high", "low", "close", "volume", "lr_open", "lr_high",
            "lr_low", "lr_close"
        ]
    );
}

#[test]
fn test_z_score_volume_full_series() {
    let raw = generate_test_dataframe(200, 3).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let scaled = z_score_volume(&prices).unwrap();

    let z = defined(&scaled, Z_SCORE_VOLUME_COLUMN);
    let n = z.len() as f64;
    let mean = z.iter().sum::<f64>() / n;
    let var = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

    assert!(mean.abs() < 1e-9, "mean {}", mean);
    assert!((var.sqrt() - 1.0).abs() < 1e-9, "std {}", var.sqrt());
}

#[test]
fn test_z_score_volume_with_training_reference() {
    let raw = generate_test_dataframe(100, 4).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let scaled = z_score_volume_with_reference(&prices, 80).unwrap();

    let z = defined(&scaled, Z_SCORE_VOLUME_COLUMN);
    let reference_mean = z[..80].iter().sum::<f64>() / 80.0;
    assert!(reference_mean.abs() < 1e-9);
    assert_eq!(z.len(), 100);

    assert!(z_score_volume_with_reference(&prices, 0).is_err());
    assert!(z_score_volume_with_reference(&prices, 101).is_err());
}

#[test]
fn test_constant_volume_gives_zero_scores() {
    let mut raw = generate_linear_trend_dataframe(10).unwrap();
    raw.with_column(Series::new("volume".into(), vec![500i64; 10]))
        .unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let scaled = z_score_volume(&prices).unwrap();
    assert!(defined(&scaled, Z_SCORE_VOLUME_COLUMN).iter().all(|v| *v == 0.0));
}

#[test]
fn test_missing_close_column_fails_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let raw = generate_linear_trend_dataframe(20).unwrap().drop("close").unwrap();
    let path = write_csv(&raw, dir.path(), "no_close.csv").unwrap();

    match load_and_prepare_data(&path) {
        Err(PipelineError::MissingColumn(name)) => assert_eq!(name, "close"),
        other => panic!("expected missing close column, got {:?}", other.map(|df| df.height())),
    }
}

#[test]
fn test_load_from_csv_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let raw = generate_test_dataframe(30, 5).unwrap();
    let path = write_csv(&raw, dir.path(), "bars.csv").unwrap();

    let prices = load_and_prepare_data(&path).unwrap();
    assert_eq!(prices.height(), 30);
    for name in ["lr_open", "lr_high", "lr_low", "lr_close"] {
        let column = column_as_f64(&prices, name).unwrap();
        assert!(column[0].is_none());
        assert!(column[1..].iter().all(|v| v.is_some()));
    }
}
