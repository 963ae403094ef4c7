// External imports
use polars::prelude::*;

// Internal imports
use crate::constants::TARGET_COLUMN;
use crate::error::PipelineError;
use crate::forest::step_1_dataset_preparation::{split_data, usable_rows};
use crate::pipeline::base_features;
use crate::util::feature_engineering::Indicator;
use crate::util::pre_processor::{create_target_variable, prepare_price_frame, z_score_volume};
use crate::util::test_utils::generate_test_dataframe;

fn base_table(num_rows: usize) -> DataFrame {
    let raw = generate_test_dataframe(num_rows, 21).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let labelled = create_target_variable(&prices).unwrap();
    z_score_volume(&labelled).unwrap()
}

#[test]
fn test_split_covers_usable_rows_in_order() {
    let df = base_table(101);
    let features = base_features();
    let split = split_data(&df, &features, TARGET_COLUMN, 0.8).unwrap();

    // 100 labelled rows, the first has no log returns
    assert_eq!(split.n_train() + split.n_test(), 99);
    assert_eq!(split.n_train(), 79);
    assert_eq!(split.x_train.ncols(), 5);
    assert_eq!(split.x_train.nrows(), split.y_train.len());
    assert_eq!(split.x_test.nrows(), split.y_test.len());

    let last_train = *split.train_timestamps.last().unwrap();
    let first_test = *split.test_timestamps.first().unwrap();
    assert!(last_train < first_test);
}

#[test]
fn test_split_with_indicator_drops_warm_up_rows() {
    let base = base_table(101);
    let df = Indicator::Sma.apply(&base).unwrap();
    let mut features = base_features();
    features.extend(Indicator::Sma.column_names());

    let (rows, labels, _) = usable_rows(&df, &features, TARGET_COLUMN).unwrap();
    assert_eq!(rows.len(), 100 - Indicator::Sma.lookback());
    assert_eq!(labels.len(), rows.len());

    let split = split_data(&df, &features, TARGET_COLUMN, 0.8).unwrap();
    assert_eq!(split.n_train() + split.n_test(), rows.len());
    assert!(split.x_train.iter().all(|v| v.is_finite()));
}

#[test]
fn test_split_errors() {
    let df = base_table(30);
    let features = base_features();

    assert!(matches!(
        split_data(&df, &features, TARGET_COLUMN, 1.0),
        Err(PipelineError::InvalidConfig(_))
    ));
    assert!(matches!(
        split_data(&df, &[], TARGET_COLUMN, 0.8),
        Err(PipelineError::InvalidConfig(_))
    ));
    assert!(matches!(
        split_data(&df, &["sma_20".to_string()], TARGET_COLUMN, 0.8),
        Err(PipelineError::MissingColumn(_))
    ));

    let tiny = base_table(3);
    assert!(matches!(
        split_data(&tiny, &features, TARGET_COLUMN, 0.8),
        Err(PipelineError::InsufficientData(_))
    ));
}

#[test]
fn test_split_sizes_follow_ratio() {
    let df = base_table(121);
    let features = base_features();
    let (rows, _, _) = usable_rows(&df, &features, TARGET_COLUMN).unwrap();
    let n_usable = rows.len();

    for ratio in [0.1, 0.5, 0.8, 0.95] {
        let split = split_data(&df, &features, TARGET_COLUMN, ratio).unwrap();

        assert_eq!(split.n_train() + split.n_test(), n_usable, "ratio {}", ratio);
        assert_eq!(
            split.n_train(),
            (n_usable as f64 * ratio).floor() as usize,
            "ratio {}",
            ratio
        );

        let max_train = split.train_timestamps.iter().max().unwrap();
        let min_test = split.test_timestamps.iter().min().unwrap();
        assert!(max_train < min_test, "ratio {}", ratio);
    }
}
