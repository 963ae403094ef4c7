// Internal imports
use crate::constants::TARGET_COLUMN;
use crate::forest::step_1_dataset_preparation::{split_data, SplitData};
use crate::forest::step_3_random_forest::MaxFeatures;
use crate::forest::step_4_hyperparameter_tuning::{
    tune_hyperparameters, HyperparameterGrid, SearchStrategy, TunerConfig,
};
use crate::forest::step_5_train_and_evaluate::train_and_evaluate_model;
use crate::pipeline::base_features;
use crate::util::pre_processor::{create_target_variable, prepare_price_frame, z_score_volume};
use crate::util::test_utils::generate_test_dataframe;

fn base_split() -> SplitData {
    let raw = generate_test_dataframe(120, 33).unwrap();
    let prices = prepare_price_frame(&raw).unwrap();
    let df = z_score_volume(&create_target_variable(&prices).unwrap()).unwrap();
    split_data(&df, &base_features(), TARGET_COLUMN, 0.8).unwrap()
}

fn small_tuner() -> TunerConfig {
    TunerConfig {
        grid: HyperparameterGrid {
            n_estimators: vec![5, 10],
            max_depth: vec![Some(3), None],
            min_samples_split: vec![2, 10],
            min_samples_leaf: vec![1],
            max_features: vec![MaxFeatures::All, MaxFeatures::Sqrt],
        },
        strategy: SearchStrategy::Grid,
        cv_folds: 3,
        seed: 42,
    }
}

#[test]
fn test_tuning_is_deterministic() {
    let split = base_split();
    let config = small_tuner();

    let first = tune_hyperparameters(split.x_train.view(), split.y_train.view(), &config).unwrap();
    let second = tune_hyperparameters(split.x_train.view(), split.y_train.view(), &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_training_is_deterministic() {
    let split = base_split();
    let params = small_tuner().grid.candidates()[1].clone();

    let a = train_and_evaluate_model(&split, &params, 42, "a").unwrap();
    let b = train_and_evaluate_model(&split, &params, 42, "b").unwrap();

    assert_eq!(a.y_test_pred, b.y_test_pred);
    assert_eq!(a.metrics, b.metrics);
    assert_eq!(a.model.feature_importances(), b.model.feature_importances());
}

#[test]
fn test_different_seeds_change_bootstrap() {
    let split = base_split();
    let params = small_tuner().grid.candidates()[1].clone();

    let a = train_and_evaluate_model(&split, &params, 1, "a").unwrap();
    let b = train_and_evaluate_model(&split, &params, 2, "b").unwrap();
    assert_ne!(a.y_train_pred, b.y_train_pred);
}
