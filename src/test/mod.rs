/// Test modules for the indicator uplift experiment
///
/// This module contains test suites organized by pipeline stage:
///
/// * `pre_processor_tests` - Loading, target construction and volume scaling
/// * `feature_engineering_tests` - Indicator purity, warm-up and short-history behaviour
/// * `forest` - Splitter invariants and seed determinism of tuning and training
/// * `pipeline_tests` - End-to-end runs on synthetic price files
pub mod feature_engineering_tests;
pub mod forest;
pub mod pre_processor_tests;
