// Input data
pub const DATA_FILE_PATH: &str = "SPY_2024-08.csv";

// Output locations
pub const METRICS_DIR: &str = "metrics";
pub const PLOTS_DIR: &str = "plots";
pub const ALL_METRICS_FILE_NAME: &str = "all_model_performance_metrics.csv";
pub const BEST_PARAMS_FILE_NAME: &str = "best_hyperparameters.json";

// Column names produced by the loader
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const PRICE_COLUMNS: [&str; 4] = ["open", "high", "low", "close"];
pub const VOLUME_COLUMN: &str = "volume";
pub const Z_SCORE_VOLUME_COLUMN: &str = "z_score_volume";
pub const TARGET_COLUMN: &str = "lr_close_t+1";
// Position of a row in the raw input file, used only while loading
pub const INPUT_ROW_COLUMN: &str = "input_row";

// Base model features
pub const BASE_FEATURES: [&str; 5] = ["lr_open", "lr_high", "lr_low", "lr_close", "z_score_volume"];

// Model labels
pub const BASE_MODEL_NAME: &str = "Base_Random_Forest";
pub const INDICATOR_MODEL_PREFIX: &str = "Random_Forest_with_";

// Data split
pub const TRAIN_SPLIT_RATIO: f64 = 0.8; // 80% train, 20% test, by position

// Reproducibility
pub const RANDOM_SEED: u64 = 42;

// Hyperparameter search
pub const CV_FOLDS: usize = 5;
pub const GRID_N_ESTIMATORS: [usize; 2] = [50, 100];
pub const GRID_MAX_DEPTH: [Option<usize>; 3] = [Some(5), Some(10), None];
pub const GRID_MIN_SAMPLES_SPLIT: [usize; 2] = [2, 10];
pub const GRID_MIN_SAMPLES_LEAF: [usize; 1] = [1];

// Indicator periods
pub const SMA_WINDOW: usize = 20;
pub const EMA_SPAN: usize = 20;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const RSI_WINDOW: usize = 14;
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_NUM_STD: f64 = 2.0;
pub const STOCHASTIC_K_WINDOW: usize = 14;
pub const STOCHASTIC_D_WINDOW: usize = 3;
pub const FIBONACCI_WINDOW: usize = 50;
pub const FIBONACCI_RATIOS: [f64; 4] = [0.236, 0.382, 0.5, 0.618];
pub const ADX_WINDOW: usize = 14;
pub const CCI_WINDOW: usize = 20;
pub const CCI_CONSTANT: f64 = 0.015;
pub const ICHIMOKU_TENKAN: usize = 9;
pub const ICHIMOKU_KIJUN: usize = 26;
pub const ICHIMOKU_SENKOU_B: usize = 52;
pub const ICHIMOKU_DISPLACEMENT: usize = 26;
