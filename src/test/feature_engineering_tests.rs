// External imports
use polars::prelude::*;

// Internal imports
use crate::util::feature_engineering::{
    calculate_bollinger_bands, calculate_fibonacci_retracement, calculate_ichimoku,
    calculate_obv, calculate_rsi, calculate_sma, calculate_stochastic_oscillator, Indicator,
};
use crate::util::pre_processor::prepare_price_frame;
use crate::util::test_utils::{generate_linear_trend_dataframe, generate_test_dataframe};

fn price_frame(num_rows: usize, seed: u64) -> DataFrame {
    let raw = generate_test_dataframe(num_rows, seed).unwrap();
    prepare_price_frame(&raw).unwrap()
}

fn values(series: &Series) -> Vec<Option<f64>> {
    series.f64().unwrap().into_iter().collect()
}

fn leading_nulls(series: &Series) -> usize {
    values(series).iter().take_while(|v| v.is_none()).count()
}

#[test]
fn test_columns_match_declared_names_and_length() {
    let df = price_frame(150, 7);
    for indicator in Indicator::ALL {
        let columns = indicator.compute(&df).unwrap();
        let names: Vec<String> = columns.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, indicator.column_names(), "{}", indicator);
        assert!(columns.iter().all(|s| s.len() == df.height()));
    }
}

#[test]
fn test_warm_up_matches_lookback() {
    let df = price_frame(200, 8);
    for indicator in Indicator::ALL {
        let columns = indicator.compute(&df).unwrap();
        let longest = columns.iter().map(leading_nulls).max().unwrap();
        assert_eq!(longest, indicator.lookback(), "{}", indicator);

        // Defined from the end of the warm-up onwards
        for series in &columns {
            let vals = values(series);
            let start = leading_nulls(series);
            assert!(vals[start..].iter().all(|v| v.is_some()), "{}", series.name());
        }
    }
}

#[test]
fn test_indicators_are_pure() {
    let df = price_frame(120, 9);
    let snapshot = df.clone();
    for indicator in Indicator::ALL {
        let first = indicator.compute(&df).unwrap();
        let second = indicator.compute(&df).unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(a.equals_missing(b), "{}", indicator);
        }
        let applied = indicator.apply(&df).unwrap();
        assert_eq!(applied.width(), df.width() + first.len());
    }
    assert!(df.equals_missing(&snapshot));
}

#[test]
fn test_short_history_yields_null_columns() {
    let df = price_frame(5, 10);
    for indicator in Indicator::ALL {
        let columns = indicator.compute(&df).unwrap();
        if indicator == Indicator::Obv {
            assert_eq!(columns[0].null_count(), 0);
            continue;
        }
        for series in &columns {
            assert_eq!(series.null_count(), 5, "{}", series.name());
        }
    }
}

#[test]
fn test_sma_of_linear_close() {
    let raw = generate_linear_trend_dataframe(30).unwrap();
    let df = prepare_price_frame(&raw).unwrap();
    let sma = values(&calculate_sma(&df, "close", 20).unwrap());

    // mean of 100.0 ..= 109.5
    assert!((sma[19].unwrap() - 104.75).abs() < 1e-9);
    assert!((sma[20].unwrap() - 105.25).abs() < 1e-9);
}

#[test]
fn test_rsi_of_rising_close_is_100() {
    let raw = generate_linear_trend_dataframe(30).unwrap();
    let df = prepare_price_frame(&raw).unwrap();
    let rsi = values(&calculate_rsi(&df, 14).unwrap());
    assert_eq!(rsi[29], Some(100.0));
}

#[test]
fn test_bollinger_bands_are_ordered() {
    let df = price_frame(80, 11);
    let (middle, upper, lower) = calculate_bollinger_bands(&df, 20, 2.0).unwrap();
    let (middle, upper, lower) = (values(&middle), values(&upper), values(&lower));
    for i in 19..80 {
        let (m, u, l) = (middle[i].unwrap(), upper[i].unwrap(), lower[i].unwrap());
        assert!(l <= m && m <= u);
        assert!(((u - m) - (m - l)).abs() < 1e-9);
    }
}

#[test]
fn test_stochastic_stays_in_range() {
    let df = price_frame(80, 12);
    let (k, d) = calculate_stochastic_oscillator(&df, 14, 3).unwrap();
    for v in values(&k).into_iter().chain(values(&d)).flatten() {
        assert!((0.0..=100.0).contains(&v));
    }
}

#[test]
fn test_obv_accumulates_signed_volume() {
    let raw = generate_linear_trend_dataframe(4).unwrap();
    let df = prepare_price_frame(&raw).unwrap();
    let obv = values(&calculate_obv(&df).unwrap());

    // volumes are 1000, 1037, 1074, 1111 and close always rises
    assert_eq!(obv, vec![Some(0.0), Some(1037.0), Some(2111.0), Some(3222.0)]);
}

#[test]
fn test_ichimoku_leading_spans_are_displaced() {
    let df = price_frame(160, 12);
    let spans = calculate_ichimoku(&df, 9, 26, 52, 26).unwrap();
    let tenkan = values(&spans[0]);
    let kijun = values(&spans[1]);
    let senkou_a = values(&spans[2]);

    assert_eq!(leading_nulls(&spans[2]), 25 + 26);
    assert_eq!(leading_nulls(&spans[3]), 51 + 26);
    for i in 26..df.height() {
        let expected = tenkan[i - 26].zip(kijun[i - 26]).map(|(t, k)| (t + k) / 2.0);
        match (senkou_a[i], expected) {
            (Some(a), Some(e)) => assert!((a - e).abs() < 1e-9, "row {}", i),
            (a, e) => assert_eq!(a, e, "row {}", i),
        }
    }
}

#[test]
fn test_fibonacci_levels_span_trailing_range() {
    let df = generate_linear_trend_dataframe(12).unwrap();
    let df = prepare_price_frame(&df).unwrap();
    let levels = calculate_fibonacci_retracement(&df, 4, &[0.0, 0.5, 1.0]).unwrap();

    let high = values(&df.column("high").unwrap().as_materialized_series().clone());
    let low = values(&df.column("low").unwrap().as_materialized_series().clone());
    let top = values(&levels[0]);
    let middle = values(&levels[1]);
    let bottom = values(&levels[2]);

    assert_eq!(leading_nulls(&levels[0]), 3);
    for i in 3..df.height() {
        let swing_high = high[i - 3..=i].iter().flatten().cloned().fold(f64::MIN, f64::max);
        let swing_low = low[i - 3..=i].iter().flatten().cloned().fold(f64::MAX, f64::min);
        assert!((top[i].unwrap() - swing_high).abs() < 1e-9);
        assert!((bottom[i].unwrap() - swing_low).abs() < 1e-9);
        assert!((middle[i].unwrap() - (swing_high + swing_low) / 2.0).abs() < 1e-9);
    }
}
