// External crates
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Internal modules
use crate::constants::*;
use crate::error::{PipelineError, Result};
use crate::util::file_utils::f64_series;

/// Technical indicators that can be layered on top of the base features
///
/// Each variant produces a fixed set of columns with fixed default periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    Sma,
    Ema,
    Macd,
    Rsi,
    BollingerBands,
    StochasticOscillator,
    FibonacciRetracement,
    Adx,
    Obv,
    Cci,
    IchimokuCloud,
}

impl Indicator {
    /// Every indicator, in evaluation order
    pub const ALL: [Indicator; 11] = [
        Indicator::Sma,
        Indicator::Ema,
        Indicator::Macd,
        Indicator::Rsi,
        Indicator::BollingerBands,
        Indicator::StochasticOscillator,
        Indicator::FibonacciRetracement,
        Indicator::Adx,
        Indicator::Obv,
        Indicator::Cci,
        Indicator::IchimokuCloud,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Sma => "SMA",
            Indicator::Ema => "EMA",
            Indicator::Macd => "MACD",
            Indicator::Rsi => "RSI",
            Indicator::BollingerBands => "Bollinger Bands",
            Indicator::StochasticOscillator => "Stochastic Oscillator",
            Indicator::FibonacciRetracement => "Fibonacci Retracement",
            Indicator::Adx => "ADX",
            Indicator::Obv => "OBV",
            Indicator::Cci => "CCI",
            Indicator::IchimokuCloud => "Ichimoku Cloud",
        }
    }

    /// Names of the columns `compute` returns, in order
    pub fn column_names(&self) -> Vec<String> {
        match self {
            Indicator::Sma => vec![format!("sma_{}", SMA_WINDOW)],
            Indicator::Ema => vec![format!("ema_{}", EMA_SPAN)],
            Indicator::Macd => vec!["macd".into(), "macd_signal".into(), "macd_hist".into()],
            Indicator::Rsi => vec![format!("rsi_{}", RSI_WINDOW)],
            Indicator::BollingerBands => {
                vec!["bb_middle".into(), "bb_upper".into(), "bb_lower".into()]
            }
            Indicator::StochasticOscillator => vec!["stoch_k".into(), "stoch_d".into()],
            Indicator::FibonacciRetracement => FIBONACCI_RATIOS
                .iter()
                .map(|r| fibonacci_column_name(*r))
                .collect(),
            Indicator::Adx => vec![
                format!("adx_{}", ADX_WINDOW),
                format!("plus_di_{}", ADX_WINDOW),
                format!("minus_di_{}", ADX_WINDOW),
            ],
            Indicator::Obv => vec!["obv".into()],
            Indicator::Cci => vec![format!("cci_{}", CCI_WINDOW)],
            Indicator::IchimokuCloud => vec![
                "ichimoku_tenkan".into(),
                "ichimoku_kijun".into(),
                "ichimoku_senkou_a".into(),
                "ichimoku_senkou_b".into(),
            ],
        }
    }

    /// Leading rows left undefined on a fully populated price series
    pub fn lookback(&self) -> usize {
        match self {
            Indicator::Sma => SMA_WINDOW - 1,
            Indicator::Ema => EMA_SPAN - 1,
            Indicator::Macd => MACD_SLOW + MACD_SIGNAL - 2,
            Indicator::Rsi => RSI_WINDOW,
            Indicator::BollingerBands => BOLLINGER_WINDOW - 1,
            Indicator::StochasticOscillator => STOCHASTIC_K_WINDOW + STOCHASTIC_D_WINDOW - 2,
            Indicator::FibonacciRetracement => FIBONACCI_WINDOW - 1,
            Indicator::Adx => 2 * ADX_WINDOW - 1,
            Indicator::Obv => 0,
            Indicator::Cci => CCI_WINDOW - 1,
            Indicator::IchimokuCloud => ICHIMOKU_SENKOU_B - 1 + ICHIMOKU_DISPLACEMENT,
        }
    }

    /// Computes the indicator columns for `df` without modifying it
    pub fn compute(&self, df: &DataFrame) -> Result<Vec<Series>> {
        let columns = match self {
            Indicator::Sma => vec![calculate_sma(df, "close", SMA_WINDOW)?],
            Indicator::Ema => vec![calculate_ema(df, "close", EMA_SPAN)?],
            Indicator::Macd => {
                let (macd, signal, hist) =
                    calculate_macd(df, MACD_FAST, MACD_SLOW, MACD_SIGNAL)?;
                vec![macd, signal, hist]
            }
            Indicator::Rsi => vec![calculate_rsi(df, RSI_WINDOW)?],
            Indicator::BollingerBands => {
                let (middle, upper, lower) =
                    calculate_bollinger_bands(df, BOLLINGER_WINDOW, BOLLINGER_NUM_STD)?;
                vec![middle, upper, lower]
            }
            Indicator::StochasticOscillator => {
                let (k, d) =
                    calculate_stochastic_oscillator(df, STOCHASTIC_K_WINDOW, STOCHASTIC_D_WINDOW)?;
                vec![k, d]
            }
            Indicator::FibonacciRetracement => {
                calculate_fibonacci_retracement(df, FIBONACCI_WINDOW, &FIBONACCI_RATIOS)?
            }
            Indicator::Adx => {
                let (adx, plus_di, minus_di) = calculate_adx(df, ADX_WINDOW)?;
                vec![adx, plus_di, minus_di]
            }
            Indicator::Obv => vec![calculate_obv(df)?],
            Indicator::Cci => vec![calculate_cci(df, CCI_WINDOW)?],
            Indicator::IchimokuCloud => calculate_ichimoku(
                df,
                ICHIMOKU_TENKAN,
                ICHIMOKU_KIJUN,
                ICHIMOKU_SENKOU_B,
                ICHIMOKU_DISPLACEMENT,
            )?,
        };
        Ok(columns)
    }

    /// Returns a copy of `df` with the indicator columns appended
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let columns: Vec<Column> = self
            .compute(df)?
            .into_iter()
            .map(|s| s.into_column())
            .collect();
        let result = df.hstack(&columns)?;
        Ok(result)
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Indicator {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace(['_', '-'], " ");
        Indicator::ALL
            .into_iter()
            .find(|i| i.name().to_lowercase() == wanted)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("Unknown indicator: {}", s)))
    }
}

fn fibonacci_column_name(ratio: f64) -> String {
    let tenths = (ratio * 1000.0).round() as i64;
    format!("fib_{}_{}", tenths / 10, tenths % 10)
}

// ---------------------------------------------------------------------------
// Window helpers. Every output is aligned with its input; a window containing
// an undefined value yields an undefined result.
// ---------------------------------------------------------------------------

fn window_options(window: usize) -> RollingOptionsFixedWindow {
    RollingOptionsFixedWindow {
        window_size: window,
        min_periods: window,
        ..Default::default()
    }
}

/// Applies a fixed-window polars aggregation; a series shorter than the
/// window comes back all null
fn rolling<F>(series: &Series, window: usize, aggregate: F) -> Result<Series>
where
    F: Fn(&Series, RollingOptionsFixedWindow) -> PolarsResult<Series>,
{
    if window == 0 {
        return Err(PipelineError::InvalidConfig("Rolling window must be positive".into()));
    }
    if series.len() < window {
        return Ok(Series::full_null(
            series.name().clone(),
            series.len(),
            &DataType::Float64,
        ));
    }
    Ok(aggregate(series, window_options(window))?)
}

fn rolling_mean(series: &Series, window: usize) -> Result<Series> {
    rolling(series, window, |s, o| s.rolling_mean(o))
}

fn rolling_std(series: &Series, window: usize) -> Result<Series> {
    rolling(series, window, |s, o| s.rolling_std(o))
}

fn rolling_max(series: &Series, window: usize) -> Result<Series> {
    rolling(series, window, |s, o| s.rolling_max(o))
}

fn rolling_min(series: &Series, window: usize) -> Result<Series> {
    rolling(series, window, |s, o| s.rolling_min(o))
}

/// Element-wise combination of two aligned series; null where either input is
fn combine<F>(name: &str, a: &Series, b: &Series, f: F) -> Result<Series>
where
    F: Fn(f64, f64) -> f64,
{
    let values: Float64Chunked = a
        .f64()?
        .into_iter()
        .zip(b.f64()?.into_iter())
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(x, y)),
            _ => None,
        })
        .collect();
    Ok(values.with_name(name.into()).into_series())
}

fn values_of(series: &Series) -> Result<Vec<Option<f64>>> {
    Ok(series.f64()?.into_iter().collect())
}

/// Exponential smoothing seeded with the mean of the first `period` defined values
///
/// Polars offers no SMA-seeded recursion, so this one is written out. An
/// undefined input resets the state and smoothing restarts after gaps.
fn exponential_smoothing(values: &[Option<f64>], period: usize, alpha: f64) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 {
        return result;
    }
    let mut prev: Option<f64> = None;
    let mut seed = Vec::with_capacity(period);

    for (i, value) in values.iter().enumerate() {
        match (*value, prev) {
            (Some(x), Some(p)) => {
                let next = alpha * x + (1.0 - alpha) * p;
                result[i] = Some(next);
                prev = Some(next);
            }
            (Some(x), None) => {
                seed.push(x);
                if seed.len() == period {
                    let start = seed.iter().sum::<f64>() / period as f64;
                    result[i] = Some(start);
                    prev = Some(start);
                    seed.clear();
                }
            }
            (None, _) => {
                prev = None;
                seed.clear();
            }
        }
    }
    result
}

fn ema(series: &Series, span: usize, name: &str) -> Result<Series> {
    let smoothed = exponential_smoothing(&values_of(series)?, span, 2.0 / (span as f64 + 1.0));
    Ok(Series::new(name.into(), smoothed))
}

/// Wilder's smoothing, as used by ADX
fn wilder(series: &Series, period: usize, name: &str) -> Result<Series> {
    let smoothed = exponential_smoothing(&values_of(series)?, period, 1.0 / period as f64);
    Ok(Series::new(name.into(), smoothed))
}

/// Mean of the highest high and lowest low over the window
fn midpoint_channel(high: &Series, low: &Series, window: usize, name: &str) -> Result<Series> {
    let sum = (&rolling_max(high, window)? + &rolling_min(low, window)?)?;
    Ok((&sum / 2.0).with_name(name.into()))
}

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// Calculates Simple Moving Average (SMA)
pub fn calculate_sma(df: &DataFrame, column: &str, window: usize) -> Result<Series> {
    let series = f64_series(df, column)?;
    Ok(rolling_mean(&series, window)?.with_name(format!("sma_{}", window).into()))
}

/// Calculates Exponential Moving Average (EMA), seeded with the first SMA
pub fn calculate_ema(df: &DataFrame, column: &str, span: usize) -> Result<Series> {
    let series = f64_series(df, column)?;
    ema(&series, span, &format!("ema_{}", span))
}

/// Calculates MACD line, signal line and histogram
pub fn calculate_macd(
    df: &DataFrame,
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<(Series, Series, Series)> {
    let close = f64_series(df, "close")?;
    let macd = (&ema(&close, fast, "ema_fast")? - &ema(&close, slow, "ema_slow")?)?
        .with_name("macd".into());
    let signal_line = ema(&macd, signal, "macd_signal")?;
    let hist = (&macd - &signal_line)?.with_name("macd_hist".into());

    Ok((macd, signal_line, hist))
}

/// Calculates Relative Strength Index (RSI) from rolling average gains and losses
pub fn calculate_rsi(df: &DataFrame, window: usize) -> Result<Series> {
    let close = f64_series(df, "close")?;
    let change = (&close - &close.shift(1))?;
    let change = change.f64()?;

    let gains = change.apply_values(|c| c.max(0.0)).into_series();
    let losses = change.apply_values(|c| (-c).max(0.0)).into_series();

    combine(
        &format!("rsi_{}", window),
        &rolling_mean(&gains, window)?,
        &rolling_mean(&losses, window)?,
        |g, l| {
            if l == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        },
    )
}

/// Calculates Bollinger Bands (middle, upper, lower)
pub fn calculate_bollinger_bands(
    df: &DataFrame,
    window: usize,
    num_std: f64,
) -> Result<(Series, Series, Series)> {
    let close = f64_series(df, "close")?;
    let middle = rolling_mean(&close, window)?.with_name("bb_middle".into());
    let width = &rolling_std(&close, window)? * num_std;

    let upper = (&middle + &width)?.with_name("bb_upper".into());
    let lower = (&middle - &width)?.with_name("bb_lower".into());

    Ok((middle, upper, lower))
}

/// Calculates the Stochastic Oscillator (%K and its %D moving average)
///
/// A flat window (highest high equals lowest low) maps to the midpoint, 50.
pub fn calculate_stochastic_oscillator(
    df: &DataFrame,
    k_window: usize,
    d_window: usize,
) -> Result<(Series, Series)> {
    let high = f64_series(df, "high")?;
    let low = f64_series(df, "low")?;
    let close = f64_series(df, "close")?;

    let lowest = rolling_min(&low, k_window)?;
    let range = (&rolling_max(&high, k_window)? - &lowest)?;
    let above_low = (&close - &lowest)?;

    let k = combine("stoch_k", &above_low, &range, |a, r| {
        if r > 0.0 {
            100.0 * a / r
        } else {
            50.0
        }
    })?;
    let d = rolling_mean(&k, d_window)?.with_name("stoch_d".into());

    Ok((k, d))
}

/// Calculates Fibonacci retracement levels of the trailing swing range
///
/// The swing high and low come from a trailing window so that no level
/// depends on later bars.
pub fn calculate_fibonacci_retracement(
    df: &DataFrame,
    window: usize,
    ratios: &[f64],
) -> Result<Vec<Series>> {
    let swing_high = rolling_max(&f64_series(df, "high")?, window)?;
    let swing_low = rolling_min(&f64_series(df, "low")?, window)?;
    let range = (&swing_high - &swing_low)?;

    ratios
        .iter()
        .map(|&ratio| {
            let level = (&swing_high - &(&range * ratio))?;
            Ok(level.with_name(fibonacci_column_name(ratio).into()))
        })
        .collect()
}

/// Calculates Average Directional Index with the +DI and -DI lines
pub fn calculate_adx(df: &DataFrame, window: usize) -> Result<(Series, Series, Series)> {
    let high = f64_series(df, "high")?;
    let low = f64_series(df, "low")?;
    let prev_close = f64_series(df, "close")?.shift(1);

    let high_low = (&high - &low)?;
    let high_close = combine("high_close", &high, &prev_close, |h, c| (h - c).abs())?;
    let low_close = combine("low_close", &low, &prev_close, |l, c| (l - c).abs())?;
    let true_range = combine(
        "true_range",
        &combine("range", &high_low, &high_close, f64::max)?,
        &low_close,
        f64::max,
    )?;

    let up = (&high - &high.shift(1))?;
    let down = (&low.shift(1) - &low)?;
    let plus_dm = combine("plus_dm", &up, &down, |u, d| if u > d && u > 0.0 { u } else { 0.0 })?;
    let minus_dm = combine("minus_dm", &up, &down, |u, d| if d > u && d > 0.0 { d } else { 0.0 })?;

    let atr = wilder(&true_range, window, "atr")?;
    let directional = |dm: &Series, name: &str| -> Result<Series> {
        combine(name, &wilder(dm, window, name)?, &atr, |d, a| {
            if a > 0.0 {
                100.0 * d / a
            } else {
                0.0
            }
        })
    };
    let plus_di = directional(&plus_dm, &format!("plus_di_{}", window))?;
    let minus_di = directional(&minus_dm, &format!("minus_di_{}", window))?;

    let dx = combine("dx", &plus_di, &minus_di, |p, m| {
        let total = p + m;
        if total > 0.0 {
            100.0 * (p - m).abs() / total
        } else {
            0.0
        }
    })?;
    let adx = wilder(&dx, window, &format!("adx_{}", window))?;

    Ok((adx, plus_di, minus_di))
}

/// Calculates On-Balance Volume, starting from zero at the first bar
pub fn calculate_obv(df: &DataFrame) -> Result<Series> {
    let close = f64_series(df, "close")?;
    let volume = f64_series(df, "volume")?;

    let direction = combine("direction", &close, &close.shift(1), |c, p| {
        if c > p {
            1.0
        } else if c < p {
            -1.0
        } else {
            0.0
        }
    })?;
    let signed_volume = values_of(&(&direction * &volume)?)?;

    // Running total; a gap leaves every later value undefined
    let mut obv = Vec::with_capacity(signed_volume.len());
    let mut running: Option<f64> = Some(0.0);
    for (i, flow) in signed_volume.iter().enumerate() {
        if i > 0 {
            running = running.zip(*flow).map(|(total, v)| total + v);
        }
        obv.push(running);
    }

    Ok(Series::new("obv".into(), obv))
}

/// Calculates Commodity Channel Index on the typical price
pub fn calculate_cci(df: &DataFrame, window: usize) -> Result<Series> {
    let high = f64_series(df, "high")?;
    let low = f64_series(df, "low")?;
    let close = f64_series(df, "close")?;

    let typical = &(&(&high + &low)? + &close)? / 3.0;
    let typical_mean = values_of(&rolling_mean(&typical, window)?)?;
    let typical = values_of(&typical)?;

    // Mean absolute deviation around each window's own mean
    let cci: Vec<Option<f64>> = (0..typical.len())
        .map(|i| {
            let mean = typical_mean[i]?;
            let deviation = typical[i + 1 - window..=i]
                .iter()
                .map(|v| v.map(|v| (v - mean).abs()))
                .sum::<Option<f64>>()?
                / window as f64;
            let last = typical[i]?;
            Some(if deviation > 0.0 {
                (last - mean) / (CCI_CONSTANT * deviation)
            } else {
                0.0
            })
        })
        .collect();

    Ok(Series::new(format!("cci_{}", window).into(), cci))
}

/// Calculates the Ichimoku Cloud conversion, base and leading spans
///
/// The lagging (chikou) span is omitted because it reads future closes.
pub fn calculate_ichimoku(
    df: &DataFrame,
    tenkan_window: usize,
    kijun_window: usize,
    senkou_b_window: usize,
    displacement: usize,
) -> Result<Vec<Series>> {
    let high = f64_series(df, "high")?;
    let low = f64_series(df, "low")?;
    let shift = displacement as i64;

    let tenkan = midpoint_channel(&high, &low, tenkan_window, "ichimoku_tenkan")?;
    let kijun = midpoint_channel(&high, &low, kijun_window, "ichimoku_kijun")?;
    let senkou_a = (&(&tenkan + &kijun)? / 2.0)
        .shift(shift)
        .with_name("ichimoku_senkou_a".into());
    let senkou_b = midpoint_channel(&high, &low, senkou_b_window, "ichimoku_senkou_b")?.shift(shift);

    Ok(vec![tenkan, kijun, senkou_a, senkou_b])
}
