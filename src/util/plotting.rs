//! Diagnostic charts of actual against predicted next-bar log-returns.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::ArrayView1;
use plotters::prelude::*;

use crate::error::{PipelineError, Result};
use crate::forest::step_1_dataset_preparation::SplitData;
use crate::forest::step_5_train_and_evaluate::Evaluation;
use crate::util::model_logger::sanitize_file_name;

const PLOT_SIZE: (u32, u32) = (1280, 900);

fn plot_error<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Plot(e.to_string())
}

fn value_range(a: ArrayView1<f64>, b: ArrayView1<f64>) -> (f64, f64) {
    let (lo, hi) = a
        .iter()
        .chain(b.iter())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    // Flat data still needs a non-empty axis
    let pad = ((hi - lo) * 0.05).max(1e-9);
    (lo - pad, hi + pad)
}

fn draw_segment<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    title: &str,
    actual: ArrayView1<f64>,
    predicted: ArrayView1<f64>,
) -> Result<()> {
    let (y_min, y_max) = value_range(actual, predicted);
    let n = actual.len().max(1);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22).into_font())
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(70)
        .build_cartesian_2d(0usize..n, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("bar")
        .y_desc("log-return")
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            actual.iter().enumerate().map(|(i, v)| (i, *v)),
            &BLUE,
        ))
        .map_err(plot_error)?
        .label("Actual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            predicted.iter().enumerate().map(|(i, v)| (i, *v)),
            &RED,
        ))
        .map_err(plot_error)?
        .label("Predicted")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;
    Ok(())
}

/// Writes `<dir>/<model_name>.svg` with one panel per segment
///
/// Panel titles carry the segment date range and its RMSE and R².
pub fn plot_and_save_results(
    dir: &Path,
    model_name: &str,
    split: &SplitData,
    evaluation: &Evaluation,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_path = dir.join(format!("{}.svg", sanitize_file_name(model_name)));

    {
        let root = SVGBackend::new(&file_path, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(plot_error)?;
        let root = root
            .titled(model_name, ("sans-serif", 28).into_font())
            .map_err(plot_error)?;
        let panels = root.split_evenly((2, 1));

        let (train_start, train_end) = split.train_range();
        let (test_start, test_end) = split.test_range();
        let metrics = &evaluation.metrics;

        draw_segment(
            &panels[0],
            &format!(
                "Train {} .. {} (RMSE {:.3e}, R2 {:.3})",
                train_start, train_end, metrics.train.rmse, metrics.train.r2
            ),
            split.y_train.view(),
            evaluation.y_train_pred.view(),
        )?;
        draw_segment(
            &panels[1],
            &format!(
                "Test {} .. {} (RMSE {:.3e}, R2 {:.3})",
                test_start, test_end, metrics.test.rmse, metrics.test.r2
            ),
            split.y_test.view(),
            evaluation.y_test_pred.view(),
        )?;

        root.present().map_err(plot_error)?;
    }
    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_value_range_pads_flat_data() {
        let a = array![0.5, 0.5];
        let (lo, hi) = value_range(a.view(), a.view());
        assert!(lo < 0.5 && hi > 0.5);

        let empty = ndarray::Array1::<f64>::zeros(0);
        assert_eq!(value_range(empty.view(), empty.view()), (-1.0, 1.0));
    }
}
