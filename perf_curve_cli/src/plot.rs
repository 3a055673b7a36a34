use std::panic;
use std::path::Path;

use anyhow::Result;
use perf_curve::{Polylines, SampleDataset, SamplePoint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};

/// Everything drawn on one chart background.
pub struct ChartData<'a> {
    pub dataset: &'a SampleDataset,
    pub scatter: &'a [SamplePoint],
    pub lines: &'a Polylines,
}

#[derive(Clone, Copy, Debug)]
pub enum ChartKind {
    Png,
    Svg,
}

/// Render, turning backend panics (missing fonts, bad paths) into errors.
pub fn render_chart_guard(data: &ChartData, path: &Path, kind: ChartKind) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(data, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(data: &ChartData, path: &Path, kind: ChartKind) -> Result<()> {
    if data.scatter.is_empty() {
        return Ok(());
    }
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, (1280, 760)).into_drawing_area();
            draw_chart(root, data)?;
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, (1280, 760)).into_drawing_area();
            draw_chart(root, data)?;
        }
    }
    Ok(())
}

/// Envelope of every curve's absolute bounds, padded by 3% per side.
fn chart_bounds(dataset: &SampleDataset) -> ((f64, f64), (f64, f64)) {
    let mut x = (f64::INFINITY, f64::NEG_INFINITY);
    let mut y = (f64::INFINITY, f64::NEG_INFINITY);
    for curve in dataset.curves.values() {
        x = (x.0.min(curve.absolute_min_x), x.1.max(curve.absolute_max_x));
        y = (y.0.min(curve.absolute_min_y), y.1.max(curve.absolute_max_y));
    }
    let pad = |(lo, hi): (f64, f64)| {
        let margin = ((hi - lo) * 0.03).max(1.0);
        (lo - margin, hi + margin)
    };
    (pad(x), pad(y))
}

fn draw_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, data: &ChartData) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let dataset = data.dataset;
    let ((x_min, x_max), (y_min, y_max)) = chart_bounds(dataset);

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            &dataset.title,
            FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal),
        )
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .x_desc(format!("{} ({})", dataset.x_axis.label, dataset.x_axis.unit))
        .y_desc(format!("{} ({})", dataset.y_axis.label, dataset.y_axis.unit))
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for (idx, (key, line)) in data.lines.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(
                line.iter().map(|p| (p.x, p.y)),
                color.stroke_width(2),
            ))?
            .label(format!(
                "{} {} {}",
                dataset.parameter.label, key.0, dataset.parameter.unit
            ))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
    }

    chart.draw_series(
        data.scatter
            .iter()
            .map(|p| Circle::new((p.x, p.y), 2, BLACK.mix(0.6).filled())),
    )?;

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_curve::Registry;

    #[test]
    fn test_chart_bounds_cover_every_curve() {
        let registry = Registry::builtin().unwrap();
        let dataset = registry.get("mtow").unwrap();
        let ((x_min, x_max), (y_min, y_max)) = chart_bounds(dataset);
        for curve in dataset.curves.values() {
            assert!(x_min < curve.absolute_min_x && curve.absolute_max_x < x_max);
            assert!(y_min < curve.absolute_min_y && curve.absolute_max_y < y_max);
        }
    }
}
