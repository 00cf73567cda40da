//! Grouped bar chart of mean baseline per group, one bar per sex.

use crate::error::AllocationError;
use crate::summary::Summary;
use crate::Sex;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

const TITLE: &str = "Von Frey Mean by Group and Sex";
const SIZE: (u32, u32) = (900, 600);
/// Fraction of a group slot covered by its bars.
const BAR_SPAN: f64 = 0.8;

fn chart_error<E: std::fmt::Display>(err: E) -> AllocationError {
    AllocationError::Chart(err.to_string())
}

fn color(sex: Sex) -> RGBColor {
    match sex {
        Sex::Male => RGBColor(31, 119, 180),
        Sex::Female => RGBColor(255, 127, 14),
    }
}

fn draw<DB: DrawingBackend>(summary: &Summary, root: &DrawingArea<DB, Shift>) -> Result<(), AllocationError> {
    root.fill(&WHITE).map_err(chart_error)?;

    let groups = summary.groups().to_vec();
    let slots = groups.len().max(1) as f64;
    let (lo, hi) = summary.mean_range().unwrap_or((0.0, 1.0));
    let y_min = lo.min(0.0) * 1.1;
    let mut y_max = hi.max(0.0) * 1.1;
    if y_max <= y_min {
        y_max = y_min + 1.0;
    }

    let mut chart = ChartBuilder::on(root)
        .caption(TITLE, ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..slots - 0.5, y_min..y_max)
        .map_err(chart_error)?;

    let labels = groups.clone();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len().max(1))
        .x_label_formatter(&move |x| {
            let slot = x.round();
            if (x - slot).abs() > 1e-6 || slot < 0.0 {
                return String::new();
            }
            labels.get(slot as usize).map(|g| g.to_string()).unwrap_or_default()
        })
        .x_desc("Group")
        .y_desc("Mean Von Frey")
        .draw()
        .map_err(chart_error)?;

    let width = BAR_SPAN / Sex::ALL.len() as f64;
    for sex in Sex::ALL {
        let fill = color(sex);
        let offset = -BAR_SPAN / 2.0 + sex.index() as f64 * width;
        let bars = groups.iter().enumerate().filter_map(|(slot, group)| {
            let mean = summary.mean(*group, sex)?;
            let x0 = slot as f64 + offset;
            Some(Rectangle::new([(x0, 0.0), (x0 + width, mean)], fill.filled()))
        });
        chart
            .draw_series(bars)
            .map_err(chart_error)?
            .label(sex.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], fill.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}

/// Renders the chart as an SVG document into `out`.
pub fn render_svg(summary: &Summary, out: &mut String) -> Result<(), AllocationError> {
    let root = SVGBackend::with_string(out, SIZE).into_drawing_area();
    draw(summary, &root)
}

pub fn write_svg<P: AsRef<Path>>(summary: &Summary, path: P) -> Result<(), AllocationError> {
    let root = SVGBackend::new(path.as_ref(), SIZE).into_drawing_area();
    draw(summary, &root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::error::Error;

    #[test]
    fn test_chart_has_one_bar_per_cell() -> Result<(), Box<dyn Error>> {
        let subjects = vec![
            Subject::new(1, "m1", Sex::Male, "Cre-", Some(4.0)),
            Subject::new(2, "f1", Sex::Female, "Cre-", Some(6.0)),
            Subject::new(3, "m2", Sex::Male, "Cre+", Some(5.0)),
        ];
        let allocation = allocate(&subjects, &Design::default())?;
        let summary = Summary::from_rows(allocation.rows());
        assert_eq!(summary.rows().len(), 3);

        let mut svg = String::new();
        render_svg(&summary, &mut svg)?;
        assert!(svg.contains("<svg"));
        assert!(svg.contains(TITLE));
        assert!(svg.contains("Mean Von Frey"));
        Ok(())
    }

    #[test]
    fn test_empty_summary_still_renders() -> Result<(), Box<dyn Error>> {
        let summary = Summary::from_rows(&[]);
        let mut svg = String::new();
        render_svg(&summary, &mut svg)?;
        assert!(svg.contains("</svg>"));
        Ok(())
    }
}
