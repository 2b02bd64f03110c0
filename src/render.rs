//! Chart rendering seam
//!
//! The visualization router prepares a [`ChartSpec`] from the table and
//! hands it to a [`ChartRenderer`]; the production renderer draws with
//! plotters into an in-memory RGB buffer and encodes it as PNG. Rendering
//! is fallible and callers are expected to recover.

use crate::error::{AgentError, Result};
use image::ImageOutputFormat;
use plotters::coord::Shift;
use plotters::prelude::*;

/// Data for one chart, already extracted from the table.
#[derive(Debug, Clone)]
pub enum ChartSpec {
    Scatter {
        x_label: String,
        y_label: String,
        points: Vec<(f64, f64)>,
    },
    Pie {
        label: String,
        slices: Vec<(String, f64)>,
    },
    Bar {
        label: String,
        bars: Vec<(String, f64)>,
    },
    Histogram {
        label: String,
        values: Vec<f64>,
    },
}

pub trait ChartRenderer: Send + Sync {
    /// Produce raster bytes (PNG) for the spec.
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>>;
}

pub struct PlottersRenderer {
    width: u32,
    height: u32,
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

const PIE_COLORS: &[RGBColor] = &[
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
];

impl ChartRenderer for PlottersRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<Vec<u8>> {
        let (w, h) = (self.width, self.height);
        let mut rgb = vec![0u8; (w * h * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut rgb, (w, h)).into_drawing_area();
            root.fill(&WHITE)
                .map_err(|e| AgentError::Render(e.to_string()))?;

            match spec {
                ChartSpec::Scatter {
                    x_label,
                    y_label,
                    points,
                } => draw_scatter(&root, x_label, y_label, points)?,
                ChartSpec::Pie { slices, .. } => draw_pie(&root, slices)?,
                ChartSpec::Bar { label, bars } => draw_bar(&root, label, bars)?,
                ChartSpec::Histogram { label, values } => draw_histogram(&root, label, values)?,
            }

            root.present()
                .map_err(|e| AgentError::Render(e.to_string()))?;
        }
        encode_png(w, h, rgb)
    }
}

fn draw_scatter(
    root: &DrawingArea<BitMapBackend, Shift>,
    x_label: &str,
    y_label: &str,
    points: &[(f64, f64)],
) -> Result<()> {
    let (x_min, x_max) = padded_range(points.iter().map(|p| p.0));
    let (y_min, y_max) = padded_range(points.iter().map(|p| p.1));

    let mut chart = ChartBuilder::on(root)
        .margin(24)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| AgentError::Render(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()
        .map_err(|e| AgentError::Render(e.to_string()))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 3, BLUE.filled())),
        )
        .map_err(|e| AgentError::Render(e.to_string()))?;

    Ok(())
}

fn draw_pie(root: &DrawingArea<BitMapBackend, Shift>, slices: &[(String, f64)]) -> Result<()> {
    if slices.is_empty() {
        return Err(AgentError::Render("no slices to draw".to_string()));
    }
    let dims = root.dim_in_pixel();
    let center = ((dims.0 / 2) as i32, (dims.1 / 2) as i32);
    let radius = dims.0.min(dims.1) as f64 * 0.35;

    let sizes: Vec<f64> = slices.iter().map(|s| s.1).collect();
    let labels: Vec<String> = slices.iter().map(|s| s.0.clone()).collect();
    let colors: Vec<RGBColor> = (0..sizes.len())
        .map(|i| PIE_COLORS[i % PIE_COLORS.len()])
        .collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 18).into_font().color(&BLACK));
    root.draw(&pie)
        .map_err(|e| AgentError::Render(e.to_string()))?;
    Ok(())
}

fn draw_bar(
    root: &DrawingArea<BitMapBackend, Shift>,
    label: &str,
    bars: &[(String, f64)],
) -> Result<()> {
    let n = bars.len().max(1);
    let top = bars.iter().map(|b| b.1).fold(0.0f64, f64::max).max(1.0) * 1.1;
    let labels: Vec<String> = bars.iter().map(|b| b.0.clone()).collect();

    let mut chart = ChartBuilder::on(root)
        .margin(24)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(0f64..n as f64, 0f64..top)
        .map_err(|e| AgentError::Render(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n)
        .x_label_formatter(&|x| {
            labels
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .x_desc(label)
        .y_desc("count")
        .draw()
        .map_err(|e| AgentError::Render(e.to_string()))?;

    chart
        .draw_series(bars.iter().enumerate().map(|(i, (_, v))| {
            Rectangle::new([(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *v)], BLUE.filled())
        }))
        .map_err(|e| AgentError::Render(e.to_string()))?;

    Ok(())
}

fn draw_histogram(
    root: &DrawingArea<BitMapBackend, Shift>,
    label: &str,
    values: &[f64],
) -> Result<()> {
    const BINS: usize = 10;
    let (min, max) = padded_range(values.iter().copied());
    let width = ((max - min) / BINS as f64).max(f64::EPSILON);

    let mut counts = [0u32; BINS];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(BINS - 1);
        counts[idx] += 1;
    }
    let top = counts.iter().copied().max().unwrap_or(0).max(1) as f64 * 1.1;

    let mut chart = ChartBuilder::on(root)
        .margin(24)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(min..max, 0f64..top)
        .map_err(|e| AgentError::Render(e.to_string()))?;

    chart
        .configure_mesh()
        .x_desc(label)
        .y_desc("count")
        .draw()
        .map_err(|e| AgentError::Render(e.to_string()))?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, &c)| {
            let x0 = min + i as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, c as f64)], BLUE.filled())
        }))
        .map_err(|e| AgentError::Render(e.to_string()))?;

    Ok(())
}

/// Range of the data with a small margin; degenerate and empty inputs get a
/// unit range so chart construction never divides by zero.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 0.5, max + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

fn encode_png(w: u32, h: u32, rgb: Vec<u8>) -> Result<Vec<u8>> {
    let img = image::RgbImage::from_raw(w, h, rgb)
        .ok_or_else(|| AgentError::Render("raster buffer size mismatch".to_string()))?;
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| AgentError::Render(format!("PNG encoding failed: {}", e)))?;
    Ok(out.into_inner())
}
