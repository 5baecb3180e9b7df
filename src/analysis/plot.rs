//! # 图表生成
//!
//! 使用 `plotters` 生成刻度拟合图和角分布图。
//!
//! ## 功能
//! - 刻度图：数据点（带双向误差棒）、线性与二次拟合曲线，下方为残差面板
//! - 角分布图：单个激发态的微分截面随角度变化，对数纵轴，带误差棒；
//!   下方面板为各角度的实测峰位与该态能量的对比
//! - 支持 PNG 和 SVG 输出
//!
//! ## 依赖关系
//! - 被 `commands/calibrate.rs` 和 `commands/cross_section.rs` 调用
//! - 使用 `analysis/calibration.rs` 的 CalibrationResult
//! - 使用 `plotters` 渲染图表

use crate::analysis::calibration::CalibrationResult;
use crate::error::{Result, SpscalError};
use crate::models::CrossSectionRow;

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// 默认图像尺寸
pub const DEFAULT_WIDTH: u32 = 1200;
pub const DEFAULT_HEIGHT: u32 = 900;

const DATA_COLOR: RGBColor = RGBColor(0, 0, 0);
const LINEAR_COLOR: RGBColor = RGBColor(0, 102, 204);
const QUADRATIC_COLOR: RGBColor = RGBColor(204, 51, 0);

/// 图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }
}

/// 刻度曲线采样设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRange {
    pub min: f64,
    pub max: f64,
    pub points: usize,
}

fn plot_err<E: std::fmt::Debug>(e: E) -> SpscalError {
    SpscalError::Other(format!("{:?}", e))
}

/// 生成刻度拟合图
pub fn generate_calibration_plot(
    result: &CalibrationResult,
    range: SampleRange,
    title: &str,
    output_path: &Path,
    format: ImageFormat,
) -> Result<()> {
    let size = (DEFAULT_WIDTH, DEFAULT_HEIGHT);
    match format {
        ImageFormat::Svg => {
            let root = SVGBackend::new(output_path, size).into_drawing_area();
            draw_calibration_chart(&root, result, range, title)?;
            root.present().map_err(plot_err)?;
        }
        ImageFormat::Png => {
            let root = BitMapBackend::new(output_path, size).into_drawing_area();
            draw_calibration_chart(&root, result, range, title)?;
            root.present().map_err(plot_err)?;
        }
    }
    Ok(())
}

/// 生成角分布图
pub fn generate_angular_plot(
    row: &CrossSectionRow,
    title: &str,
    output_path: &Path,
    format: ImageFormat,
) -> Result<()> {
    let size = (DEFAULT_WIDTH, DEFAULT_HEIGHT);
    match format {
        ImageFormat::Svg => {
            let root = SVGBackend::new(output_path, size).into_drawing_area();
            draw_angular_chart(&root, row, title)?;
            root.present().map_err(plot_err)?;
        }
        ImageFormat::Png => {
            let root = BitMapBackend::new(output_path, size).into_drawing_area();
            draw_angular_chart(&root, row, title)?;
            root.present().map_err(plot_err)?;
        }
    }
    Ok(())
}

/// 给区间两端各留出一定比例的空白
fn padded(min: f64, max: f64, fraction: f64) -> (f64, f64) {
    let span = max - min;
    let pad = if span > 0.0 { span * fraction } else { min.abs().max(1.0) * fraction };
    (min - pad, max + pad)
}

fn draw_calibration_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    result: &CalibrationResult,
    range: SampleRange,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_err)?;

    let (_, height) = root.dim_in_pixel();
    let (upper, lower) = root.split_vertically((height * 2 / 3) as i32);

    let curve = result.sample(range.min, range.max, range.points);

    // 纵轴范围同时覆盖数据点和采样曲线
    let energies = result
        .points
        .iter()
        .flat_map(|p| [p.energy - p.energy_error, p.energy + p.energy_error])
        .chain(curve.iter().flat_map(|(_, lin, quad)| [*lin, *quad]));
    let (y_min, y_max) = energies.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (y_min, y_max) = padded(y_min, y_max, 0.05);

    let x_lo = result
        .points
        .iter()
        .map(|p| p.position - p.position_error)
        .fold(range.min, f64::min);
    let x_hi = result
        .points
        .iter()
        .map(|p| p.position + p.position_error)
        .fold(range.max, f64::max);

    let mut chart = ChartBuilder::on(&upper)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_lo..x_hi, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .y_desc("Energy (keV)")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    let lin = result.linear();
    chart
        .draw_series(LineSeries::new(
            curve.iter().map(|(x, y, _)| (*x, *y)),
            LINEAR_COLOR.stroke_width(2),
        ))
        .map_err(plot_err)?
        .label(format!("linear: {:.5}·x + {:.3}", lin.slope, lin.intercept))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], LINEAR_COLOR.stroke_width(2)));

    let quad = result.quadratic();
    chart
        .draw_series(LineSeries::new(
            curve.iter().map(|(x, _, y)| (*x, *y)),
            QUADRATIC_COLOR.stroke_width(2),
        ))
        .map_err(plot_err)?
        .label(format!(
            "quadratic: {:.3e}·x² + {:.5}·x + {:.3}",
            quad.a, quad.b, quad.c
        ))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], QUADRATIC_COLOR.stroke_width(2)));

    chart
        .draw_series(result.points.iter().map(|p| {
            ErrorBar::new_vertical(
                p.position,
                p.energy - p.energy_error,
                p.energy,
                p.energy + p.energy_error,
                DATA_COLOR.filled(),
                6,
            )
        }))
        .map_err(plot_err)?;
    chart
        .draw_series(result.points.iter().map(|p| {
            ErrorBar::new_horizontal(
                p.energy,
                p.position - p.position_error,
                p.position,
                p.position + p.position_error,
                DATA_COLOR.filled(),
                6,
            )
        }))
        .map_err(plot_err)?;
    chart
        .draw_series(
            result
                .points
                .iter()
                .map(|p| Circle::new((p.position, p.energy), 4, DATA_COLOR.filled())),
        )
        .map_err(plot_err)?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    // 残差面板
    let residual_max = result
        .residuals_linear
        .iter()
        .chain(result.residuals_quadratic.iter())
        .zip(result.points.iter().chain(result.points.iter()))
        .map(|(r, p)| r.abs() + p.sigma)
        .fold(0.0_f64, f64::max);
    let residual_max = if residual_max > 0.0 { residual_max * 1.2 } else { 1.0 };

    let mut residual_chart = ChartBuilder::on(&lower)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_lo..x_hi, -residual_max..residual_max)
        .map_err(plot_err)?;

    residual_chart
        .configure_mesh()
        .x_desc("Position (channel)")
        .y_desc("Residual (keV)")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    residual_chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(x_lo, 0.0), (x_hi, 0.0)],
            BLACK.mix(0.5).stroke_width(1),
        )))
        .map_err(plot_err)?;

    for (residuals, color) in [
        (&result.residuals_linear, LINEAR_COLOR),
        (&result.residuals_quadratic, QUADRATIC_COLOR),
    ] {
        residual_chart
            .draw_series(residuals.iter().zip(&result.points).map(|(r, p)| {
                ErrorBar::new_vertical(p.position, r - p.sigma, *r, r + p.sigma, color.filled(), 6)
            }))
            .map_err(plot_err)?;
    }

    Ok(())
}

fn draw_angular_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    row: &CrossSectionRow,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let data: Vec<(f64, f64, f64)> = row
        .angular_distribution()
        .into_iter()
        .filter(|(_, xs, _)| *xs > 0.0)
        .collect();
    if data.is_empty() {
        return Err(SpscalError::InvalidArgument(format!(
            "no positive cross-sections to plot for {} keV",
            row.energy
        )));
    }

    root.fill(&WHITE).map_err(plot_err)?;

    let (_, height) = root.dim_in_pixel();
    let (upper, lower) = root.split_vertically((height * 2 / 3) as i32);

    let lowest = data.iter().map(|(_, xs, _)| *xs).fold(f64::INFINITY, f64::min);
    let highest = data
        .iter()
        .map(|(_, xs, err)| xs + err)
        .fold(f64::NEG_INFINITY, f64::max);
    let (y_min, y_max) = (lowest / 3.0, highest * 3.0);

    let x_max = data
        .iter()
        .map(|(a, _, _)| *a)
        .chain(row.positions.keys().map(|&a| a as f64))
        .fold(0.0_f64, f64::max)
        + 5.0;

    let mut chart = ChartBuilder::on(&upper)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(30)
        .x_label_area_size(40)
        .y_label_area_size(90)
        .build_cartesian_2d(0.0..x_max, (y_min..y_max).log_scale())
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .y_desc("dσ/dΩ (mb/sr)")
        .y_label_formatter(&|y| format!("{:.1e}", y))
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(data.iter().map(|(angle, xs, err)| {
            // 对数轴下误差棒下端截断到绘图下限
            let low = (xs - err).max(y_min);
            ErrorBar::new_vertical(*angle, low, *xs, xs + err, LINEAR_COLOR.filled(), 8)
        }))
        .map_err(plot_err)?;

    chart
        .draw_series(
            data.iter()
                .map(|(angle, xs, _)| Circle::new((*angle, *xs), 5, LINEAR_COLOR.filled())),
        )
        .map_err(plot_err)?;

    draw_position_panel(&lower, row, x_max)
}

/// 实测峰位面板：各角度峰位 ± 误差，与态能量水平线对比
fn draw_position_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    row: &CrossSectionRow,
    x_max: f64,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (lo, hi) = row
        .positions
        .values()
        .flat_map(|m| [m.position - m.error, m.position + m.error])
        .chain([row.energy])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (y_min, y_max) = if hi > lo {
        padded(lo, hi, 0.2)
    } else {
        (lo - 1.0, hi + 1.0)
    };

    let mut chart = ChartBuilder::on(area)
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("θ_lab (°)")
        .y_desc("Peak position")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(0.0, row.energy), (x_max, row.energy)],
            QUADRATIC_COLOR.stroke_width(1),
        )))
        .map_err(plot_err)?;

    chart
        .draw_series(row.positions.iter().map(|(&angle, m)| {
            ErrorBar::new_vertical(
                angle as f64,
                m.position - m.error,
                m.position,
                m.position + m.error,
                DATA_COLOR.filled(),
                8,
            )
        }))
        .map_err(plot_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calibration::CalibrationFitter;
    use crate::models::{CrossSectionCell, MeasuredPosition, PeakRecord};
    use std::collections::BTreeMap;

    fn calibration() -> CalibrationResult {
        let rows: Vec<PeakRecord> = [-120.0_f64, -40.0, 30.0, 90.0]
            .iter()
            .map(|&x| PeakRecord {
                use_row: true,
                energy: Some(-10.0 * x + 3000.0 + 0.5 * (x / 50.0).sin()),
                energy_error: Some(2.0),
                position: Some(x),
                position_error: Some(0.5),
                ..PeakRecord::default()
            })
            .collect();
        CalibrationFitter::default().fit(&rows).unwrap()
    }

    #[test]
    fn test_calibration_plot_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.svg");
        let range = SampleRange {
            min: -200.0,
            max: 125.0,
            points: 100,
        };
        generate_calibration_plot(&calibration(), range, "15-deg", &path, ImageFormat::Svg).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<svg"));
    }

    #[test]
    fn test_angular_plot_svg() {
        let mut cells = BTreeMap::new();
        for (angle, xs) in [(15, 2.5e-3), (20, 1.1e-3), (25, 6.0e-4)] {
            cells.insert(
                angle,
                CrossSectionCell::Value {
                    cross_section: xs,
                    uncertainty: xs * 0.15,
                },
            );
        }
        cells.insert(
            30,
            CrossSectionCell::Unavailable {
                reason: "missing".to_string(),
            },
        );
        let positions = [(15, 4438.7), (20, 4439.4), (25, 4439.1)]
            .into_iter()
            .map(|(angle, position)| (angle, MeasuredPosition { position, error: 0.3 }))
            .collect();
        let row = CrossSectionRow {
            energy: 4439.0,
            cells,
            positions,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("4439.svg");
        generate_angular_plot(&row, "4439 keV", &path, ImageFormat::Svg).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Peak position"));

        // 没有峰位时下方面板只画能量线
        let bare = CrossSectionRow {
            positions: BTreeMap::new(),
            ..row
        };
        generate_angular_plot(&bare, "4439 keV", &path, ImageFormat::Svg).unwrap();
    }

    #[test]
    fn test_angular_plot_rejects_empty() {
        let row = CrossSectionRow {
            energy: 4439.0,
            cells: BTreeMap::new(),
            positions: BTreeMap::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.svg");
        assert!(generate_angular_plot(&row, "empty", &path, ImageFormat::Svg).is_err());
    }
}
