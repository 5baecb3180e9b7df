//! # calibrate 命令实现
//!
//! 对指定角度勾选的峰做线性与二次能量刻度拟合，打印参数和残差，
//! 可选输出刻度图。不修改会话文件。
//!
//! ## 依赖关系
//! - 使用 `cli/calibrate.rs` 定义的参数
//! - 使用 `analysis/calibration.rs`, `analysis/plot.rs`
//! - 使用 `utils/output.rs`

use super::load;
use crate::analysis::calibration::{CalibrationFitter, CalibrationResult, PolyFit};
use crate::analysis::plot::{self, ImageFormat, SampleRange};
use crate::cli::calibrate::CalibrateArgs;
use crate::error::{Result, SpscalError};
use crate::utils::output;

use std::path::Path;
use tabled::{Table, Tabled};

/// 拟合参数显示行
#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Model")]
    model: &'static str,
    #[tabled(rename = "Parameter")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Std. error")]
    error: String,
}

/// 数据点与残差显示行
#[derive(Tabled)]
struct ResidualRow {
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "E (keV)")]
    energy: String,
    #[tabled(rename = "σ")]
    sigma: String,
    #[tabled(rename = "Res. linear")]
    linear: String,
    #[tabled(rename = "Res. quadratic")]
    quadratic: String,
}

/// 从文件扩展名推断图像格式
pub fn guess_format_from_extension(path: &Path) -> ImageFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("svg") => ImageFormat::Svg,
        _ => ImageFormat::Png,
    }
}

fn parameter_rows(model: &'static str, names: &[&'static str], fit: &PolyFit) -> Vec<ParameterRow> {
    // 系数按幂次升序存放，显示时按最高次在前
    names
        .iter()
        .zip(fit.coefficients.iter().zip(&fit.errors).rev())
        .map(|(&name, (value, error))| ParameterRow {
            model,
            name,
            value: format!("{:.6e}", value),
            error: format!("{:.3e}", error),
        })
        .collect()
}

fn print_result(result: &CalibrationResult) {
    let mut rows = parameter_rows("linear", &["m", "c"], &result.linear_fit);
    rows.extend(parameter_rows("quadratic", &["a", "b", "c"], &result.quadratic_fit));
    println!("{}", Table::new(&rows));

    let n = result.points.len();
    for (model, fit) in [("linear", &result.linear_fit), ("quadratic", &result.quadratic_fit)] {
        let reduced = fit
            .reduced_chi_squared(n)
            .map(|r| format!("{:.4}", r))
            .unwrap_or_else(|| "n/a".to_string());
        output::print_info(&format!(
            "{}: χ² = {:.4}, χ²/ndf = {}",
            model, fit.chi_squared, reduced
        ));
    }

    output::print_separator();
    let residuals: Vec<ResidualRow> = result
        .points
        .iter()
        .zip(result.residuals_linear.iter().zip(&result.residuals_quadratic))
        .map(|(p, (lin, quad))| ResidualRow {
            position: p.position.to_string(),
            energy: p.energy.to_string(),
            sigma: format!("{:.4}", p.sigma),
            linear: format!("{:+.4}", lin),
            quadratic: format!("{:+.4}", quad),
        })
        .collect();
    println!("{}", Table::new(&residuals));
}

/// 执行 calibrate 命令
pub fn execute(args: CalibrateArgs) -> Result<()> {
    let session = load(&args.session)?;
    let table = session.table(args.angle)?;

    let title = if table.name.is_empty() {
        table.label()
    } else {
        table.name.clone()
    };
    output::print_header(&format!("Energy Calibration: {}", title));

    if args.linear_only {
        let model = CalibrationFitter::default().fit_linear(&table.rows)?;
        output::print_field("slope m", &format!("{:.6e}", model.slope));
        output::print_field("intercept c", &format!("{:.6e}", model.intercept));
        return Ok(());
    }

    let result = CalibrationFitter::default().fit(&table.rows)?;
    output::print_info(&format!("{} selected rows", result.points.len()));
    print_result(&result);

    if let Some(ref plot_path) = args.plot {
        if args.points < 2 {
            return Err(SpscalError::InvalidArgument(
                "--points must be at least 2".to_string(),
            ));
        }
        let range = SampleRange {
            min: args.range.0,
            max: args.range.1,
            points: args.points,
        };
        plot::generate_calibration_plot(
            &result,
            range,
            &title,
            plot_path,
            guess_format_from_extension(plot_path),
        )?;
        output::print_success(&format!("Calibration plot saved to '{}'", plot_path.display()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SessionArg;
    use crate::models::{PeakRecord, Session};
    use crate::parsers::session_file;

    #[test]
    fn test_guess_format() {
        assert_eq!(guess_format_from_extension(Path::new("cal.SVG")), ImageFormat::Svg);
        assert_eq!(guess_format_from_extension(Path::new("cal.png")), ImageFormat::Png);
        assert_eq!(guess_format_from_extension(Path::new("cal")), ImageFormat::Png);
    }

    #[test]
    fn test_parameter_rows_order() {
        let fit = PolyFit {
            coefficients: vec![3.0, 2.0, 1.0],
            errors: vec![0.3, 0.2, 0.1],
            covariance: vec![vec![0.0; 3]; 3],
            chi_squared: 0.0,
        };
        let rows = parameter_rows("quadratic", &["a", "b", "c"], &fit);
        assert_eq!(rows[0].name, "a");
        assert_eq!(rows[0].value, format!("{:.6e}", 1.0));
        assert_eq!(rows[2].value, format!("{:.6e}", 3.0));
    }

    #[test]
    fn test_execute_with_plot() {
        let dir = tempfile::tempdir().unwrap();
        let arg = SessionArg {
            session: dir.path().join("session.json"),
        };

        let mut session = Session::with_angles(&[15]);
        session.table_mut(15).unwrap().rows = [-100.0, -20.0, 60.0]
            .iter()
            .map(|&x| PeakRecord {
                use_row: true,
                energy: Some(-10.0 * x + 5000.0 + 0.01 * x * x),
                energy_error: Some(1.0),
                position: Some(x),
                position_error: Some(0.2),
                ..PeakRecord::default()
            })
            .collect();
        session_file::save_session(&session, &arg.session).unwrap();

        let plot_path = dir.path().join("cal.svg");
        execute(CalibrateArgs {
            session: arg.clone(),
            angle: 15,
            plot: Some(plot_path.clone()),
            range: (-200.0, 125.0),
            points: 50,
            linear_only: false,
        })
        .unwrap();
        assert!(plot_path.exists());

        // 只剩两行勾选时二次拟合失败
        session.table_mut(15).unwrap().rows[1].use_row = false;
        session_file::save_session(&session, &arg.session).unwrap();
        assert!(matches!(
            execute(CalibrateArgs {
                session: arg,
                angle: 15,
                plot: None,
                range: (-200.0, 125.0),
                points: 50,
                linear_only: false,
            }),
            Err(SpscalError::FitError(_))
        ));

        // 线性拟合两行即可
        execute(CalibrateArgs {
            session: SessionArg {
                session: dir.path().join("session.json"),
            },
            angle: 15,
            plot: None,
            range: (-200.0, 125.0),
            points: 50,
            linear_only: true,
        })
        .unwrap();
    }
}
