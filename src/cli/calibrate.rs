//! # calibrate 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/calibrate.rs`

use super::SessionArg;
use crate::analysis::calibration::DEFAULT_SAMPLE_POINTS;
use crate::models::Angle;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 图像输出格式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum PlotFormat {
    /// PNG image
    #[default]
    Png,
    /// SVG vector image
    Svg,
}

impl std::fmt::Display for PlotFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlotFormat::Png => write!(f, "png"),
            PlotFormat::Svg => write!(f, "svg"),
        }
    }
}

/// 解析道址范围 "min:max"（允许负数，如 "-200:125"）
pub fn parse_sample_range(input: &str) -> Result<(f64, f64), String> {
    let (min, max) = input
        .split_once(':')
        .ok_or_else(|| format!("Invalid range '{}'. Use MIN:MAX (e.g., -200:125)", input))?;
    let min = min
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid range minimum '{}'", min))?;
    let max = max
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid range maximum '{}'", max))?;
    if min.is_nan() || max.is_nan() || min >= max {
        return Err(format!("{} (must be min < max)", input));
    }
    Ok((min, max))
}

/// calibrate 子命令参数
#[derive(Args, Debug)]
pub struct CalibrateArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Angle table to fit (degrees)
    #[arg(short, long)]
    pub angle: Angle,

    /// Write a calibration plot to this file (format from extension, default PNG)
    #[arg(short, long)]
    pub plot: Option<PathBuf>,

    /// Channel range for sampling the fitted curves, MIN:MAX
    #[arg(
        short,
        long,
        value_parser = parse_sample_range,
        default_value = "-200:125",
        allow_hyphen_values = true
    )]
    pub range: (f64, f64),

    /// Number of sample points along the fitted curves
    #[arg(long, default_value_t = DEFAULT_SAMPLE_POINTS)]
    pub points: usize,

    /// Fit only the linear model (needs two selected rows)
    #[arg(long, conflicts_with = "plot")]
    pub linear_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_range() {
        assert_eq!(parse_sample_range("-200:125").unwrap(), (-200.0, 125.0));
        assert_eq!(parse_sample_range(" 0 : 4096 ").unwrap(), (0.0, 4096.0));
        assert!(parse_sample_range("125:-200").is_err());
        assert!(parse_sample_range("-200-125").is_err());
    }
}
