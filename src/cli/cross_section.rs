//! # cross-section 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/cross_section.rs`

use super::calibrate::PlotFormat;
use super::SessionArg;

use clap::Args;
use std::path::PathBuf;

/// cross-section 子命令参数
#[derive(Args, Debug)]
pub struct CrossSectionArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Match state energies across angles within this tolerance (keV); exact match if omitted
    #[arg(short, long)]
    pub tolerance: Option<f64>,

    /// Only export and plot these states (comma-separated energies in keV); all states if omitted
    #[arg(long, value_delimiter = ',')]
    pub states: Vec<f64>,

    /// Write one `<E>_keV.txt` file per state into this directory
    #[arg(short, long)]
    pub export: Option<PathBuf>,

    /// Write the whole cross-section table as CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write one angular-distribution plot per state into this directory
    #[arg(short, long)]
    pub plot: Option<PathBuf>,

    /// Image format for angular-distribution plots
    #[arg(short, long, value_enum, default_value = "png")]
    pub format: PlotFormat,
}
