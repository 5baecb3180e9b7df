//! # convert 子命令 CLI 定义
//!
//! 批量将峰拟合文件 (.fit/.xml) 转换为九列 CSV 峰表。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/convert.rs`

use clap::Args;
use std::path::PathBuf;

/// convert 子命令参数
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input fit file or directory containing fit files
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory for CSV tables
    #[arg(short, long)]
    pub output: PathBuf,

    /// Glob pattern(s) for input files, comma separated
    #[arg(short, long, default_value = "*.fit,*.xml")]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
