//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `init` / `set` / `show`: 会话管理
//! - `row`: 峰表行编辑（嵌套子命令）
//! - `load-input` / `load-fit` / `load-volumes`: 数据导入
//! - `calibrate`: 能量刻度拟合
//! - `cross-section`: 微分截面计算与导出
//! - `convert`: 批量将拟合文件转换为 CSV
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: session, ingest, calibrate, cross_section, convert

pub mod calibrate;
pub mod convert;
pub mod cross_section;
pub mod ingest;
pub mod session;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// spscal - SPS 能量刻度与截面计算工具
#[derive(Parser)]
#[command(name = "spscal")]
#[command(version)]
#[command(about = "Energy calibration and differential cross-sections for split-pole spectrograph runs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 所有会话命令共用的会话文件参数
#[derive(Args, Debug, Clone)]
pub struct SessionArg {
    /// Session file (JSON)
    #[arg(short, long, env = "SPSCAL_SESSION")]
    pub session: PathBuf,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new session with empty angle tables
    Init(session::InitArgs),

    /// Set session name, target parameters or table names
    Set(session::SetArgs),

    /// Show session contents
    Show(session::ShowArgs),

    /// Edit rows of an angle table
    Row(session::RowArgs),

    /// Load target parameters and BCI rows from a run input file
    LoadInput(ingest::LoadInputArgs),

    /// Load a peak fit file (.fit/.xml) into an angle table
    LoadFit(ingest::LoadFitArgs),

    /// Load a volume file (one line per angle) into the angle tables
    LoadVolumes(ingest::LoadVolumesArgs),

    /// Fit channel -> energy calibration for one angle
    Calibrate(calibrate::CalibrateArgs),

    /// Compute differential cross-sections for all aligned states
    CrossSection(cross_section::CrossSectionArgs),

    /// Convert peak fit files to CSV tables in batch
    Convert(convert::ConvertArgs),
}
