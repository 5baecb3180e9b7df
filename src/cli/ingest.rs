//! # 数据导入子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/ingest.rs`

use super::SessionArg;
use crate::models::Angle;

use clap::Args;
use std::path::PathBuf;

/// load-input 子命令参数
#[derive(Args, Debug)]
pub struct LoadInputArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Run input file (molar mass / thickness line, then angle, BCI hits, BCI scale rows)
    pub file: PathBuf,
}

/// load-fit 子命令参数
#[derive(Args, Debug)]
pub struct LoadFitArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Angle table to replace (degrees)
    #[arg(short, long)]
    pub angle: Angle,

    /// Peak fit file (.fit or .xml)
    pub file: PathBuf,
}

/// load-volumes 子命令参数
#[derive(Args, Debug)]
pub struct LoadVolumesArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Volume file named `<energy>_*.txt`, line i = volume and error at the i-th angle
    pub file: PathBuf,
}
