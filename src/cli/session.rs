//! # 会话管理子命令 CLI 定义
//!
//! `init`、`set`、`show` 以及 `row` 嵌套子命令。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/session.rs`

use super::SessionArg;
use crate::models::Angle;

use clap::{Args, Subcommand};

/// 解析 `DEG=NAME` 形式的表名设置
pub fn parse_table_name(input: &str) -> Result<(Angle, String), String> {
    let (angle, name) = input
        .split_once('=')
        .ok_or_else(|| format!("Invalid table name '{}'. Use DEG=NAME (e.g., 15=run12_15deg)", input))?;
    let angle = angle
        .trim()
        .parse::<Angle>()
        .map_err(|_| format!("Invalid angle '{}' in '{}'", angle, input))?;
    Ok((angle, name.trim().to_string()))
}

/// init 子命令参数
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Angle range in degrees (e.g., "15-60")
    #[arg(short, long, default_value = "15-60")]
    pub angles: String,

    /// Angle step in degrees
    #[arg(long, default_value_t = 5)]
    pub step: Angle,

    /// Session name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Overwrite an existing session file
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// set 子命令参数
#[derive(Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Session name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Target thickness (ug/cm^2)
    #[arg(short, long)]
    pub thickness: Option<String>,

    /// Target molar mass (g/mol)
    #[arg(short, long)]
    pub molar_mass: Option<String>,

    /// Angle table name as DEG=NAME (repeatable)
    #[arg(long, value_parser = parse_table_name)]
    pub table_name: Vec<(Angle, String)>,
}

/// show 子命令参数
#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Only show the peak table of this angle
    #[arg(short, long)]
    pub angle: Option<Angle>,
}

// ─────────────────────────────────────────────────────────────
// Row 主命令
// ─────────────────────────────────────────────────────────────

/// row 主命令参数
#[derive(Args, Debug)]
pub struct RowArgs {
    #[command(subcommand)]
    pub command: RowCommands,
}

/// row 子命令
#[derive(Subcommand, Debug)]
pub enum RowCommands {
    /// Append blank rows to an angle table
    Add(RowAddArgs),

    /// Remove a row from an angle table
    Remove(RowIndexArgs),

    /// Select a row for the calibration fit (or deselect with --off)
    Use(RowUseArgs),

    /// Set the known state energy of a row
    Energy(RowEnergyArgs),
}

/// row add 参数
#[derive(Args, Debug)]
pub struct RowAddArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Angle table (degrees)
    #[arg(short, long)]
    pub angle: Angle,

    /// Number of rows to append
    #[arg(short, long, default_value_t = 1)]
    pub count: usize,
}

/// row remove 参数
#[derive(Args, Debug)]
pub struct RowIndexArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Angle table (degrees)
    #[arg(short, long)]
    pub angle: Angle,

    /// Row index (1-based, as shown by `show`)
    #[arg(short, long)]
    pub index: usize,
}

/// row use 参数
#[derive(Args, Debug)]
pub struct RowUseArgs {
    #[command(flatten)]
    pub row: RowIndexArgs,

    /// Deselect the row instead
    #[arg(long, default_value_t = false)]
    pub off: bool,
}

/// row energy 参数
#[derive(Args, Debug)]
pub struct RowEnergyArgs {
    #[command(flatten)]
    pub row: RowIndexArgs,

    /// State energy (keV)
    #[arg(short, long)]
    pub energy: f64,

    /// Energy uncertainty (keV)
    #[arg(long)]
    pub error: Option<f64>,
}
