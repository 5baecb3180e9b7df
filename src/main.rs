//! # spscal - SPS 能量刻度与微分截面工具
//!
//! 分裂极谱仪 (split-pole spectrograph) 数据分析流程的命令行实现：
//! 峰拟合文件导入、道址 -> 能量刻度拟合、跨角度激发态对齐与微分截面计算。
//!
//! ## 子命令
//! - `init` / `set` / `show` / `row` - 会话管理
//! - `load-input` / `load-fit` / `load-volumes` - 数据导入
//! - `calibrate` - 能量刻度拟合
//! - `cross-section` - 微分截面计算与导出
//! - `convert` - 拟合文件批量转 CSV
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── parsers/   (拟合文件、输入文件、会话文件)
//!   │     ├── analysis/  (刻度拟合、对齐、截面、导出、绘图)
//!   │     ├── batch/     (批量收集与并行执行)
//!   │     └── models/    (数据模型)
//!   ├── utils/      (输出与进度条)
//!   └── error.rs    (错误处理)
//! ```

mod analysis;
mod batch;
mod cli;
mod commands;
mod error;
mod models;
mod parsers;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
