//! # 分析模块
//!
//! 刻度拟合、激发态对齐、截面计算以及结果导出和绘图。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: aligner, calibration, cross_section, export, plot

pub mod aligner;
pub mod calibration;
pub mod cross_section;
pub mod export;
pub mod plot;

pub use aligner::MatchPolicy;
pub use cross_section::compute_table;
