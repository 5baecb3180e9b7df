//! # 截面结果数据模型
//!
//! 由峰表、BCI 表和靶参数每次重新计算得到的派生视图，不作为持久化数据源。
//!
//! ## 依赖关系
//! - 由 `analysis/cross_section.rs` 生成
//! - 被 `analysis/export.rs`、`analysis/plot.rs` 和 `commands/` 使用

use crate::models::peak::Angle;

use serde::Serialize;
use std::collections::BTreeMap;

/// 单个 (能级, 角度) 截面单元
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CrossSectionCell {
    /// 微分截面 (mb/sr) 及其不确定度
    Value {
        cross_section: f64,
        uncertainty: f64,
    },
    /// 无法计算，附原因
    Unavailable { reason: String },
}

impl CrossSectionCell {
    /// 取出数值对
    pub fn value(&self) -> Option<(f64, f64)> {
        match self {
            CrossSectionCell::Value {
                cross_section,
                uncertainty,
            } => Some((*cross_section, *uncertainty)),
            CrossSectionCell::Unavailable { .. } => None,
        }
    }
}

/// 某角度下该激发态的实测峰位（已刻度数据时为 keV）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasuredPosition {
    pub position: f64,
    pub error: f64,
}

/// 单个激发态的截面行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSectionRow {
    /// 激发态能量 (keV)
    pub energy: f64,
    /// 每个角度的截面
    pub cells: BTreeMap<Angle, CrossSectionCell>,
    /// 每个角度的实测峰位，用于跨角度一致性检查
    pub positions: BTreeMap<Angle, MeasuredPosition>,
}

impl CrossSectionRow {
    /// 可用的 (角度, 截面, 不确定度) 序列，用于绘制角分布
    pub fn angular_distribution(&self) -> Vec<(f64, f64, f64)> {
        self.cells
            .iter()
            .filter_map(|(angle, cell)| cell.value().map(|(xs, err)| (*angle as f64, xs, err)))
            .collect()
    }
}

/// 截面表
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossSectionTable {
    /// 列角度（升序）
    pub angles: Vec<Angle>,
    /// 按首次出现顺序排列的能级行
    pub rows: Vec<CrossSectionRow>,
}

impl CrossSectionTable {
    /// 所有失败单元 (能量, 角度, 原因)
    pub fn failures(&self) -> Vec<(f64, Angle, &str)> {
        self.rows
            .iter()
            .flat_map(|row| {
                row.cells.iter().filter_map(move |(angle, cell)| match cell {
                    CrossSectionCell::Unavailable { reason } => {
                        Some((row.energy, *angle, reason.as_str()))
                    }
                    CrossSectionCell::Value { .. } => None,
                })
            })
            .collect()
    }
}
