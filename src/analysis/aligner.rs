//! # 激发态跨角度对齐
//!
//! 各角度的峰表是独立录入的。本模块按激发态能量把它们对齐成公共的行：
//! 只有在所有已配置角度中都出现的能量才会输出。
//!
//! ## 规则
//! - 候选能量：所有表中出现过的不同能量值（空值和 NaN 除外）
//! - 顺序：按角度升序扫描各表，按能量首次出现的顺序输出
//! - 同一表中多个行能量相同时，取表中第一行
//! - 默认精确匹配（存储值逐位相等）；可选容差匹配
//!
//! ## 依赖关系
//! - 被 `analysis/cross_section.rs` 调用
//! - 使用 `models/peak.rs`

use crate::models::{Angle, AngleTable, PeakRecord};

use std::collections::BTreeMap;

/// 能量匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MatchPolicy {
    /// 数值精确相等
    ///
    /// 比较的是解析后的 f64，而不是单元格原文：`"4439"` 与 `"4439.0"`
    /// 视为同一激发态。
    #[default]
    Exact,
    /// |a - b| <= eps
    Tolerance(f64),
}

impl MatchPolicy {
    /// 由命令行容差构造：None 或 0 表示精确匹配
    pub fn from_tolerance(tolerance: Option<f64>) -> Self {
        match tolerance {
            Some(eps) if eps > 0.0 => MatchPolicy::Tolerance(eps),
            _ => MatchPolicy::Exact,
        }
    }

    /// 两个能量是否视为同一激发态
    pub fn matches(&self, a: f64, b: f64) -> bool {
        match self {
            MatchPolicy::Exact => a == b,
            MatchPolicy::Tolerance(eps) => (a - b).abs() <= *eps,
        }
    }
}

/// 对齐后的激发态
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedState<'a> {
    /// 激发态能量
    pub energy: f64,
    /// 每个角度对应的峰
    pub peaks: BTreeMap<Angle, &'a PeakRecord>,
}

/// 候选能量（按首次出现顺序去重）
pub fn candidate_energies(tables: &BTreeMap<Angle, AngleTable>, policy: MatchPolicy) -> Vec<f64> {
    let mut candidates: Vec<f64> = Vec::new();
    for table in tables.values() {
        for energy in table.rows.iter().filter_map(|r| r.valid_energy()) {
            if !candidates.iter().any(|&c| policy.matches(c, energy)) {
                candidates.push(energy);
            }
        }
    }
    candidates
}

/// 对齐所有角度的峰表
pub fn align(tables: &BTreeMap<Angle, AngleTable>, policy: MatchPolicy) -> Vec<AlignedState<'_>> {
    if tables.is_empty() {
        return Vec::new();
    }

    candidate_energies(tables, policy)
        .into_iter()
        .filter_map(|energy| {
            let peaks = tables
                .iter()
                .map(|(&angle, table)| {
                    table
                        .rows
                        .iter()
                        .find(|r| r.valid_energy().is_some_and(|e| policy.matches(e, energy)))
                        .map(|peak| (angle, peak))
                })
                .collect::<Option<BTreeMap<_, _>>>()?;
            Some(AlignedState { energy, peaks })
        })
        .collect()
}
