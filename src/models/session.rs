//! # 会话数据模型
//!
//! 一次测量的全部输入：靶参数、束流积分 (BCI) 表和每个角度的峰表。
//! 核心计算模块只读取会话快照，所有修改都由命令层显式完成。
//!
//! ## 依赖关系
//! - 被 `parsers/session_file.rs` 序列化
//! - 被 `analysis/` 和 `commands/` 使用
//! - 使用 `models/peak.rs`

use crate::error::{Result, SpscalError};
use crate::models::peak::{Angle, AngleTable};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 默认角度设置：15°–60°，步长 5°
pub const DEFAULT_MIN_ANGLE: Angle = 15;
pub const DEFAULT_MAX_ANGLE: Angle = 60;
pub const DEFAULT_ANGLE_STEP: Angle = 5;

/// 新建峰表时预留的空行数
pub const DEFAULT_BLANK_ROWS: usize = 3;

/// 标量字段名
pub const FIELD_NAME: &str = "name";
pub const FIELD_TARGET_THICKNESS: &str = "target_thickness";
pub const FIELD_MOLAR_MASS: &str = "molar_mass";

/// 束流积分记录（每个角度一行）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamInputRow {
    /// 角度（度）
    pub angle: f64,
    /// BCI 计数
    pub bci_hits: f64,
    /// BCI 量程 (nA)
    pub bci_scale: f64,
}

/// 靶参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetParameters {
    /// 靶厚 (μg/cm²)
    pub target_thickness_ug_cm2: f64,
    /// 摩尔质量 (g/mol)
    pub molar_mass_g_mol: f64,
}

/// 测量会话
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// 标量输入字段（按输入原文保存）
    pub fields: BTreeMap<String, String>,
    /// BCI 表
    pub beam: Vec<BeamInputRow>,
    /// 每个角度的峰表，按角度升序
    pub tables: BTreeMap<Angle, AngleTable>,
}

impl Default for Session {
    fn default() -> Self {
        Session::with_angles(&default_angles())
    }
}

/// 默认角度列表
pub fn default_angles() -> Vec<Angle> {
    angle_range(DEFAULT_MIN_ANGLE, DEFAULT_MAX_ANGLE, DEFAULT_ANGLE_STEP)
}

/// 生成 [min, max] 范围内的等步长角度列表
pub fn angle_range(min: Angle, max: Angle, step: Angle) -> Vec<Angle> {
    if step == 0 {
        return vec![min];
    }
    (min..=max).step_by(step as usize).collect()
}

impl Session {
    /// 按给定角度创建空会话
    pub fn with_angles(angles: &[Angle]) -> Self {
        let tables = angles
            .iter()
            .map(|&a| (a, AngleTable::new(a, DEFAULT_BLANK_ROWS)))
            .collect();
        Session {
            fields: BTreeMap::new(),
            beam: Vec::new(),
            tables,
        }
    }

    /// 已配置的角度（升序）
    pub fn angles(&self) -> Vec<Angle> {
        self.tables.keys().copied().collect()
    }

    /// 会话名称
    pub fn name(&self) -> &str {
        self.fields.get(FIELD_NAME).map(|s| s.as_str()).unwrap_or("")
    }

    /// 设置标量字段
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// 读取数值型标量字段
    pub fn numeric_field(&self, key: &str) -> Result<f64> {
        self.fields
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .ok_or_else(|| SpscalError::MissingInput {
                field: key.to_string(),
            })
    }

    /// 读取靶参数（缺失或非数值时报 MissingInput）
    pub fn target_parameters(&self) -> Result<TargetParameters> {
        Ok(TargetParameters {
            target_thickness_ug_cm2: self.numeric_field(FIELD_TARGET_THICKNESS)?,
            molar_mass_g_mol: self.numeric_field(FIELD_MOLAR_MASS)?,
        })
    }

    /// 获取指定角度的峰表
    pub fn table(&self, angle: Angle) -> Result<&AngleTable> {
        self.tables
            .get(&angle)
            .ok_or_else(|| unknown_angle(angle, &self.angles()))
    }

    /// 获取指定角度峰表的可变引用
    pub fn table_mut(&mut self, angle: Angle) -> Result<&mut AngleTable> {
        let angles = self.angles();
        self.tables
            .get_mut(&angle)
            .ok_or_else(|| unknown_angle(angle, &angles))
    }

    /// 查找某角度唯一的 BCI 记录
    pub fn beam_for(&self, angle: Angle) -> Result<BeamInputRow> {
        let matches: Vec<&BeamInputRow> = self
            .beam
            .iter()
            .filter(|row| row.angle == angle as f64)
            .collect();

        match matches.as_slice() {
            [row] => Ok(**row),
            [] => Err(SpscalError::MissingInput {
                field: format!("BCI row for {} deg", angle),
            }),
            _ => Err(SpscalError::InvalidArgument(format!(
                "{} BCI rows found for {} deg, expected exactly one",
                matches.len(),
                angle
            ))),
        }
    }
}

fn unknown_angle(angle: Angle, angles: &[Angle]) -> SpscalError {
    SpscalError::InvalidArgument(format!(
        "Angle {} deg is not configured (available: {:?})",
        angle, angles
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_angles() {
        let angles = default_angles();
        assert_eq!(angles.len(), 10);
        assert_eq!(angles.first(), Some(&15));
        assert_eq!(angles.last(), Some(&60));
    }

    #[test]
    fn test_target_parameters_missing() {
        let mut session = Session::default();
        session.set_field(FIELD_TARGET_THICKNESS, "500");
        assert!(matches!(
            session.target_parameters(),
            Err(SpscalError::MissingInput { ref field }) if field == FIELD_MOLAR_MASS
        ));

        session.set_field(FIELD_MOLAR_MASS, "twelve");
        assert!(session.target_parameters().is_err());

        session.set_field(FIELD_MOLAR_MASS, " 12 ");
        let target = session.target_parameters().unwrap();
        assert_eq!(target.molar_mass_g_mol, 12.0);
        assert_eq!(target.target_thickness_ug_cm2, 500.0);
    }

    #[test]
    fn test_beam_for_requires_exactly_one() {
        let mut session = Session::with_angles(&[15, 20]);
        session.beam.push(BeamInputRow {
            angle: 15.0,
            bci_hits: 1000.0,
            bci_scale: 10.0,
        });
        assert!(session.beam_for(15).is_ok());
        assert!(session.beam_for(20).is_err());

        session.beam.push(BeamInputRow {
            angle: 15.0,
            bci_hits: 2000.0,
            bci_scale: 10.0,
        });
        assert!(session.beam_for(15).is_err());
    }

    #[test]
    fn test_unknown_angle() {
        let session = Session::with_angles(&[15, 20]);
        assert!(session.table(25).is_err());
        assert!(session.table(20).is_ok());
    }
}
