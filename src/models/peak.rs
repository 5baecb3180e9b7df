//! # 峰数据模型
//!
//! 单个拟合峰 (PeakRecord) 与单一探测角度下的峰表 (AngleTable)。
//!
//! 所有数值单元格都建模为 `Option<f64>`：`None` 表示空单元格，
//! 与数值 `0` 严格区分。
//!
//! ## 依赖关系
//! - 被 `parsers/`、`analysis/` 和 `commands/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 探测角度（整数度）
pub type Angle = u32;

/// 拟合峰记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    /// 是否参与刻度拟合
    pub use_row: bool,
    /// 激发态能量（keV）
    pub energy: Option<f64>,
    pub energy_error: Option<f64>,
    /// 峰位（道址，或已刻度时为 keV）
    pub position: Option<f64>,
    pub position_error: Option<f64>,
    /// 峰宽
    pub width: Option<f64>,
    pub width_error: Option<f64>,
    /// 峰体积（积分计数）
    pub volume: Option<f64>,
    pub volume_error: Option<f64>,
}

impl PeakRecord {
    /// 由拟合结果构造（能量未知，不参与拟合）
    pub fn from_fit(
        position: f64,
        position_error: f64,
        width: f64,
        width_error: f64,
        volume: f64,
        volume_error: f64,
    ) -> Self {
        PeakRecord {
            use_row: false,
            energy: None,
            energy_error: None,
            position: Some(position),
            position_error: Some(position_error),
            width: Some(width),
            width_error: Some(width_error),
            volume: Some(volume),
            volume_error: Some(volume_error),
        }
    }

    /// 是否为空行（所有单元格为空且未勾选）
    pub fn is_blank(&self) -> bool {
        !self.use_row && self.numeric_cells().iter().all(|c| c.is_none())
    }

    /// 按固定列顺序返回八个数值单元格
    pub fn numeric_cells(&self) -> [Option<f64>; 8] {
        [
            self.energy,
            self.energy_error,
            self.position,
            self.position_error,
            self.width,
            self.width_error,
            self.volume,
            self.volume_error,
        ]
    }

    /// 能量是否为有效数值（排除 NaN）
    pub fn valid_energy(&self) -> Option<f64> {
        self.energy.filter(|e| !e.is_nan())
    }
}

/// 单一角度下的峰表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleTable {
    /// 探测角度（度）
    pub angle: Angle,
    /// 表名（用于图表标题和输出文件名）
    pub name: String,
    /// 峰记录，保持表格顺序
    pub rows: Vec<PeakRecord>,
}

impl AngleTable {
    /// 新建表格，预留若干空行
    pub fn new(angle: Angle, blank_rows: usize) -> Self {
        AngleTable {
            angle,
            name: String::new(),
            rows: vec![PeakRecord::default(); blank_rows],
        }
    }

    /// 表格标签，如 "15-deg"
    pub fn label(&self) -> String {
        format!("{}-deg", self.angle)
    }

    /// 下一个空行的索引；没有空行时返回表尾（即新行位置）
    pub fn next_blank_row(&self) -> usize {
        self.rows
            .iter()
            .position(|r| r.is_blank())
            .unwrap_or(self.rows.len())
    }

    /// 获取下一个空行的可变引用，必要时追加新行
    pub fn next_blank_row_mut(&mut self) -> &mut PeakRecord {
        let idx = self.next_blank_row();
        if idx == self.rows.len() {
            self.rows.push(PeakRecord::default());
        }
        &mut self.rows[idx]
    }

    /// 追加空行
    pub fn add_rows(&mut self, count: usize) {
        self.rows
            .extend(std::iter::repeat(PeakRecord::default()).take(count));
    }

    /// 删除指定行，返回被删除的记录
    pub fn remove_row(&mut self, index: usize) -> Option<PeakRecord> {
        if index < self.rows.len() {
            Some(self.rows.remove(index))
        } else {
            None
        }
    }

    /// 用新数据替换整张表（保留角度和表名）
    pub fn replace_rows(&mut self, rows: Vec<PeakRecord>) {
        self.rows = rows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_blank_row_prefers_existing_blank() {
        let mut table = AngleTable::new(15, 3);
        table.rows[0].volume = Some(10.0);
        assert_eq!(table.next_blank_row(), 1);

        table.rows[1].energy = Some(0.0);
        table.rows[2].use_row = true;
        // 0.0 不是空单元格，勾选的行也不是空行
        assert_eq!(table.next_blank_row(), 3);
    }

    #[test]
    fn test_next_blank_row_mut_appends() {
        let mut table = AngleTable::new(20, 1);
        table.rows[0].position = Some(1.0);
        table.next_blank_row_mut().volume = Some(5.0);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].volume, Some(5.0));
    }

    #[test]
    fn test_remove_row_out_of_range() {
        let mut table = AngleTable::new(25, 2);
        assert!(table.remove_row(5).is_none());
        assert!(table.remove_row(1).is_some());
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_valid_energy_excludes_nan() {
        let mut peak = PeakRecord::default();
        peak.energy = Some(f64::NAN);
        assert!(peak.valid_energy().is_none());
        peak.energy = Some(1779.0);
        assert_eq!(peak.valid_energy(), Some(1779.0));
    }
}
