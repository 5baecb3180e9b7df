//! # 会话文件读写
//!
//! 会话以 JSON 保存，格式与界面无关：
//! ```text
//! {
//!   "tables": {
//!     "input":    [["15", "1000", "10"], ...],
//!     "angle_15": [["1", "1779", "0.5", "85.25", "0.5", "3", "0.2", "900", "12"], ...]
//!   },
//!   "fields": { "name": "...", "target_thickness": "500", "molar_mass": "12", "angle_15.name": "..." }
//! }
//! ```
//! 空单元格写作 `""`，与 `"0"` 区分。保存后再读取得到完全相同的单元格文本。
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `models/session.rs`, `models/peak.rs`
//! - 使用 `serde_json` 序列化

use crate::error::{Result, SpscalError};
use crate::models::{Angle, AngleTable, BeamInputRow, PeakRecord, Session};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// 输入表（BCI）标识
pub const INPUT_TABLE_ID: &str = "input";

/// 峰表列数：use + 8 个数值列
const PEAK_COLUMNS: usize = 9;
/// BCI 表列数
const BEAM_COLUMNS: usize = 3;

/// 会话交换格式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    /// 表标识 -> 行 -> 单元格文本
    pub tables: BTreeMap<String, Vec<Vec<String>>>,
    /// 命名标量字段
    pub fields: BTreeMap<String, String>,
}

/// 角度峰表的标识，如 "angle_15"
pub fn angle_table_id(angle: Angle) -> String {
    format!("angle_{}", angle)
}

/// 角度峰表名称字段，如 "angle_15.name"
pub fn angle_name_field(angle: Angle) -> String {
    format!("{}.name", angle_table_id(angle))
}

fn parse_angle_table_id(id: &str) -> Option<Angle> {
    id.strip_prefix("angle_")?.parse().ok()
}

/// 数值单元格 -> 文本（`{}` 格式可精确往返 f64）
fn format_cell(cell: Option<f64>) -> String {
    cell.map(|v| v.to_string()).unwrap_or_default()
}

impl SessionDocument {
    /// 从会话生成交换文档
    pub fn from_session(session: &Session) -> Self {
        let mut tables = BTreeMap::new();
        let mut fields = session.fields.clone();

        let beam_rows = session
            .beam
            .iter()
            .map(|row| {
                vec![
                    row.angle.to_string(),
                    row.bci_hits.to_string(),
                    row.bci_scale.to_string(),
                ]
            })
            .collect();
        tables.insert(INPUT_TABLE_ID.to_string(), beam_rows);

        for (angle, table) in &session.tables {
            let rows = table
                .rows
                .iter()
                .map(|row| {
                    let mut cells = Vec::with_capacity(PEAK_COLUMNS);
                    cells.push(if row.use_row { "1".to_string() } else { String::new() });
                    cells.extend(row.numeric_cells().iter().map(|c| format_cell(*c)));
                    cells
                })
                .collect();
            tables.insert(angle_table_id(*angle), rows);

            if !table.name.is_empty() {
                fields.insert(angle_name_field(*angle), table.name.clone());
            }
        }

        SessionDocument { tables, fields }
    }

    /// 将交换文档还原为会话
    pub fn into_session(self, source_name: &str) -> Result<Session> {
        let parse_error = |reason: String| SpscalError::ParseError {
            format: "session".to_string(),
            path: source_name.to_string(),
            reason,
        };

        let mut fields = self.fields;
        let mut beam = Vec::new();
        let mut tables = BTreeMap::new();

        for (id, rows) in self.tables {
            if id == INPUT_TABLE_ID {
                beam = parse_beam_rows(&rows).map_err(&parse_error)?;
                continue;
            }

            let angle = parse_angle_table_id(&id)
                .ok_or_else(|| parse_error(format!("Unknown table identifier '{}'", id)))?;

            let peaks = rows
                .iter()
                .enumerate()
                .map(|(i, cells)| parse_peak_row(cells).map_err(|e| format!("{} row {}: {}", id, i + 1, e)))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(&parse_error)?;

            let name = fields.remove(&angle_name_field(angle)).unwrap_or_default();
            tables.insert(
                angle,
                AngleTable {
                    angle,
                    name,
                    rows: peaks,
                },
            );
        }

        if tables.is_empty() {
            return Err(parse_error("Session contains no angle tables".to_string()));
        }

        Ok(Session {
            fields,
            beam,
            tables,
        })
    }
}

fn parse_cell(text: &str) -> std::result::Result<Option<f64>, String> {
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("non-numeric cell '{}'", text))
}

fn parse_peak_row(cells: &[String]) -> std::result::Result<PeakRecord, String> {
    if cells.len() != PEAK_COLUMNS {
        return Err(format!(
            "expected {} cells, found {}",
            PEAK_COLUMNS,
            cells.len()
        ));
    }

    let use_row = match parse_cell(&cells[0])? {
        Some(v) => v == 1.0,
        None => false,
    };

    let mut values = [None; 8];
    for (slot, text) in values.iter_mut().zip(&cells[1..]) {
        *slot = parse_cell(text)?;
    }
    let [energy, energy_error, position, position_error, width, width_error, volume, volume_error] =
        values;

    Ok(PeakRecord {
        use_row,
        energy,
        energy_error,
        position,
        position_error,
        width,
        width_error,
        volume,
        volume_error,
    })
}

fn parse_beam_rows(rows: &[Vec<String>]) -> std::result::Result<Vec<BeamInputRow>, String> {
    let mut beam = Vec::new();
    for (i, cells) in rows.iter().enumerate() {
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        if cells.len() != BEAM_COLUMNS {
            return Err(format!(
                "input row {}: expected {} cells, found {}",
                i + 1,
                BEAM_COLUMNS,
                cells.len()
            ));
        }
        let values = cells
            .iter()
            .map(|c| parse_cell(c)?.ok_or_else(|| "empty cell in BCI row".to_string()))
            .collect::<std::result::Result<Vec<f64>, String>>()
            .map_err(|e| format!("input row {}: {}", i + 1, e))?;
        beam.push(BeamInputRow {
            angle: values[0],
            bci_hits: values[1],
            bci_scale: values[2],
        });
    }
    Ok(beam)
}

/// 保存会话到 JSON 文件
pub fn save_session(session: &Session, path: &Path) -> Result<()> {
    let doc = SessionDocument::from_session(session);
    let json = serde_json::to_string_pretty(&doc)?;
    fs::write(path, json).map_err(|e| SpscalError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 读取会话交换文档
pub fn load_document(path: &Path) -> Result<SessionDocument> {
    if !path.exists() {
        return Err(SpscalError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let text = fs::read_to_string(path).map_err(|e| SpscalError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// 从 JSON 文件读取会话
pub fn load_session(path: &Path) -> Result<Session> {
    load_document(path)?.into_session(&path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{FIELD_MOLAR_MASS, FIELD_TARGET_THICKNESS};

    fn sample_session() -> Session {
        let mut session = Session::with_angles(&[15, 20]);
        session.set_field(FIELD_TARGET_THICKNESS, "500");
        session.set_field(FIELD_MOLAR_MASS, "12.0");
        session.beam.push(BeamInputRow {
            angle: 15.0,
            bci_hits: 1000.0,
            bci_scale: 10.0,
        });

        let table = session.table_mut(15).unwrap();
        table.name = "run12_15deg".to_string();
        table.rows[0] = PeakRecord {
            use_row: true,
            energy: Some(1779.03),
            energy_error: Some(0.0),
            position: Some(85.25),
            position_error: Some(0.5),
            width: None,
            width_error: None,
            volume: Some(900.0),
            volume_error: Some(12.0),
        };
        session
    }

    #[test]
    fn test_document_preserves_empty_and_zero() {
        let doc = SessionDocument::from_session(&sample_session());
        let row = &doc.tables["angle_15"][0];
        assert_eq!(row[0], "1");
        assert_eq!(row[2], "0");
        assert_eq!(row[5], "");
        assert_eq!(doc.tables["angle_20"][0], vec![String::new(); 9]);
        assert_eq!(doc.fields["angle_15.name"], "run12_15deg");
        assert_eq!(doc.fields["molar_mass"], "12.0");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let session = sample_session();
        save_session(&session, &path).unwrap();
        let before = SessionDocument::from_session(&session);

        let loaded = load_session(&path).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(SessionDocument::from_session(&loaded), before);
        assert_eq!(load_document(&path).unwrap(), before);
    }

    #[test]
    fn test_rejects_bad_cells() {
        let mut doc = SessionDocument::from_session(&sample_session());
        doc.tables.get_mut("angle_20").unwrap()[0][3] = "channel".to_string();
        assert!(doc.clone().into_session("bad.json").is_err());

        doc.tables.get_mut("angle_20").unwrap()[0] = vec![String::new(); 4];
        assert!(doc.into_session("bad.json").is_err());
    }

    #[test]
    fn test_rejects_unknown_table() {
        let mut doc = SessionDocument::from_session(&sample_session());
        doc.tables.insert("tab99".to_string(), Vec::new());
        assert!(doc.into_session("bad.json").is_err());
    }
}
