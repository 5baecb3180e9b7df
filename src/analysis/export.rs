//! # 截面数据导出
//!
//! ## 支持格式
//! - `<E>_keV.txt`：每个激发态一个文件，每个角度一行 `截面\t不确定度`，
//!   按角度升序；不可用单元写作 `nan\tnan`。E 为能量的整数部分。
//! - 整表 CSV：energy 一列，之后每个角度两列 (xs, err)，不可用单元留空。
//!
//! 整数部分相同的两个激发态会映射到同一文件名，此时拒绝导出。
//! 可只导出选定的激发态（`select_states`）。
//!
//! ## 依赖关系
//! - 被 `commands/cross_section.rs` 调用
//! - 使用 `models/cross_section.rs`
//! - 使用 `csv` 库写入文件

use crate::analysis::aligner::MatchPolicy;
use crate::error::{Result, SpscalError};
use crate::models::{Angle, CrossSectionRow, CrossSectionTable};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 激发态导出文件名，如 `4439_keV.txt`
pub fn kev_file_name(energy: f64) -> String {
    format!("{}_keV.txt", energy.trunc() as i64)
}

/// 为每行生成文件名，出现重名时返回 InvalidArgument
pub fn distinct_file_names<F>(rows: &[CrossSectionRow], name_for: F) -> Result<Vec<String>>
where
    F: Fn(f64) -> String,
{
    let mut seen: HashMap<String, f64> = HashMap::with_capacity(rows.len());
    let mut names = Vec::with_capacity(rows.len());

    for row in rows {
        let name = name_for(row.energy);
        if let Some(previous) = seen.insert(name.clone(), row.energy) {
            return Err(SpscalError::InvalidArgument(format!(
                "States {} keV and {} keV both map to '{}'; select one of them with --states",
                previous, row.energy, name
            )));
        }
        names.push(name);
    }

    Ok(names)
}

/// 只保留选定能量的激发态；选择为空时保留全部
///
/// 每个选定能量都必须对应表中的某一行。
pub fn select_states(
    table: &CrossSectionTable,
    states: &[f64],
    policy: MatchPolicy,
) -> Result<CrossSectionTable> {
    if states.is_empty() {
        return Ok(table.clone());
    }

    if let Some(missing) = states
        .iter()
        .find(|&&e| !table.rows.iter().any(|row| policy.matches(row.energy, e)))
    {
        return Err(SpscalError::InvalidArgument(format!(
            "State {} keV is not in the cross-section table",
            missing
        )));
    }

    Ok(CrossSectionTable {
        angles: table.angles.clone(),
        rows: table
            .rows
            .iter()
            .filter(|row| states.iter().any(|&e| policy.matches(row.energy, e)))
            .cloned()
            .collect(),
    })
}

/// 导出单个激发态
pub fn write_kev_file(row: &CrossSectionRow, angles: &[Angle], output_path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(output_path)?;

    for angle in angles {
        let (xs, err) = row
            .cells
            .get(angle)
            .and_then(|cell| cell.value())
            .map(|(xs, err)| (xs.to_string(), err.to_string()))
            .unwrap_or_else(|| ("nan".to_string(), "nan".to_string()));
        wtr.write_record([xs, err])?;
    }

    wtr.flush().map_err(|e| SpscalError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// 导出所有激发态，返回写出的文件路径
pub fn export_kev_files(table: &CrossSectionTable, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir).map_err(|e| SpscalError::FileWriteError {
        path: output_dir.display().to_string(),
        source: e,
    })?;

    let names = distinct_file_names(&table.rows, kev_file_name)?;

    let mut written = Vec::with_capacity(table.rows.len());
    for (row, name) in table.rows.iter().zip(names) {
        let path = output_dir.join(name);
        write_kev_file(row, &table.angles, &path)?;
        written.push(path);
    }

    Ok(written)
}

/// 导出整张截面表为 CSV
pub fn to_csv(table: &CrossSectionTable, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    let mut header = vec!["energy_keV".to_string()];
    for angle in &table.angles {
        header.push(format!("xs_{}deg_mb_sr", angle));
        header.push(format!("err_{}deg_mb_sr", angle));
    }
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.energy.to_string()];
        for angle in &table.angles {
            match row.cells.get(angle).and_then(|cell| cell.value()) {
                Some((xs, err)) => {
                    record.push(xs.to_string());
                    record.push(err.to_string());
                }
                None => {
                    record.push(String::new());
                    record.push(String::new());
                }
            }
        }
        wtr.write_record(&record)?;
    }

    wtr.flush().map_err(|e| SpscalError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
