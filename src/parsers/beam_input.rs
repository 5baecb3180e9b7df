//! # 运行输入文件与体积文件解析器
//!
//! ## 运行输入文件 (`*input.txt`)
//! ```text
//! # molar mass    target thickness
//! 12.0	500
//! # angle	BCI hits	BCI scale
//! 15	1000	10
//! 20	1200	10
//! ```
//! 以 `#` 开头的行被跳过；第一条数据行为靶信息，其余每行一条 BCI 记录。
//!
//! ## 体积文件 (`<能量>_xxx.txt`)
//! 两列制表符分隔 (volume, volume error)，第 i 行对应第 i 个角度。
//! 文件名第一个下划线之前的部分作为该能级的能量标签。
//!
//! ## 依赖关系
//! - 被 `commands/ingest.rs` 使用
//! - 使用 `models/session.rs`

use crate::error::{Result, SpscalError};
use crate::models::BeamInputRow;

use std::fs;
use std::path::Path;

/// 运行输入文件内容
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    /// 摩尔质量（原文）
    pub molar_mass: String,
    /// 靶厚（原文）
    pub target_thickness: String,
    /// BCI 记录
    pub beam: Vec<BeamInputRow>,
}

/// 解析运行输入文件
pub fn parse_run_input_file(path: &Path) -> Result<RunInput> {
    let content = read_file(path)?;
    parse_run_input_content(&content, &path.display().to_string())
}

/// 从字符串内容解析运行输入文件
pub fn parse_run_input_content(content: &str, source_name: &str) -> Result<RunInput> {
    let parse_error = |reason: String| SpscalError::ParseError {
        format: "run input".to_string(),
        path: source_name.to_string(),
        reason,
    };

    let mut lines = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let target_line = lines
        .next()
        .ok_or_else(|| parse_error("Missing target information line".to_string()))?;
    let target: Vec<&str> = target_line.split('\t').map(|s| s.trim()).collect();
    if target.len() < 2 {
        return Err(parse_error(format!(
            "Target line needs 'molar_mass<TAB>thickness', got '{}'",
            target_line
        )));
    }

    let mut beam = Vec::new();
    for (i, line) in lines.enumerate() {
        let cells = parse_numeric_cells(line).map_err(&parse_error)?;
        if cells.len() < 3 {
            return Err(parse_error(format!(
                "BCI row {} needs 3 columns (angle, hits, scale), got {}",
                i + 1,
                cells.len()
            )));
        }
        beam.push(BeamInputRow {
            angle: cells[0],
            bci_hits: cells[1],
            bci_scale: cells[2],
        });
    }

    Ok(RunInput {
        molar_mass: target[0].to_string(),
        target_thickness: target[1].to_string(),
        beam,
    })
}

/// 解析体积文件，返回 (volume, volume_error) 序列
pub fn parse_volume_file(path: &Path) -> Result<Vec<(f64, f64)>> {
    let content = read_file(path)?;
    parse_volume_content(&content, &path.display().to_string())
}

/// 从字符串内容解析体积文件
pub fn parse_volume_content(content: &str, source_name: &str) -> Result<Vec<(f64, f64)>> {
    let parse_error = |reason: String| SpscalError::ParseError {
        format: "volume".to_string(),
        path: source_name.to_string(),
        reason,
    };

    content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let cells = parse_numeric_cells(line).map_err(&parse_error)?;
            match cells.as_slice() {
                [volume, error, ..] => Ok((*volume, *error)),
                _ => Err(parse_error(format!(
                    "Line {} needs 2 columns (volume, error)",
                    i + 1
                ))),
            }
        })
        .collect()
}

/// 文件名第一个下划线之前的部分，作为能量标签
pub fn energy_label_from_filename(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let label = name.split('_').next()?;
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

fn parse_numeric_cells(line: &str) -> std::result::Result<Vec<f64>, String> {
    line.split('\t')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| format!("Invalid number '{}' in line '{}'", s, line))
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(SpscalError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    fs::read_to_string(path).map_err(|e| SpscalError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}
