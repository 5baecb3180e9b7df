//! # 峰拟合 XML 文件解析器
//!
//! 解析峰拟合软件导出的 `.fit` / `.xml` 文件，提取每个峰的位置、宽度和体积。
//!
//! ## 文件格式说明
//! ```text
//! <hdtv>
//!   <fit ...>
//!     <peak ...>
//!       <uncal>
//!         <pos><value>1234.5</value><error>0.3</error></pos>
//!         <width>...</width>
//!         <vol>...</vol>
//!       </uncal>
//!       <cal>
//!         ...
//!       </cal>
//!     </peak>
//!   </fit>
//! </hdtv>
//! ```
//!
//! 若第一个未刻度峰位与第一个刻度峰位完全相同，说明文件未经刻度
//! （`cal` 分支只是副本），按峰位降序输出未刻度数据；否则按峰位升序
//! 输出刻度数据。道址方向与能量方向相反，因此两种排序方向不同。
//!
//! ## 依赖关系
//! - 被 `commands/ingest.rs`、`commands/convert.rs` 使用
//! - 使用 `models/peak.rs`
//! - 使用 `roxmltree` 解析 XML

use crate::error::{Result, SpscalError};
use crate::models::PeakRecord;

use roxmltree::Node;
use std::fs;
use std::path::Path;

/// 解析后的拟合文件
#[derive(Debug, Clone, PartialEq)]
pub struct FitFile {
    /// 文件是否已刻度
    pub calibrated: bool,
    /// 排序后的峰记录
    pub rows: Vec<PeakRecord>,
}

/// 单个表示（未刻度或刻度）下的六列数据
#[derive(Debug, Default)]
struct PeakColumns {
    pos: Vec<f64>,
    pos_err: Vec<f64>,
    width: Vec<f64>,
    width_err: Vec<f64>,
    vol: Vec<f64>,
    vol_err: Vec<f64>,
}

impl PeakColumns {
    fn len(&self) -> usize {
        self.pos.len()
    }

    fn is_consistent(&self) -> bool {
        let n = self.pos.len();
        [
            self.pos_err.len(),
            self.width.len(),
            self.width_err.len(),
            self.vol.len(),
            self.vol_err.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }

    fn into_rows(self) -> Vec<PeakRecord> {
        (0..self.pos.len())
            .map(|i| {
                PeakRecord::from_fit(
                    self.pos[i],
                    self.pos_err[i],
                    self.width[i],
                    self.width_err[i],
                    self.vol[i],
                    self.vol_err[i],
                )
            })
            .collect()
    }
}

/// 解析拟合文件
pub fn parse_fit_file(path: &Path) -> Result<FitFile> {
    let content = fs::read_to_string(path).map_err(|e| SpscalError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_fit_content(&content, &path.display().to_string())
}

/// 从字符串内容解析拟合文件
pub fn parse_fit_content(content: &str, source_name: &str) -> Result<FitFile> {
    let parse_error = |reason: String| SpscalError::ParseError {
        format: "fit".to_string(),
        path: source_name.to_string(),
        reason,
    };

    let doc = roxmltree::Document::parse(content).map_err(|e| parse_error(e.to_string()))?;

    let mut uncal = PeakColumns::default();
    let mut cal = PeakColumns::default();
    let mut peak_count = 0;

    for fit in doc.root_element().children().filter(|n| n.is_element()) {
        for peak in fit.children().filter(|n| n.has_tag_name("peak")) {
            peak_count += 1;
            for child in peak.descendants() {
                if child.has_tag_name("uncal") {
                    collect_representation(child, &mut uncal, false).map_err(&parse_error)?;
                } else if child.has_tag_name("cal") {
                    collect_representation(child, &mut cal, true).map_err(&parse_error)?;
                }
            }
        }
    }

    if peak_count == 0 {
        return Err(parse_error("No <peak> groups found".to_string()));
    }
    if uncal.len() == 0 {
        return Err(parse_error("Missing <uncal> peak positions".to_string()));
    }
    if cal.len() == 0 {
        return Err(parse_error("Missing <cal> peak positions".to_string()));
    }
    if !uncal.is_consistent() || !cal.is_consistent() {
        return Err(parse_error(
            "Incomplete peak group: pos/width/vol value and error counts differ".to_string(),
        ));
    }
    if uncal.len() != cal.len() {
        return Err(parse_error(format!(
            "{} uncalibrated peaks but {} calibrated peaks",
            uncal.len(),
            cal.len()
        )));
    }

    // 位比较：未刻度文件的 cal 分支是原样副本
    let calibrated = uncal.pos[0].to_bits() != cal.pos[0].to_bits();

    let rows = if calibrated {
        let mut rows = cal.into_rows();
        rows.sort_by(|a, b| position_key(a).total_cmp(&position_key(b)));
        rows
    } else {
        let mut rows = uncal.into_rows();
        rows.sort_by(|a, b| position_key(b).total_cmp(&position_key(a)));
        rows
    };

    Ok(FitFile { calibrated, rows })
}

/// 收集一个 `uncal` 或 `cal` 节点下的 pos/width/vol
fn collect_representation(
    node: Node,
    columns: &mut PeakColumns,
    absolute_width: bool,
) -> std::result::Result<(), String> {
    for item in node.descendants() {
        let (values, errors) = match item.tag_name().name() {
            "pos" => (&mut columns.pos, &mut columns.pos_err),
            "width" => (&mut columns.width, &mut columns.width_err),
            "vol" => (&mut columns.vol, &mut columns.vol_err),
            _ => continue,
        };
        let is_width = item.has_tag_name("width");

        for leaf in item.descendants() {
            if leaf.has_tag_name("value") {
                let v = read_number(leaf)?;
                values.push(if is_width && absolute_width { v.abs() } else { v });
            } else if leaf.has_tag_name("error") {
                errors.push(read_number(leaf)?);
            }
        }
    }
    Ok(())
}

/// 读取叶节点数值，保留 4 位小数
fn read_number(node: Node) -> std::result::Result<f64, String> {
    let text = node.text().map(|t| t.trim()).unwrap_or("");
    let value: f64 = text.parse().map_err(|_| {
        format!(
            "Invalid number '{}' in <{}> of <{}>",
            text,
            node.tag_name().name(),
            node.parent_element()
                .map(|p| p.tag_name().name())
                .unwrap_or("?")
        )
    })?;
    Ok(round_to(value, 4))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn position_key(row: &PeakRecord) -> f64 {
    row.position.unwrap_or(f64::NAN)
}

/// 写出峰表 CSV（九列，空单元格留空）
pub fn to_csv(rows: &[PeakRecord], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "use",
        "energy",
        "energy_error",
        "position",
        "position_error",
        "width",
        "width_error",
        "volume",
        "volume_error",
    ])?;

    for row in rows {
        let mut record = vec![if row.use_row { "1".to_string() } else { String::new() }];
        record.extend(
            row.numeric_cells()
                .iter()
                .map(|c| c.map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush().map_err(|e| SpscalError::FileWriteError {
        path: output_path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_xml(uncal: (f64, f64, f64), cal: (f64, f64, f64)) -> String {
        format!(
            r#"
    <peak>
      <uncal>
        <pos><value>{}</value><error>0.5</error></pos>
        <width><value>{}</value><error>0.2</error></width>
        <vol><value>{}</value><error>12.0</error></vol>
      </uncal>
      <cal>
        <pos><value>{}</value><error>0.5</error></pos>
        <width><value>{}</value><error>0.2</error></width>
        <vol><value>{}</value><error>12.0</error></vol>
      </cal>
    </peak>"#,
            uncal.0, uncal.1, uncal.2, cal.0, cal.1, cal.2
        )
    }

    fn document(peaks: &[String]) -> String {
        format!(
            "<hdtv version=\"1.6\">\n  <fit peakModel=\"theuerkauf\">{}\n  </fit>\n</hdtv>",
            peaks.join("")
        )
    }

    #[test]
    fn test_uncalibrated_sorted_descending() {
        let content = document(&[
            peak_xml((-120.5, 3.1, 400.0), (-120.5, 3.1, 400.0)),
            peak_xml((85.25, 2.9, 900.0), (85.25, 2.9, 900.0)),
            peak_xml((10.0, 3.0, 650.0), (10.0, 3.0, 650.0)),
        ]);
        let fit = parse_fit_content(&content, "uncal.fit").unwrap();
        assert!(!fit.calibrated);

        let positions: Vec<f64> = fit.rows.iter().filter_map(|r| r.position).collect();
        assert_eq!(positions, vec![85.25, 10.0, -120.5]);
        assert_eq!(fit.rows[0].volume, Some(900.0));
        assert!(fit.rows.iter().all(|r| !r.use_row && r.energy.is_none()));
    }

    #[test]
    fn test_calibrated_sorted_ascending() {
        let content = document(&[
            peak_xml((-120.5, 3.1, 400.0), (6130.2, -14.0, 401.0)),
            peak_xml((85.25, 2.9, 900.0), (1779.03, 11.5, 901.0)),
            peak_xml((10.0, 3.0, 650.0), (4000.0, 12.25, 651.0)),
        ]);
        let fit = parse_fit_content(&content, "cal.fit").unwrap();
        assert!(fit.calibrated);

        let positions: Vec<f64> = fit.rows.iter().filter_map(|r| r.position).collect();
        assert_eq!(positions, vec![1779.03, 4000.0, 6130.2]);
        // 刻度峰宽取绝对值
        assert_eq!(fit.rows[2].width, Some(14.0));
        assert_eq!(fit.rows[2].volume, Some(401.0));
    }

    #[test]
    fn test_values_rounded_to_four_decimals() {
        let content = document(&[peak_xml(
            (12.345678, 1.0, 10.0),
            (12.345678, 1.0, 10.0),
        )]);
        let fit = parse_fit_content(&content, "round.fit").unwrap();
        assert_eq!(fit.rows[0].position, Some(12.3457));
    }

    #[test]
    fn test_missing_groups_is_parse_error() {
        let content = "<hdtv><fit></fit></hdtv>";
        assert!(matches!(
            parse_fit_content(content, "empty.fit"),
            Err(SpscalError::ParseError { .. })
        ));

        let no_cal = r#"<hdtv><fit><peak><uncal>
            <pos><value>1</value><error>0.1</error></pos>
            <width><value>1</value><error>0.1</error></width>
            <vol><value>1</value><error>0.1</error></vol>
        </uncal></peak></fit></hdtv>"#;
        assert!(parse_fit_content(no_cal, "nocal.fit").is_err());
    }

    #[test]
    fn test_malformed_xml_and_numbers() {
        assert!(parse_fit_content("<hdtv><fit>", "broken.fit").is_err());

        let bad_number = document(&[peak_xml((1.0, 1.0, 1.0), (2.0, 1.0, 1.0))])
            .replacen("<value>1</value>", "<value>abc</value>", 1);
        assert!(parse_fit_content(&bad_number, "bad.fit").is_err());
    }

    #[test]
    fn test_to_csv_writes_blank_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.csv");
        let rows = vec![PeakRecord::from_fit(1.5, 0.1, 2.0, 0.2, 300.0, 17.0)];
        to_csv(&rows, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], ",,,1.5,0.1,2,0.2,300,17");
    }
}
