//! # 解析器模块
//!
//! 峰拟合文件、运行输入文件、体积文件和会话文件的读写。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: fit_xml, beam_input, session_file

pub mod beam_input;
pub mod fit_xml;
pub mod session_file;

use crate::error::{Result, SpscalError};
use fit_xml::FitFile;
use std::path::Path;

/// 从文件路径推断格式并解析峰拟合文件
pub fn parse_peak_file(path: &Path) -> Result<FitFile> {
    if !path.exists() {
        return Err(SpscalError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "fit" | "xml" => fit_xml::parse_fit_file(path),
        _ => Err(SpscalError::InvalidArgument(format!(
            "Cannot determine fit format for: {} (expected .fit or .xml)",
            path.display()
        ))),
    }
}
