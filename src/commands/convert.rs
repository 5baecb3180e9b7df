//! # convert 命令实现
//!
//! 批量将峰拟合文件 (.fit/.xml) 转换为九列 CSV 峰表。
//!
//! ## 功能
//! - 单文件或目录输入，支持多模式与递归
//! - 并行处理，进度条显示
//! - 已存在的输出默认跳过
//!
//! ## 依赖关系
//! - 使用 `cli/convert.rs` 定义的参数
//! - 使用 `batch/` 收集与并行执行
//! - 使用 `parsers/fit_xml.rs`
//! - 使用 `utils/output.rs`

use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::cli::convert::ConvertArgs;
use crate::error::{Result, SpscalError};
use crate::parsers::{self, fit_xml};
use crate::utils::output;

use std::fs;
use std::path::{Path, PathBuf};

/// 输出文件路径：`<输出目录>/<输入文件名去扩展名>.csv`
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("peaks");
    output_dir.join(format!("{}.csv", stem))
}

fn convert_one(input: &Path, output_dir: &Path, overwrite: bool) -> ProcessResult {
    let name = input.display().to_string();
    let output_path = output_path_for(input, output_dir);

    if output_path.exists() && !overwrite {
        return ProcessResult::Skipped(name);
    }

    let result = parsers::parse_peak_file(input)
        .and_then(|fit| fit_xml::to_csv(&fit.rows, &output_path));

    match result {
        Ok(()) => ProcessResult::Success(name),
        Err(e) => ProcessResult::Failed(name, e.to_string()),
    }
}

/// 执行 convert 命令
pub fn execute(args: ConvertArgs) -> Result<()> {
    output::print_header("Converting fit files to CSV");

    if !args.input.exists() {
        return Err(SpscalError::FileNotFound {
            path: args.input.display().to_string(),
        });
    }

    let collector = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)
        .recursive(args.recursive);
    if collector.is_single_file() {
        output::print_info(&format!("Single file mode: {}", args.input.display()));
    }
    let files = collector.collect()?;

    if files.is_empty() {
        return Err(SpscalError::NoFilesFound {
            pattern: args.pattern.clone(),
        });
    }

    fs::create_dir_all(&args.output).map_err(|e| SpscalError::FileWriteError {
        path: args.output.display().to_string(),
        source: e,
    })?;

    let runner = BatchRunner::new(args.jobs);
    output::print_info(&format!(
        "Found {} file(s), using {} job(s)",
        files.len(),
        runner.jobs()
    ));

    let output_dir = args.output.clone();
    let overwrite = args.overwrite;
    let result = runner.run(files, |path| convert_one(path, &output_dir, overwrite))?;

    for (path, err) in &result.failures {
        output::print_error(&format!("{}: {}", path, err));
    }
    if result.skipped > 0 {
        output::print_skip(&format!(
            "{} file(s) already converted (use --overwrite to redo)",
            result.skipped
        ));
    }

    output::print_done(&format!(
        "Converted {}/{} file(s) into '{}' ({} skipped, {} failed)",
        result.success,
        result.total(),
        args.output.display(),
        result.skipped,
        result.failed
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIT_XML: &str = r#"<hdtv><fit><peak>
  <uncal><pos><value>120</value><error>0.5</error></pos><width><value>3</value><error>0.1</error></width><vol><value>900</value><error>30</error></vol></uncal>
  <cal><pos><value>1779.1</value><error>0.2</error></pos><width><value>-2.5</value><error>0.1</error></width><vol><value>900</value><error>30</error></vol></cal>
</peak></fit></hdtv>"#;

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("data/run12_15deg.fit"), Path::new("out")),
            PathBuf::from("out/run12_15deg.csv")
        );
    }

    #[test]
    fn test_convert_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fits");
        let output = dir.path().join("csv");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("15deg.fit"), FIT_XML).unwrap();
        fs::write(input.join("20deg.xml"), "<hdtv><fit/></hdtv>").unwrap();
        fs::write(input.join("notes.txt"), "ignored").unwrap();

        let args = |overwrite| ConvertArgs {
            input: input.clone(),
            output: output.clone(),
            pattern: "*.fit,*.xml".to_string(),
            recursive: false,
            jobs: 2,
            overwrite,
        };

        execute(args(false)).unwrap();
        let csv = fs::read_to_string(output.join("15deg.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        // 已刻度文件：输出刻度数据，宽度取绝对值
        assert_eq!(lines[1], ",,,1779.1,0.2,2.5,0.1,900,30");
        assert!(!output.join("20deg.csv").exists());

        assert_eq!(
            convert_one(&input.join("15deg.fit"), &output, false),
            ProcessResult::Skipped(input.join("15deg.fit").display().to_string())
        );
        execute(args(true)).unwrap();
    }

    #[test]
    fn test_no_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConvertArgs {
            input: dir.path().to_path_buf(),
            output: dir.path().join("csv"),
            pattern: "*.fit".to_string(),
            recursive: false,
            jobs: 1,
            overwrite: false,
        };
        assert!(matches!(
            execute(args),
            Err(SpscalError::NoFilesFound { .. })
        ));
    }
}
