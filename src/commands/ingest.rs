//! # 数据导入命令实现
//!
//! ## 功能
//! - `load-input`: 运行输入文件 -> 靶参数 + BCI 表（整表替换）
//! - `load-fit`: 峰拟合文件 -> 指定角度的峰表（整表替换，保留表名）
//! - `load-volumes`: 体积文件 -> 每个角度表的下一个空行
//!
//! 解析失败时会话文件不被改动。
//!
//! ## 依赖关系
//! - 使用 `cli/ingest.rs` 定义的参数
//! - 使用 `parsers/beam_input.rs`, `parsers/fit_xml.rs`
//! - 使用 `utils/output.rs`

use super::{load, save};
use crate::cli::ingest::{LoadFitArgs, LoadInputArgs, LoadVolumesArgs};
use crate::error::{Result, SpscalError};
use crate::models::session::{FIELD_MOLAR_MASS, FIELD_TARGET_THICKNESS};
use crate::models::Session;
use crate::parsers::{self, beam_input};
use crate::utils::output;

use std::path::Path;

/// 执行 load-input 命令
pub fn load_input(args: LoadInputArgs) -> Result<()> {
    let mut session = load(&args.session)?;
    let input = beam_input::parse_run_input_file(&args.file)?;

    session.set_field(FIELD_MOLAR_MASS, input.molar_mass.as_str());
    session.set_field(FIELD_TARGET_THICKNESS, input.target_thickness.as_str());
    let beam_rows = input.beam.len();
    session.beam = input.beam;

    save(&args.session, &session)?;
    output::print_success(&format!(
        "Loaded '{}': molar mass {}, target thickness {}, {} BCI row(s)",
        args.file.display(),
        input.molar_mass,
        input.target_thickness,
        beam_rows
    ));
    Ok(())
}

/// 执行 load-fit 命令
pub fn load_fit(args: LoadFitArgs) -> Result<()> {
    let mut session = load(&args.session)?;
    let fit = parsers::parse_peak_file(&args.file)?;

    let table = session.table_mut(args.angle)?;
    let label = table.label();
    let peaks = fit.rows.len();
    table.replace_rows(fit.rows);

    save(&args.session, &session)?;
    output::print_conversion(&args.file.display().to_string(), &label);
    if fit.calibrated {
        output::print_info(&format!(
            "Calibrated data set, {} peaks, position & uncertainty in [keV]",
            peaks
        ));
    } else {
        output::print_info(&format!(
            "Uncalibrated data set, {} peaks, position & uncertainty in [channel]",
            peaks
        ));
    }
    Ok(())
}

/// 把体积数据写入各角度表的下一个空行
///
/// 第 i 行数据对应第 i 个角度（升序）。行数必须与角度数一致。
pub fn apply_volumes(session: &mut Session, path: &Path, volumes: &[(f64, f64)]) -> Result<f64> {
    let label = beam_input::energy_label_from_filename(path).ok_or_else(|| {
        SpscalError::InvalidArgument(format!(
            "Cannot take a state energy from file name '{}'",
            path.display()
        ))
    })?;
    let energy: f64 = label.parse().map_err(|_| {
        SpscalError::InvalidArgument(format!(
            "File name token '{}' of '{}' is not an energy",
            label,
            path.display()
        ))
    })?;

    let table_count = session.tables.len();
    if volumes.len() != table_count {
        return Err(SpscalError::InvalidArgument(format!(
            "'{}' has {} line(s) but the session has {} angle tables",
            path.display(),
            volumes.len(),
            table_count
        )));
    }

    for (table, &(volume, volume_error)) in session.tables.values_mut().zip(volumes) {
        let row = table.next_blank_row_mut();
        row.energy = Some(energy);
        row.volume = Some(volume);
        row.volume_error = Some(volume_error);
    }

    Ok(energy)
}

/// 执行 load-volumes 命令
pub fn load_volumes(args: LoadVolumesArgs) -> Result<()> {
    let mut session = load(&args.session)?;
    let volumes = beam_input::parse_volume_file(&args.file)?;
    let energy = apply_volumes(&mut session, &args.file, &volumes)?;

    save(&args.session, &session)?;
    output::print_success(&format!(
        "File '{}' loaded: {} keV into {} angle tables",
        args.file.display(),
        energy,
        volumes.len()
    ));
    Ok(())
}
