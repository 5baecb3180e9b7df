//! # 会话管理命令实现
//!
//! ## 功能
//! - `init`: 按角度范围创建空会话
//! - `set`: 设置会话名称、靶参数、峰表名称
//! - `show`: 以表格显示会话内容
//! - `row`: 增删行、勾选拟合行、填写已知能量
//!
//! ## 依赖关系
//! - 使用 `cli/session.rs` 定义的参数
//! - 使用 `parsers/session_file.rs`
//! - 使用 `utils/output.rs`

use super::{load, save};
use crate::cli::session::{
    InitArgs, RowAddArgs, RowEnergyArgs, RowIndexArgs, RowUseArgs, SetArgs, ShowArgs,
};
use crate::error::{Result, SpscalError};
use crate::models::session::{
    angle_range, FIELD_MOLAR_MASS, FIELD_NAME, FIELD_TARGET_THICKNESS,
};
use crate::models::{Angle, AngleTable, PeakRecord, Session};
use crate::parsers::session_file;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 峰表显示行
#[derive(Tabled)]
struct PeakRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Use")]
    use_row: &'static str,
    #[tabled(rename = "E (keV)")]
    energy: String,
    #[tabled(rename = "ΔE")]
    energy_error: String,
    #[tabled(rename = "Position")]
    position: String,
    #[tabled(rename = "ΔPos")]
    position_error: String,
    #[tabled(rename = "Width")]
    width: String,
    #[tabled(rename = "ΔWidth")]
    width_error: String,
    #[tabled(rename = "Volume")]
    volume: String,
    #[tabled(rename = "ΔVol")]
    volume_error: String,
}

/// BCI 显示行
#[derive(Tabled)]
struct BeamRow {
    #[tabled(rename = "Angle (°)")]
    angle: f64,
    #[tabled(rename = "BCI hits")]
    bci_hits: f64,
    #[tabled(rename = "BCI scale")]
    bci_scale: f64,
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn peak_row(index: usize, peak: &PeakRecord) -> PeakRow {
    PeakRow {
        index,
        use_row: if peak.use_row { "x" } else { "" },
        energy: cell(peak.energy),
        energy_error: cell(peak.energy_error),
        position: cell(peak.position),
        position_error: cell(peak.position_error),
        width: cell(peak.width),
        width_error: cell(peak.width_error),
        volume: cell(peak.volume),
        volume_error: cell(peak.volume_error),
    }
}

/// 解析角度范围，如 "15-60"
fn parse_angle_range(range: &str) -> Result<(Angle, Angle)> {
    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return Err(SpscalError::InvalidRange(range.to_string()));
    }

    let min: Angle = parts[0]
        .trim()
        .parse()
        .map_err(|_| SpscalError::InvalidRange(range.to_string()))?;
    let max: Angle = parts[1]
        .trim()
        .parse()
        .map_err(|_| SpscalError::InvalidRange(range.to_string()))?;

    if max < min || max > 180 {
        return Err(SpscalError::InvalidRange(format!(
            "{} (must be 0 <= min <= max <= 180)",
            range
        )));
    }

    Ok((min, max))
}

/// 执行 init 命令
pub fn init(args: InitArgs) -> Result<()> {
    output::print_header("Creating Session");

    let path = &args.session.session;
    if path.exists() && !args.force {
        return Err(SpscalError::InvalidArgument(format!(
            "Session '{}' already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let (min, max) = parse_angle_range(&args.angles)?;
    if args.step == 0 {
        return Err(SpscalError::InvalidArgument(
            "Angle step must be positive".to_string(),
        ));
    }
    let angles = angle_range(min, max, args.step);

    let mut session = Session::with_angles(&angles);
    if let Some(name) = args.name {
        session.set_field(FIELD_NAME, name);
    }

    save(&args.session, &session)?;
    output::print_success(&format!(
        "Session '{}' created with {} angle tables ({:?})",
        path.display(),
        angles.len(),
        angles
    ));

    Ok(())
}

/// 执行 set 命令
pub fn set(args: SetArgs) -> Result<()> {
    let mut session = load(&args.session)?;
    let mut changes = Vec::new();

    if let Some(name) = args.name {
        session.set_field(FIELD_NAME, name);
        changes.push(FIELD_NAME.to_string());
    }
    if let Some(thickness) = args.thickness {
        session.set_field(FIELD_TARGET_THICKNESS, thickness);
        changes.push(FIELD_TARGET_THICKNESS.to_string());
    }
    if let Some(molar_mass) = args.molar_mass {
        session.set_field(FIELD_MOLAR_MASS, molar_mass);
        changes.push(FIELD_MOLAR_MASS.to_string());
    }
    for (angle, name) in args.table_name {
        session.table_mut(angle)?.name = name;
        changes.push(session_file::angle_name_field(angle));
    }

    if changes.is_empty() {
        output::print_warning("Nothing to set");
        return Ok(());
    }

    save(&args.session, &session)?;
    output::print_success(&format!("Updated {}", changes.join(", ")));
    Ok(())
}

/// 执行 show 命令
pub fn show(args: ShowArgs) -> Result<()> {
    let session = load(&args.session)?;

    if let Some(angle) = args.angle {
        print_angle_table(session.table(angle)?);
        return Ok(());
    }

    output::print_header(&format!("Session '{}'", args.session.session.display()));
    output::print_field(FIELD_NAME, session.name());
    for key in [FIELD_TARGET_THICKNESS, FIELD_MOLAR_MASS] {
        output::print_field(key, session.fields.get(key).map(|s| s.as_str()).unwrap_or(""));
    }
    output::print_field(
        "angles",
        &session
            .angles()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );

    output::print_header("BCI Input");
    if session.beam.is_empty() {
        output::print_warning("No BCI rows loaded");
    } else {
        let rows: Vec<BeamRow> = session
            .beam
            .iter()
            .map(|b| BeamRow {
                angle: b.angle,
                bci_hits: b.bci_hits,
                bci_scale: b.bci_scale,
            })
            .collect();
        println!("{}", Table::new(&rows));
    }

    for table in session.tables.values() {
        print_angle_table(table);
    }

    Ok(())
}

fn print_angle_table(table: &AngleTable) {
    let title = if table.name.is_empty() {
        table.label()
    } else {
        format!("{} ({})", table.label(), table.name)
    };
    output::print_header(&title);

    let rows: Vec<PeakRow> = table
        .rows
        .iter()
        .enumerate()
        .map(|(i, peak)| peak_row(i + 1, peak))
        .collect();
    println!("{}", Table::new(&rows));
}

/// 1-based 行号 -> 行的可变引用
fn row_mut<'a>(session: &'a mut Session, args: &RowIndexArgs) -> Result<&'a mut PeakRecord> {
    let table = session.table_mut(args.angle)?;
    let len = table.rows.len();
    args.index
        .checked_sub(1)
        .and_then(|i| table.rows.get_mut(i))
        .ok_or_else(|| {
            SpscalError::InvalidArgument(format!(
                "Row {} out of range for {} deg (1..={})",
                args.index, args.angle, len
            ))
        })
}

/// 执行 row add 命令
pub fn row_add(args: RowAddArgs) -> Result<()> {
    let mut session = load(&args.session)?;
    let table = session.table_mut(args.angle)?;
    table.add_rows(args.count);
    let total = table.rows.len();

    save(&args.session, &session)?;
    output::print_success(&format!(
        "Added {} row(s) to {} deg ({} rows)",
        args.count, args.angle, total
    ));
    Ok(())
}

/// 执行 row remove 命令
pub fn row_remove(args: RowIndexArgs) -> Result<()> {
    let mut session = load(&args.session)?;
    let removed = args
        .index
        .checked_sub(1)
        .and_then(|i| session.table_mut(args.angle).ok()?.remove_row(i));

    if removed.is_none() {
        // 区分未配置角度和越界行号
        session.table(args.angle)?;
        return Err(SpscalError::InvalidArgument(format!(
            "Row {} out of range for {} deg",
            args.index, args.angle
        )));
    }

    save(&args.session, &session)?;
    output::print_success(&format!("Removed row {} from {} deg", args.index, args.angle));
    Ok(())
}

/// 执行 row use 命令
pub fn row_use(args: RowUseArgs) -> Result<()> {
    let mut session = load(&args.row.session)?;
    row_mut(&mut session, &args.row)?.use_row = !args.off;

    save(&args.row.session, &session)?;
    output::print_success(&format!(
        "Row {} at {} deg {} for calibration",
        args.row.index,
        args.row.angle,
        if args.off { "deselected" } else { "selected" }
    ));
    Ok(())
}

/// 执行 row energy 命令
pub fn row_energy(args: RowEnergyArgs) -> Result<()> {
    let mut session = load(&args.row.session)?;
    let row = row_mut(&mut session, &args.row)?;
    row.energy = Some(args.energy);
    if let Some(error) = args.error {
        row.energy_error = Some(error);
    }

    save(&args.row.session, &session)?;
    output::print_success(&format!(
        "Row {} at {} deg: E = {} keV",
        args.row.index, args.row.angle, args.energy
    ));
    Ok(())
}
