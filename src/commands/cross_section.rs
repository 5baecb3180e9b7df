//! # cross-section 命令实现
//!
//! 对齐各角度的激发态并计算微分截面，打印截面表，可选导出
//! `<E>_keV.txt` 文件、整表 CSV 和角分布图。不修改会话文件。
//!
//! ## 依赖关系
//! - 使用 `cli/cross_section.rs` 定义的参数
//! - 使用 `analysis/cross_section.rs`, `analysis/export.rs`, `analysis/plot.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use super::load;
use crate::analysis::plot::{self, ImageFormat};
use crate::analysis::{compute_table, export, MatchPolicy};
use crate::cli::calibrate::PlotFormat;
use crate::cli::cross_section::CrossSectionArgs;
use crate::error::{Result, SpscalError};
use crate::models::{CrossSectionCell, CrossSectionTable};
use crate::utils::{output, progress};

use std::fs;
use std::path::Path;
use tabled::builder::Builder;

/// 截面单元显示文本
fn format_cell(cell: Option<&CrossSectionCell>) -> String {
    match cell {
        Some(CrossSectionCell::Value {
            cross_section,
            uncertainty,
        }) => format!("{} ± {}", cross_section, uncertainty),
        Some(CrossSectionCell::Unavailable { .. }) => "n/a".to_string(),
        None => String::new(),
    }
}

fn print_table(table: &CrossSectionTable) {
    let mut builder = Builder::default();

    let mut header = vec!["E (keV)".to_string()];
    header.extend(table.angles.iter().map(|a| format!("{}° (mb/sr)", a)));
    builder.push_record(header);

    for row in &table.rows {
        let mut record = vec![row.energy.to_string()];
        record.extend(table.angles.iter().map(|a| format_cell(row.cells.get(a))));
        builder.push_record(record);
    }

    println!("{}", builder.build());
}

/// 角分布图文件名，如 `4439_keV_angulardist.png`
pub fn angular_plot_file_name(energy: f64, format: ImageFormat) -> String {
    format!(
        "{}_keV_angulardist.{}",
        energy.trunc() as i64,
        format.extension()
    )
}

fn save_angular_plots(table: &CrossSectionTable, dir: &Path, format: ImageFormat) -> Result<usize> {
    let names = export::distinct_file_names(&table.rows, |e| angular_plot_file_name(e, format))?;

    fs::create_dir_all(dir).map_err(|e| SpscalError::FileWriteError {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut saved = 0;
    for (row, name) in table.rows.iter().zip(names) {
        let path = dir.join(name);
        let title = format!("{} keV", row.energy);
        match plot::generate_angular_plot(row, &title, &path, format) {
            Ok(()) => saved += 1,
            Err(SpscalError::InvalidArgument(reason)) => output::print_skip(&reason),
            Err(e) => return Err(e),
        }
    }
    Ok(saved)
}

/// 执行 cross-section 命令
pub fn execute(args: CrossSectionArgs) -> Result<()> {
    if let Some(eps) = args.tolerance {
        if eps.is_nan() || eps < 0.0 {
            return Err(SpscalError::InvalidArgument(format!(
                "Tolerance must be a non-negative number, got {}",
                eps
            )));
        }
    }

    let session = load(&args.session)?;
    output::print_header("Differential Cross-Sections");

    let policy = MatchPolicy::from_tolerance(args.tolerance);
    let spinner = progress::create_spinner("Aligning states and computing cross-sections");
    let result = compute_table(&session, policy);
    spinner.finish_and_clear();
    let table = result?;

    if table.rows.is_empty() {
        output::print_warning("No state energy is present in every angle table");
        return Ok(());
    }

    output::print_info(&format!(
        "{} state(s) aligned across {} angles",
        table.rows.len(),
        table.angles.len()
    ));
    print_table(&table);

    for (energy, angle, reason) in table.failures() {
        output::print_warning(&format!("{} keV at {} deg: {}", energy, angle, reason));
    }

    let selected = export::select_states(&table, &args.states, policy)?;
    if !args.states.is_empty() {
        output::print_info(&format!(
            "{} of {} state(s) selected for output",
            selected.rows.len(),
            table.rows.len()
        ));
    }

    if let Some(ref dir) = args.export {
        let written = export::export_kev_files(&selected, dir)?;
        output::print_success(&format!(
            "Written {} file(s) to '{}'",
            written.len(),
            dir.display()
        ));
    }

    if let Some(ref csv_path) = args.csv {
        export::to_csv(&selected, csv_path)?;
        output::print_success(&format!("Cross-section table saved to '{}'", csv_path.display()));
    }

    if let Some(ref dir) = args.plot {
        let format = match args.format {
            PlotFormat::Png => ImageFormat::Png,
            PlotFormat::Svg => ImageFormat::Svg,
        };
        let saved = save_angular_plots(&selected, dir, format)?;
        output::print_success(&format!(
            "Saved {} angular distribution(s) to '{}'",
            saved,
            dir.display()
        ));
    }

    output::print_done(&format!("{} state(s) computed", table.rows.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SessionArg;
    use crate::models::session::{FIELD_MOLAR_MASS, FIELD_TARGET_THICKNESS};
    use crate::models::{BeamInputRow, PeakRecord, Session};
    use crate::parsers::session_file;

    fn sample_session() -> Session {
        let mut session = Session::with_angles(&[15, 20]);
        session.set_field(FIELD_TARGET_THICKNESS, "500");
        session.set_field(FIELD_MOLAR_MASS, "12");
        for angle in [15.0, 20.0] {
            session.beam.push(BeamInputRow {
                angle,
                bci_hits: 1000.0,
                bci_scale: 10.0,
            });
        }
        for table in session.tables.values_mut() {
            table.rows = vec![PeakRecord {
                energy: Some(4439.0),
                volume: Some(2000.0),
                volume_error: Some(50.0),
                ..PeakRecord::default()
            }];
        }
        session
    }

    #[test]
    fn test_angular_plot_file_name() {
        assert_eq!(
            angular_plot_file_name(4439.7, ImageFormat::Png),
            "4439_keV_angulardist.png"
        );
        assert_eq!(
            angular_plot_file_name(1779.0, ImageFormat::Svg),
            "1779_keV_angulardist.svg"
        );
    }

    #[test]
    fn test_format_cell() {
        let cell = CrossSectionCell::Value {
            cross_section: 0.0000275,
            uncertainty: 0.0000042,
        };
        assert_eq!(format_cell(Some(&cell)), "0.0000275 ± 0.0000042");
        let missing = CrossSectionCell::Unavailable {
            reason: "x".to_string(),
        };
        assert_eq!(format_cell(Some(&missing)), "n/a");
    }

    #[test]
    fn test_execute_exports() {
        let dir = tempfile::tempdir().unwrap();
        let arg = SessionArg {
            session: dir.path().join("session.json"),
        };
        session_file::save_session(&sample_session(), &arg.session).unwrap();
        let before = fs::read_to_string(&arg.session).unwrap();

        let export_dir = dir.path().join("xs");
        let plot_dir = dir.path().join("plots");
        execute(CrossSectionArgs {
            session: arg.clone(),
            tolerance: None,
            states: Vec::new(),
            export: Some(export_dir.clone()),
            csv: Some(dir.path().join("xs.csv")),
            plot: Some(plot_dir.clone()),
            format: PlotFormat::Svg,
        })
        .unwrap();

        let content = fs::read_to_string(export_dir.join("4439_keV.txt")).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec!["0.0000275\t0.0000042"; 2]);
        assert!(plot_dir.join("4439_keV_angulardist.svg").exists());
        assert!(dir.path().join("xs.csv").exists());
        assert_eq!(fs::read_to_string(&arg.session).unwrap(), before);
    }

    #[test]
    fn test_unselected_states_are_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let arg = SessionArg {
            session: dir.path().join("session.json"),
        };
        let mut session = sample_session();
        for table in session.tables.values_mut() {
            table.rows.push(PeakRecord {
                energy: Some(1779.0),
                volume: Some(900.0),
                volume_error: Some(30.0),
                ..PeakRecord::default()
            });
        }
        session_file::save_session(&session, &arg.session).unwrap();

        let export_dir = dir.path().join("xs");
        let plot_dir = dir.path().join("plots");
        let run = |states: Vec<f64>| {
            execute(CrossSectionArgs {
                session: arg.clone(),
                tolerance: None,
                states,
                export: Some(export_dir.clone()),
                csv: None,
                plot: Some(plot_dir.clone()),
                format: PlotFormat::Svg,
            })
        };

        run(vec![1779.0]).unwrap();
        assert!(export_dir.join("1779_keV.txt").exists());
        assert!(plot_dir.join("1779_keV_angulardist.svg").exists());
        assert!(!export_dir.join("4439_keV.txt").exists());
        assert!(!plot_dir.join("4439_keV_angulardist.svg").exists());

        assert!(matches!(
            run(vec![6130.0]),
            Err(SpscalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_execute_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let arg = SessionArg {
            session: dir.path().join("session.json"),
        };
        let mut session = sample_session();
        session.fields.remove(FIELD_TARGET_THICKNESS);
        session_file::save_session(&session, &arg.session).unwrap();

        let result = execute(CrossSectionArgs {
            session: arg,
            tolerance: Some(-1.0),
            states: Vec::new(),
            export: None,
            csv: None,
            plot: None,
            format: PlotFormat::Png,
        });
        assert!(matches!(result, Err(SpscalError::InvalidArgument(_))));

        let arg = SessionArg {
            session: dir.path().join("session.json"),
        };
        let result = execute(CrossSectionArgs {
            session: arg,
            tolerance: None,
            states: Vec::new(),
            export: None,
            csv: None,
            plot: None,
            format: PlotFormat::Png,
        });
        assert!(matches!(result, Err(SpscalError::MissingInput { .. })));
    }
}
