//! # 微分截面计算
//!
//! 由峰体积、束流积分 (BCI) 计数、靶面密度和摩尔质量计算微分截面 (mb/sr)。
//!
//! ## 公式
//! ```text
//! ρt   = 靶厚 [μg/cm²] · 10⁻²⁴ · N_A / M            (1/barn)
//! Q    = BCI_hits · 10⁻⁹ · BCI_scale / f_sample       (C)
//! N    = Q / e
//! dσ/dΩ = volume · 1000 / (N · ρt · ΔΩ)              (mb/sr)
//! δ    = dσ/dΩ · sqrt((δV/V)² + (0.15)²)             (V = 0 时 δ = 0)
//! ```
//! 两个结果都保留 7 位小数。
//!
//! ## 依赖关系
//! - 被 `commands/cross_section.rs` 调用
//! - 使用 `analysis/aligner.rs` 对齐各角度的峰
//! - 使用 `models/` 的 Session, CrossSectionTable
//! - 使用 `rayon` 并行计算各单元

use crate::analysis::aligner::{self, MatchPolicy};
use crate::error::{Result, SpscalError};
use crate::models::{
    Angle, CrossSectionCell, CrossSectionRow, CrossSectionTable, MeasuredPosition, PeakRecord,
    Session, TargetParameters,
};

use rayon::prelude::*;

/// 阿伏伽德罗常数
pub const AVOGADRO: f64 = 6.023e23;
/// cm² -> barn
pub const CM2_TO_BARN: f64 = 1.0e-24;
/// BCI 采样频率 (Hz)
pub const SAMPLING_RATE_HZ: f64 = 100.0;
/// 元电荷 (C)
pub const ELEMENTARY_CHARGE_C: f64 = 1.60e-19;
/// 狭缝立体角 (sr)
pub const SOLID_ANGLE_SR: f64 = 0.00463;
/// BCI 相对不确定度
pub const BCI_RELATIVE_ERROR: f64 = 0.15;

/// 单个峰的截面计算
pub fn compute(
    bci_hits: f64,
    bci_scale: f64,
    target_thickness_ug_cm2: f64,
    molar_mass_g_mol: f64,
    volume: f64,
    volume_error: f64,
) -> Result<(f64, f64)> {
    if molar_mass_g_mol == 0.0 {
        return Err(SpscalError::DivisionError(
            "molar mass is zero".to_string(),
        ));
    }
    if bci_hits == 0.0 {
        return Err(SpscalError::DivisionError("BCI hits are zero".to_string()));
    }

    let areal_density_per_barn = target_thickness_ug_cm2 * CM2_TO_BARN * AVOGADRO / molar_mass_g_mol;
    let beam_charge_c = bci_hits * 1e-9 * bci_scale / SAMPLING_RATE_HZ;
    let beam_particle_count = beam_charge_c / ELEMENTARY_CHARGE_C;

    let denominator = beam_particle_count * areal_density_per_barn * SOLID_ANGLE_SR;
    if denominator == 0.0 {
        return Err(SpscalError::DivisionError(format!(
            "beam charge × areal density is zero (BCI scale = {}, target thickness = {})",
            bci_scale, target_thickness_ug_cm2
        )));
    }

    let cross_section = volume * 1000.0 / denominator;

    let bci_error = BCI_RELATIVE_ERROR * bci_hits;
    let uncertainty = if volume == 0.0 {
        0.0
    } else {
        cross_section * ((volume_error / volume).powi(2) + (bci_error / bci_hits).powi(2)).sqrt()
    };

    Ok((round7(cross_section), round7(uncertainty)))
}

/// 保留 7 位小数；放大后溢出的极大值原样返回
fn round7(value: f64) -> f64 {
    let scaled = value * 1e7;
    if scaled.is_finite() {
        scaled.round() / 1e7
    } else {
        value
    }
}

/// 计算单个 (能级, 角度) 单元
fn compute_cell(session: &Session, target: &TargetParameters, angle: Angle, peak: &PeakRecord) -> CrossSectionCell {
    let result = session.beam_for(angle).and_then(|beam| {
        let volume = peak.volume.ok_or_else(|| SpscalError::MissingInput {
            field: format!("volume at {} deg", angle),
        })?;
        let volume_error = peak.volume_error.ok_or_else(|| SpscalError::MissingInput {
            field: format!("volume error at {} deg", angle),
        })?;
        compute(
            beam.bci_hits,
            beam.bci_scale,
            target.target_thickness_ug_cm2,
            target.molar_mass_g_mol,
            volume,
            volume_error,
        )
    });

    match result {
        Ok((cross_section, uncertainty)) => CrossSectionCell::Value {
            cross_section,
            uncertainty,
        },
        Err(e) => CrossSectionCell::Unavailable {
            reason: e.to_string(),
        },
    }
}

fn measured_position(peak: &PeakRecord) -> Option<MeasuredPosition> {
    let position = peak.position.filter(|p| p.is_finite())?;
    Some(MeasuredPosition {
        position,
        error: peak.position_error.filter(|e| e.is_finite()).unwrap_or(0.0),
    })
}

/// 计算整个截面表
///
/// 靶参数缺失时整批中止；单个单元失败只把该单元标为不可用。
pub fn compute_table(session: &Session, policy: MatchPolicy) -> Result<CrossSectionTable> {
    let target = session.target_parameters()?;
    let states = aligner::align(&session.tables, policy);

    let rows: Vec<CrossSectionRow> = states
        .par_iter()
        .map(|state| CrossSectionRow {
            energy: state.energy,
            cells: state
                .peaks
                .iter()
                .map(|(&angle, peak)| (angle, compute_cell(session, &target, angle, peak)))
                .collect(),
            positions: state
                .peaks
                .iter()
                .filter_map(|(&angle, peak)| measured_position(peak).map(|m| (angle, m)))
                .collect(),
        })
        .collect();

    Ok(CrossSectionTable {
        angles: session.angles(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{FIELD_MOLAR_MASS, FIELD_TARGET_THICKNESS};
    use crate::models::BeamInputRow;

    #[test]
    fn test_golden_value() {
        let (xs, err) = compute(1000.0, 10.0, 500.0, 12.0, 2000.0, 50.0).unwrap();
        // ρt = 25.0958333 /b, N = 6.25e11
        assert!((xs - 0.0000275).abs() < 1e-15);
        assert!((err - 0.0000042).abs() < 1e-15);
    }

    #[test]
    fn test_golden_value_large_yield() {
        let (xs, err) = compute(50000.0, 2.0, 250.0, 24.0, 1.2e6, 3000.0).unwrap();
        assert!((xs - 0.0066097).abs() < 1e-12);
        assert!((err - 0.0009916).abs() < 1e-12);
    }

    #[test]
    fn test_linear_in_volume() {
        let (xs1, _) = compute(2.0e5, 10.0, 500.0, 12.0, 1.0e7, 10.0).unwrap();
        let (xs2, _) = compute(2.0e5, 10.0, 500.0, 12.0, 3.0e7, 10.0).unwrap();
        assert!(xs1 > 0.0);
        assert!((xs1 - 0.0006885).abs() < 1e-12);
        assert!((xs2 - 3.0 * xs1).abs() < 1e-12);
    }

    #[test]
    fn test_round7_keeps_huge_values_finite() {
        assert_eq!(round7(1.23456789), 1.2345679);
        assert_eq!(round7(1e305), 1e305);

        let (xs, err) = compute(1.0, 1.0, 1e-10, 1.0, 1e300, 1.0).unwrap();
        assert!(xs.is_finite());
        assert!(err.is_finite());
    }

    #[test]
    fn test_zero_volume_zero_uncertainty() {
        let (xs, err) = compute(1000.0, 10.0, 500.0, 12.0, 0.0, 75.0).unwrap();
        assert_eq!(xs, 0.0);
        assert_eq!(err, 0.0);

        let (_, err) = compute(1000.0, 10.0, 500.0, 12.0, 1.0e6, 0.0).unwrap();
        assert!(err > 0.0);
    }

    #[test]
    fn test_division_errors() {
        assert!(matches!(
            compute(0.0, 10.0, 500.0, 12.0, 2000.0, 50.0),
            Err(SpscalError::DivisionError(_))
        ));
        assert!(matches!(
            compute(1000.0, 10.0, 500.0, 0.0, 2000.0, 50.0),
            Err(SpscalError::DivisionError(_))
        ));
        assert!(matches!(
            compute(1000.0, 0.0, 500.0, 12.0, 2000.0, 50.0),
            Err(SpscalError::DivisionError(_))
        ));
    }

    fn peak(energy: f64, volume: Option<f64>) -> PeakRecord {
        PeakRecord {
            energy: Some(energy),
            volume,
            volume_error: Some(50.0),
            ..PeakRecord::default()
        }
    }

    fn session() -> Session {
        let mut session = Session::with_angles(&[15, 20, 25]);
        session.set_field(FIELD_TARGET_THICKNESS, "500");
        session.set_field(FIELD_MOLAR_MASS, "12");
        for angle in [15.0, 20.0, 25.0] {
            session.beam.push(BeamInputRow {
                angle,
                bci_hits: 1000.0,
                bci_scale: 10.0,
            });
        }
        for table in session.tables.values_mut() {
            table.rows = vec![peak(4439.0, Some(2000.0))];
        }
        session
    }

    #[test]
    fn test_compute_table() {
        let table = compute_table(&session(), MatchPolicy::Exact).unwrap();
        assert_eq!(table.angles, vec![15, 20, 25]);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.energy, 4439.0);
        assert_eq!(row.cells.len(), 3);
        assert!(table.failures().is_empty());
        assert_eq!(row.angular_distribution().len(), 3);
        assert!(row.positions.is_empty());
    }

    #[test]
    fn test_positions_follow_aligned_peaks() {
        let mut session = session();
        for (angle, position) in [(15, 4438.6), (25, 4440.1)] {
            let peak = &mut session.table_mut(angle).unwrap().rows[0];
            peak.position = Some(position);
            peak.position_error = Some(0.4);
        }

        let table = compute_table(&session, MatchPolicy::Exact).unwrap();
        let positions = &table.rows[0].positions;
        assert_eq!(positions.len(), 2);
        assert_eq!(
            positions[&15],
            MeasuredPosition {
                position: 4438.6,
                error: 0.4
            }
        );
        assert!(!positions.contains_key(&20));
    }

    #[test]
    fn test_partial_failure_keeps_other_cells() {
        let mut session = session();
        session.beam.retain(|b| b.angle != 20.0);
        session.table_mut(25).unwrap().rows[0].volume = None;

        let table = compute_table(&session, MatchPolicy::Exact).unwrap();
        let failures = table.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|(_, angle, _)| *angle == 20));
        assert!(failures.iter().any(|(_, angle, _)| *angle == 25));
        assert!(table.rows[0].cells[&15].value().is_some());
    }

    #[test]
    fn test_missing_target_aborts_batch() {
        let mut session = session();
        session.fields.remove(FIELD_MOLAR_MASS);
        assert!(matches!(
            compute_table(&session, MatchPolicy::Exact),
            Err(SpscalError::MissingInput { .. })
        ));
    }
}
