//! # 能量刻度拟合
//!
//! 对勾选的峰做道址 -> 能量的加权最小二乘拟合，同时给出线性和二次模型。
//!
//! ## 算法概述
//! 1. 只取 `use_row = true` 的行
//! 2. 每点不确定度 σ_i = sqrt((k·Δx_i)² + ΔE_i²)，k = 1
//! 3. 权重 1/σ_i²，构造法方程 AᵀWA·p = AᵀW·y
//! 4. 列归一化后用 SVD 求解（`nalgebra`）；协方差取 (AᵀWA)⁻¹（绝对不确定度）
//!
//! 二次模型对参数仍是线性的，法方程给出精确解，无需迭代。
//!
//! ## 依赖关系
//! - 被 `commands/calibrate.rs` 调用
//! - 使用 `models/peak.rs`
//! - 结果由 `analysis/plot.rs` 绘制
//! - 使用 `nalgebra` 做矩阵运算

use crate::error::{Result, SpscalError};
use crate::models::PeakRecord;

use nalgebra::{DMatrix, DVector};

/// 峰位不确定度系数
pub const POSITION_ERROR_SCALE: f64 = 1.0;

/// 奇异值相对阈值，低于它视为秩不足
const RANK_TOLERANCE: f64 = 1e-10;

/// 默认采样范围（道址）
pub const DEFAULT_SAMPLE_MIN: f64 = -200.0;
pub const DEFAULT_SAMPLE_MAX: f64 = 125.0;
pub const DEFAULT_SAMPLE_POINTS: usize = 600;

/// 参与拟合的数据点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub position: f64,
    pub position_error: f64,
    pub energy: f64,
    pub energy_error: f64,
    /// 合成不确定度
    pub sigma: f64,
}

/// 多项式拟合结果
#[derive(Debug, Clone, PartialEq)]
pub struct PolyFit {
    /// 系数，按幂次升序：c0 + c1·x + c2·x² ...
    pub coefficients: Vec<f64>,
    /// 系数标准误差
    pub errors: Vec<f64>,
    /// 协方差矩阵
    pub covariance: Vec<Vec<f64>>,
    /// χ²
    pub chi_squared: f64,
}

impl PolyFit {
    /// 计算预测值
    pub fn evaluate(&self, x: f64) -> f64 {
        // Horner
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// 约化 χ²（自由度为零时返回 None）
    pub fn reduced_chi_squared(&self, n_points: usize) -> Option<f64> {
        let dof = n_points.checked_sub(self.coefficients.len())?;
        if dof == 0 {
            None
        } else {
            Some(self.chi_squared / dof as f64)
        }
    }
}

/// 线性模型 E = m·x + c
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
}

/// 二次模型 E = a·x² + b·x + c
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// 刻度拟合结果
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub points: Vec<CalibrationPoint>,
    pub linear_fit: PolyFit,
    pub quadratic_fit: PolyFit,
    /// 残差 E_i - f(x_i)
    pub residuals_linear: Vec<f64>,
    pub residuals_quadratic: Vec<f64>,
}

impl CalibrationResult {
    pub fn linear(&self) -> LinearModel {
        LinearModel {
            slope: self.linear_fit.coefficients[1],
            intercept: self.linear_fit.coefficients[0],
        }
    }

    pub fn quadratic(&self) -> QuadraticModel {
        QuadraticModel {
            a: self.quadratic_fit.coefficients[2],
            b: self.quadratic_fit.coefficients[1],
            c: self.quadratic_fit.coefficients[0],
        }
    }

    pub fn predicted_linear(&self, x: f64) -> f64 {
        self.linear_fit.evaluate(x)
    }

    pub fn predicted_quadratic(&self, x: f64) -> f64 {
        self.quadratic_fit.evaluate(x)
    }

    /// 在 [min, max] 上等距采样 (x, 线性, 二次)
    pub fn sample(&self, min: f64, max: f64, points: usize) -> Vec<(f64, f64, f64)> {
        linspace(min, max, points)
            .into_iter()
            .map(|x| (x, self.predicted_linear(x), self.predicted_quadratic(x)))
            .collect()
    }
}

/// 刻度拟合器
pub struct CalibrationFitter {
    /// 峰位不确定度系数 k
    position_error_scale: f64,
}

impl Default for CalibrationFitter {
    fn default() -> Self {
        Self::new(POSITION_ERROR_SCALE)
    }
}

impl CalibrationFitter {
    pub fn new(position_error_scale: f64) -> Self {
        Self {
            position_error_scale,
        }
    }

    /// 合成不确定度 sqrt((k·Δx)² + ΔE²)
    pub fn weight(&self, position_error: f64, energy_error: f64) -> f64 {
        ((self.position_error_scale * position_error).powi(2) + energy_error.powi(2)).sqrt()
    }

    /// 收集勾选行并校验权重
    pub fn collect_points<'a, I>(&self, rows: I) -> Result<Vec<CalibrationPoint>>
    where
        I: IntoIterator<Item = &'a PeakRecord>,
    {
        let mut points = Vec::new();

        for (i, row) in rows.into_iter().filter(|r| r.use_row).enumerate() {
            let (position, energy) = match (row.position, row.valid_energy()) {
                (Some(p), Some(e)) if p.is_finite() && e.is_finite() => (p, e),
                _ => {
                    return Err(SpscalError::FitError(format!(
                        "selected row {} needs both position and energy",
                        i + 1
                    )))
                }
            };
            let position_error = row.position_error.unwrap_or(f64::NAN);
            let energy_error = row.energy_error.unwrap_or(f64::NAN);
            let sigma = self.weight(position_error, energy_error);

            if !sigma.is_finite() || sigma == 0.0 {
                return Err(SpscalError::FitError(format!(
                    "selected row {} has a degenerate uncertainty (σ = {})",
                    i + 1,
                    sigma
                )));
            }

            points.push(CalibrationPoint {
                position,
                position_error,
                energy,
                energy_error,
                sigma,
            });
        }

        Ok(points)
    }

    /// 线性与二次拟合
    pub fn fit<'a, I>(&self, rows: I) -> Result<CalibrationResult>
    where
        I: IntoIterator<Item = &'a PeakRecord>,
    {
        let points = self.collect_points(rows)?;

        let linear_fit = weighted_polyfit(&points, 1)?;
        let quadratic_fit = weighted_polyfit(&points, 2)?;

        let residuals_linear = points
            .iter()
            .map(|p| p.energy - linear_fit.evaluate(p.position))
            .collect();
        let residuals_quadratic = points
            .iter()
            .map(|p| p.energy - quadratic_fit.evaluate(p.position))
            .collect();

        Ok(CalibrationResult {
            points,
            linear_fit,
            quadratic_fit,
            residuals_linear,
            residuals_quadratic,
        })
    }

    /// 仅线性拟合（两个点即可）
    pub fn fit_linear<'a, I>(&self, rows: I) -> Result<LinearModel>
    where
        I: IntoIterator<Item = &'a PeakRecord>,
    {
        let points = self.collect_points(rows)?;
        let fit = weighted_polyfit(&points, 1)?;
        Ok(LinearModel {
            slope: fit.coefficients[1],
            intercept: fit.coefficients[0],
        })
    }
}

/// 加权多项式最小二乘
///
/// 设计矩阵每行为 (1, x, x², ...) / σ，列归一化后做 SVD 求解；
/// 秩不足（峰位退化）时返回 FitError。协方差取 (AᵀWA)⁻¹。
pub fn weighted_polyfit(points: &[CalibrationPoint], degree: usize) -> Result<PolyFit> {
    let n_params = degree + 1;
    if points.len() < n_params {
        return Err(SpscalError::FitError(format!(
            "degree-{} fit needs at least {} selected rows, got {}",
            degree,
            n_params,
            points.len()
        )));
    }

    let design = DMatrix::from_fn(points.len(), n_params, |i, k| {
        points[i].position.powi(k as i32) / points[i].sigma
    });
    let target = DVector::from_iterator(points.len(), points.iter().map(|p| p.energy / p.sigma));

    // 列归一化
    let scales = DVector::from_iterator(
        n_params,
        design.column_iter().map(|col| {
            let norm = col.norm();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        }),
    );
    let scaled = &design * DMatrix::from_diagonal(&scales.map(|s| 1.0 / s));

    let svd = scaled.clone().svd(true, true);
    let tolerance = svd.singular_values.max() * RANK_TOLERANCE;
    if !tolerance.is_finite() || svd.rank(tolerance) < n_params {
        return Err(singular());
    }
    let scaled_coefficients = svd
        .solve(&target, tolerance)
        .map_err(|e| SpscalError::FitError(e.to_string()))?;

    let normal = scaled.transpose() * &scaled;
    let inverse = normal.try_inverse().ok_or_else(singular)?;

    let coefficients: Vec<f64> = scaled_coefficients
        .iter()
        .zip(scales.iter())
        .map(|(c, s)| c / s)
        .collect();
    let covariance: Vec<Vec<f64>> = (0..n_params)
        .map(|r| {
            (0..n_params)
                .map(|c| inverse[(r, c)] / (scales[r] * scales[c]))
                .collect()
        })
        .collect();
    let errors = (0..n_params)
        .map(|k| covariance[k][k].max(0.0).sqrt())
        .collect();

    let mut fit = PolyFit {
        coefficients,
        errors,
        covariance,
        chi_squared: 0.0,
    };
    fit.chi_squared = points
        .iter()
        .map(|p| ((p.energy - fit.evaluate(p.position)) / p.sigma).powi(2))
        .sum();

    Ok(fit)
}

fn singular() -> SpscalError {
    SpscalError::FitError("singular normal matrix (positions are degenerate)".to_string())
}

/// 闭区间等距采样
pub fn linspace(min: f64, max: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (points - 1) as f64;
            (0..points).map(|i| min + i as f64 * step).collect()
        }
    }
}
