//! # 数据模型模块
//!
//! 定义峰表、测量会话和截面结果的数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`、`analysis/` 和 `commands/` 使用
//! - 子模块: peak, session, cross_section

pub mod cross_section;
pub mod peak;
pub mod session;

pub use cross_section::{CrossSectionCell, CrossSectionRow, CrossSectionTable, MeasuredPosition};
pub use peak::{Angle, AngleTable, PeakRecord};
pub use session::{BeamInputRow, Session, TargetParameters};
