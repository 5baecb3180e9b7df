//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。所有修改会话的命令先完成计算，
//! 成功后才写回会话文件，失败时会话文件保持不变。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `analysis/`, `models/`, `utils/`
//! - 子模块: session, ingest, calibrate, cross_section, convert

pub mod calibrate;
pub mod convert;
pub mod cross_section;
pub mod ingest;
pub mod session;

use crate::cli::session::RowCommands;
use crate::cli::{Commands, SessionArg};
use crate::error::Result;
use crate::models::Session;
use crate::parsers::session_file;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => session::init(args),
        Commands::Set(args) => session::set(args),
        Commands::Show(args) => session::show(args),
        Commands::Row(args) => match args.command {
            RowCommands::Add(args) => session::row_add(args),
            RowCommands::Remove(args) => session::row_remove(args),
            RowCommands::Use(args) => session::row_use(args),
            RowCommands::Energy(args) => session::row_energy(args),
        },
        Commands::LoadInput(args) => ingest::load_input(args),
        Commands::LoadFit(args) => ingest::load_fit(args),
        Commands::LoadVolumes(args) => ingest::load_volumes(args),
        Commands::Calibrate(args) => calibrate::execute(args),
        Commands::CrossSection(args) => cross_section::execute(args),
        Commands::Convert(args) => convert::execute(args),
    }
}

/// 读取会话文件
fn load(arg: &SessionArg) -> Result<Session> {
    session_file::load_session(&arg.session)
}

/// 写回会话文件
fn save(arg: &SessionArg, session: &Session) -> Result<()> {
    session_file::save_session(session, &arg.session)
}
