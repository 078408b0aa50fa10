use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process;

use rust_keep_lib::commands::{self, Command, Output};
use rust_keep_lib::modules::common::logging;
use rust_keep_lib::modules::common::response::OperationResponse;
use rust_keep_lib::modules::session::{self, Session};
use rust_keep_lib::modules::updater::CURRENT_VERSION;

#[derive(Parser, Debug)]
#[command(name = "rust-keep")]
#[command(about = "Windows 存档管理与清理配置执行工具", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 详细输出模式
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    /// 数据目录
    #[arg(long, global = true, env = "RUST_KEEP_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.verbose);

    let out = Output { json: cli.json };
    match run(cli.command, cli.data_dir, out).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            tracing::error!("错误: {}", e);
            process::exit(1);
        }
    }

    Ok(())
}

async fn run(command: Command, data_dir: Option<PathBuf>, out: Output) -> Result<bool> {
    if let Command::Version = command {
        let version = CURRENT_VERSION.to_string();
        return out.emit(&OperationResponse::ok(version), |v| println!("rust-keep {}", v));
    }

    let root = session::resolve_data_dir(data_dir);
    let mut session = Session::open(&root)?;

    match command {
        Command::Saves(cmd) => commands::saves::execute(cmd, &mut session, out).await,
        Command::Clean(cmd) => commands::clean::execute(cmd, &mut session, out).await,
        Command::Reports(cmd) => commands::report::execute(cmd, &session, out).await,
        Command::Update(cmd) => commands::update::execute(cmd, &mut session, out).await,
        Command::Version => Ok(true),
    }
}
