use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use super::Output;
use crate::modules::common::response::OperationResponse;
use crate::modules::saves::{LoadedSave, SaveFile};
use crate::modules::session::Session;

#[derive(Subcommand, Debug)]
pub enum SavesCommand {
    /// 显示当前存档内容
    Current,

    /// 用 JSON 文档覆盖当前存档 (`-` 表示从标准输入读取)
    Save {
        source: String,
    },

    /// 列出存档和备份
    List,

    /// 切换当前存档 (支持模糊匹配)
    Switch {
        name: String,
    },

    /// 用模板创建新存档
    Create {
        name: String,
    },

    /// 备份当前存档
    Backup {
        /// 备份文件名 (默认按时间生成)
        #[arg(long)]
        name: Option<String>,
    },

    /// 从备份恢复为新存档并切换过去
    Restore {
        backup: String,
    },

    /// 显示存档目录
    Path,
}

#[derive(Debug, Serialize)]
struct CurrentSave {
    file_name: String,
    path: String,
    data: Option<SaveFile>,
}

pub async fn execute(cmd: SavesCommand, session: &mut Session, out: Output) -> Result<bool> {
    let store = &mut session.saves;

    match cmd {
        SavesCommand::Current => {
            let response = OperationResponse::from_result(store.load_current().map(|data| CurrentSave {
                file_name: store.current_name().to_string(),
                path: store.current_path().to_string_lossy().to_string(),
                data,
            }));
            out.emit(&response, |current| {
                println!("当前存档: {} ({})", current.file_name, current.path);
                match &current.data {
                    Some(data) => {
                        println!("  分组: {}", data.section_count());
                        println!("  文件夹: {}", data.folder_count());
                    }
                    None => println!("  存档文件不存在"),
                }
            })
        }
        SavesCommand::Save { source } => {
            let written = read_document(&source, std::io::stdin().lock())
                .and_then(|data| store.save_current(&data).map_err(Into::into));
            let response = match written {
                Ok(path) => OperationResponse::ok(path.to_string_lossy().to_string()),
                Err(e) => OperationResponse::failure(format!("{:#}", e)),
            };
            out.emit(&response, |path| println!("已保存: {}", path))
        }
        SavesCommand::List => {
            let response = OperationResponse::from_result(store.list_saves());
            out.emit(&response, |listing| {
                println!("存档:");
                for name in &listing.normal {
                    let marker = if name == &listing.current { "*" } else { " " };
                    println!("  {} {}", marker, name);
                }
                println!("\n备份:");
                if listing.backups.is_empty() {
                    println!("  (无)");
                }
                for name in &listing.backups {
                    println!("    {}", name);
                }
            })
        }
        SavesCommand::Switch { name } => {
            let response = OperationResponse::from_result(store.switch_save(&name));
            out.emit(&response, print_loaded)
        }
        SavesCommand::Create { name } => {
            let response = OperationResponse::from_result(
                store.create_save(&name).map(|p| p.to_string_lossy().to_string()),
            );
            out.emit(&response, |path| println!("已创建存档: {}", path))
        }
        SavesCommand::Backup { name } => {
            let response = OperationResponse::from_result(
                store
                    .create_backup(name.as_deref())
                    .map(|p| p.to_string_lossy().to_string()),
            );
            out.emit(&response, |path| println!("已创建备份: {}", path))
        }
        SavesCommand::Restore { backup } => {
            let response = OperationResponse::from_result(store.restore_backup(&backup));
            out.emit(&response, print_loaded)
        }
        SavesCommand::Path => {
            let path = store.saves_dir().to_string_lossy().to_string();
            out.emit(&OperationResponse::ok(path), |path| println!("{}", path))
        }
    }
}

fn print_loaded(loaded: &LoadedSave) {
    println!("当前存档: {} ({})", loaded.file_name, loaded.path);
    println!("  分组: {}", loaded.data.section_count());
}

/// 从文件或标准输入读取存档 JSON
fn read_document(source: &str, mut stdin: impl Read) -> Result<SaveFile> {
    let content = if source == "-" {
        let mut buf = String::new();
        stdin.read_to_string(&mut buf).context("读取标准输入失败")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source)).with_context(|| format!("读取文件失败: {}", source))?
    };

    serde_json::from_str(&content).context("存档内容不是有效的 JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::common::utils;

    #[tokio::test]
    async fn save_command_replaces_current_document() {
        let root = std::env::temp_dir().join(format!("rust-keep-save-cmd-{}", utils::generate_id()));
        let mut session = Session::open(&root).unwrap();
        let input = root.join("input.json");
        let document = serde_json::json!({"sections": [{"url": "https://a", "number": 5511999990000_i64}]});
        std::fs::write(&input, document.to_string()).unwrap();

        let ok = execute(
            SavesCommand::Save {
                source: input.to_string_lossy().to_string(),
            },
            &mut session,
            Output { json: true },
        )
        .await
        .unwrap();

        assert!(ok);
        let stored = session.saves.load_current().unwrap().map(SaveFile::into_value);
        assert_eq!(stored, Some(document));
        drop(session);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn dash_reads_the_document_from_stdin() {
        let stdin = std::io::Cursor::new(r#"{"folders":[{"name":"x"}]}"#);

        let data = read_document("-", stdin).unwrap();

        assert_eq!(data.folder_count(), 1);
        assert_eq!(data.section_count(), 0);
    }

    #[test]
    fn invalid_json_is_rejected_before_writing() {
        let stdin = std::io::Cursor::new("{not json");
        assert!(read_document("-", stdin).is_err());
        assert!(read_document("/definitely/missing.json", std::io::empty()).is_err());
    }
}
