//! 存档管理
//!
//! 存档都是 `saves/` 下的 JSON 文件，备份在 `saves/backups/`，
//! 当前存档名记录在 `saves/app-config.json`。

pub mod models;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::modules::common::error::KeepError;
use crate::modules::common::utils;
pub use models::{AppConfig, LoadedSave, SaveFile, SaveListing, CONFIG_FILE, DEFAULT_SAVE};

/// 存档目录和当前存档
#[derive(Debug, Clone)]
pub struct SaveStore {
    saves_dir: PathBuf,
    backups_dir: PathBuf,
    current: String,
}

impl SaveStore {
    /// 打开存档目录并读取配置；配置缺失或损坏时使用默认存档名
    pub fn open(saves_dir: &Path) -> Result<Self, KeepError> {
        let backups_dir = saves_dir.join("backups");
        std::fs::create_dir_all(&backups_dir)?;

        let config = load_config(&saves_dir.join(CONFIG_FILE));
        Ok(Self {
            saves_dir: saves_dir.to_path_buf(),
            backups_dir,
            current: config.current_save,
        })
    }

    pub fn saves_dir(&self) -> &Path {
        &self.saves_dir
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.saves_dir.join(CONFIG_FILE)
    }

    pub fn current_name(&self) -> &str {
        &self.current
    }

    pub fn current_path(&self) -> PathBuf {
        self.saves_dir.join(&self.current)
    }

    /// 当前存档不存在时用模板创建
    pub fn ensure_current(&self) -> Result<bool, KeepError> {
        let path = self.current_path();
        if path.exists() {
            return Ok(false);
        }

        write_save(&path, &SaveFile::template())?;
        tracing::info!("已自动创建存档: {}", path.display());
        Ok(true)
    }

    /// 读取当前存档；文件不存在时返回 `None`
    pub fn load_current(&self) -> Result<Option<SaveFile>, KeepError> {
        let path = self.current_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 整体覆盖当前存档
    pub fn save_current(&self, data: &SaveFile) -> Result<PathBuf, KeepError> {
        let path = self.current_path();
        write_save(&path, data)?;
        tracing::debug!("已保存: {}", path.display());
        Ok(path)
    }

    pub fn list_saves(&self) -> Result<SaveListing, KeepError> {
        let normal = json_files(&self.saves_dir)?
            .into_iter()
            .filter(|name| name != CONFIG_FILE)
            .collect();
        let backups = json_files(&self.backups_dir)?;

        Ok(SaveListing {
            current: self.current.clone(),
            normal,
            backups,
        })
    }

    /// 切换存档，名称可以是完整文件名，也可以是模糊匹配的片段
    pub fn switch_save(&mut self, query: &str) -> Result<LoadedSave, KeepError> {
        let file_name = self.resolve_save_name(query)?;
        let path = self.saves_dir.join(&file_name);
        let data = read_save(&path)?;

        self.set_current(&file_name)?;
        tracing::info!("已切换到存档: {}", file_name);

        Ok(LoadedSave {
            file_name,
            path: path.to_string_lossy().to_string(),
            data,
        })
    }

    /// 用模板创建新存档，不覆盖已有文件
    pub fn create_save(&self, name: &str) -> Result<PathBuf, KeepError> {
        let file_name = normalize_file_name(name)?;
        let path = self.saves_dir.join(&file_name);
        if path.exists() {
            return Err(KeepError::Other(format!("存档已存在: {}", file_name)));
        }

        write_save(&path, &SaveFile::template())?;
        tracing::info!("已创建存档: {}", path.display());
        Ok(path)
    }

    /// 把当前存档写入备份目录
    pub fn create_backup(&self, name: Option<&str>) -> Result<PathBuf, KeepError> {
        let data = self
            .load_current()?
            .ok_or_else(|| KeepError::NotFound(format!("当前存档 {}", self.current)))?;

        let file_name = match name {
            Some(name) => normalize_file_name(name)?,
            None => default_backup_name(Local::now().naive_local()),
        };
        let path = self.backups_dir.join(&file_name);

        write_save(&path, &data)?;
        tracing::info!("已创建备份: {}", path.display());
        Ok(path)
    }

    /// 把备份原样复制为新存档并切换过去
    pub fn restore_backup(&mut self, backup_name: &str) -> Result<LoadedSave, KeepError> {
        let backup_name = normalize_file_name(backup_name)?;
        let source = self.backups_dir.join(&backup_name);
        if !source.exists() {
            return Err(KeepError::NotFound(format!("备份 {}", backup_name)));
        }

        let file_name = restore_file_name(&backup_name, Local::now().date_naive());
        let target = self.saves_dir.join(&file_name);
        std::fs::copy(&source, &target)?;

        self.set_current(&file_name)?;
        tracing::info!("已从备份 {} 恢复为 {}", backup_name, file_name);

        // 内容只用于返回展示，文件本身已按原样复制
        let data = read_save(&target)?;

        Ok(LoadedSave {
            file_name,
            path: target.to_string_lossy().to_string(),
            data,
        })
    }

    fn set_current(&mut self, file_name: &str) -> Result<(), KeepError> {
        let config = AppConfig {
            current_save: file_name.to_string(),
        };
        std::fs::write(self.config_path(), serde_json::to_string_pretty(&config)?)?;
        self.current = file_name.to_string();
        Ok(())
    }

    fn resolve_save_name(&self, query: &str) -> Result<String, KeepError> {
        let candidates: Vec<String> = json_files(&self.saves_dir)?
            .into_iter()
            .filter(|name| name != CONFIG_FILE)
            .collect();

        if let Ok(exact) = normalize_file_name(query) {
            if candidates.iter().any(|c| c == &exact) {
                return Ok(exact);
            }
        }

        candidates
            .into_iter()
            .filter_map(|name| utils::fuzzy_score(&name, query).map(|score| (score, name)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, name)| name)
            .ok_or_else(|| KeepError::NotFound(format!("存档 {}", query)))
    }
}

fn load_config(path: &Path) -> AppConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

fn read_save(path: &Path) -> Result<SaveFile, KeepError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_save(path: &Path, data: &SaveFile) -> Result<(), KeepError> {
    std::fs::write(path, serde_json::to_string_pretty(data)?)?;
    Ok(())
}

/// 目录下的 `.json` 文件名，按名称排序
fn json_files(dir: &Path) -> Result<Vec<String>, KeepError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .flatten()
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.ends_with(".json"))
        .collect();
    names.sort();
    Ok(names)
}

/// 校验文件名并补全 `.json` 扩展名
pub fn normalize_file_name(name: &str) -> Result<String, KeepError> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\', ':']) || name.starts_with('.') {
        return Err(KeepError::Other(format!("无效的存档名称: {}", name)));
    }

    if name.ends_with(".json") {
        Ok(name.to_string())
    } else {
        Ok(format!("{}.json", name))
    }
}

/// 默认备份名 `backup_<MM>_<DD>_<YYYY>_<HHMMSS>.json`
pub fn default_backup_name(now: NaiveDateTime) -> String {
    now.format("backup_%m_%d_%Y_%H%M%S.json").to_string()
}

fn timestamp_backup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^backup_\d+_\d+_\d+_\d+$").expect("valid backup pattern"))
}

/// 恢复后的存档名 `<base>_<MM>_<DD>_<YYYY>.json`，纯时间戳的备份名基名为 `backup`
pub fn restore_file_name(backup_name: &str, today: NaiveDate) -> String {
    let stem = backup_name.strip_suffix(".json").unwrap_or(backup_name);
    let base = if timestamp_backup_pattern().is_match(stem) {
        "backup"
    } else {
        stem
    };

    format!(
        "{}_{:02}_{:02}_{}.json",
        base,
        today.month(),
        today.day(),
        today.year()
    )
}
