//! 会话上下文
//!
//! 启动时创建一次，持有数据目录、存档和更新状态。单实例锁文件在会话
//! 存续期间一直存在，会话销毁时删除；进程异常退出留下的锁在下次启动时接管。

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::modules::common::error::KeepError;
use crate::modules::runner::RunnerDirs;
use crate::modules::saves::{SaveStore, DEFAULT_SAVE};
use crate::modules::updater::{self, UpdateState};

const LOCK_FILE: &str = "rust-keep.lock";

/// 数据目录下的各个子目录
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub saves: PathBuf,
    pub utilities: PathBuf,
    pub profiles: PathBuf,
    pub reports: PathBuf,
    pub updates: PathBuf,
}

impl DataPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            saves: root.join("saves"),
            utilities: root.join("utilities"),
            profiles: root.join("profiles"),
            reports: root.join("reports"),
            updates: root.join("updates"),
        }
    }

    fn create_all(&self) -> Result<(), KeepError> {
        for dir in [
            &self.root,
            &self.saves,
            &self.utilities,
            &self.profiles,
            &self.reports,
            &self.updates,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn runner_dirs(&self) -> RunnerDirs {
        RunnerDirs {
            utilities: self.utilities.clone(),
            reports: self.reports.clone(),
        }
    }
}

/// 默认数据目录；`override_dir` 来自命令行或环境变量
pub fn resolve_data_dir(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rust-keep")
    })
}

/// 单实例锁，销毁时删除锁文件
///
/// 锁文件内容是持有者的 PID。持有者已经退出时视为残留锁，直接接管。
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(dir: &Path) -> Result<Self, KeepError> {
        let path = dir.join(LOCK_FILE);

        match Self::create(&path) {
            Err(KeepError::AlreadyRunning(_)) if !holder_alive(&path) => {
                tracing::warn!("锁文件持有进程已退出，清理残留锁: {}", path.display());
                std::fs::remove_file(&path)?;
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self, KeepError> {
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(KeepError::AlreadyRunning(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

/// 锁文件里记录的进程是否还在运行；内容读不出 PID 时按残留处理
fn holder_alive(path: &Path) -> bool {
    let pid = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok());

    match pid {
        Some(pid) => process_alive(pid),
        None => false,
    }
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, STILL_ACTIVE};
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    // SAFETY: 句柄只在本函数内使用，并在返回前关闭
    unsafe {
        let handle = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(handle) => handle,
            // 进程存在但属于其他用户
            Err(e) => return e.code() == ERROR_ACCESS_DENIED.to_hresult(),
        };

        let mut code = 0u32;
        let alive = GetExitCodeProcess(handle, &mut code).is_ok() && code == STILL_ACTIVE.0 as u32;
        let _ = CloseHandle(handle);
        alive
    }
}

/// 没有 `/proc` 的平台无法判断，按仍在运行处理
#[cfg(not(windows))]
fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.is_dir() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("删除锁文件失败 {}: {}", self.path.display(), e);
        }
    }
}

/// 会话
pub struct Session {
    pub paths: DataPaths,
    pub saves: SaveStore,
    pub update_state: UpdateState,
    _lock: InstanceLock,
}

impl Session {
    /// 创建目录、加锁、迁移旧存档并确保当前存档存在
    pub fn open(root: &Path) -> Result<Self, KeepError> {
        let paths = DataPaths::new(root);
        paths.create_all()?;

        let lock = InstanceLock::acquire(&paths.root)?;

        migrate_legacy_save(&paths)?;

        let saves = SaveStore::open(&paths.saves)?;
        saves.ensure_current()?;

        let pending = updater::load_pending(&paths.updates);
        if let Some(pending) = &pending {
            tracing::info!("有待安装的更新: {}", pending.version);
        }

        tracing::info!("数据目录: {}", paths.root.display());
        Ok(Self {
            update_state: UpdateState::from_pending(pending.as_ref()),
            paths,
            saves,
            _lock: lock,
        })
    }
}

/// 旧版本把存档放在数据根目录，移动到 `saves/`
fn migrate_legacy_save(paths: &DataPaths) -> Result<(), KeepError> {
    let legacy = paths.root.join(DEFAULT_SAVE);
    if !legacy.exists() {
        return Ok(());
    }

    let target = paths.saves.join(DEFAULT_SAVE);
    if target.exists() {
        tracing::warn!("saves/ 中已有 {}，保留旧文件 {}", DEFAULT_SAVE, legacy.display());
        return Ok(());
    }

    std::fs::rename(&legacy, &target)?;
    tracing::info!("已将 {} 迁移到 saves/", DEFAULT_SAVE);
    Ok(())
}
