use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeepError {
    #[error("注册表错误: {0}")]
    Registry(String),

    #[error("文件系统错误: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("命令执行失败: {0}")]
    Command(String),

    #[error("权限不足: {0}")]
    PermissionDenied(String),

    #[error("关键系统项: {0}")]
    CriticalSystemItem(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("清理配置无效: {0}")]
    Profile(String),

    #[error("更新检查失败: {0}")]
    Update(String),

    #[error("程序已在运行: {0}")]
    AlreadyRunning(String),

    #[error("其他错误: {0}")]
    Other(String),

    #[error("超时: {0}")]
    Timeout(String),

    #[error("序列化错误: {0}")]
    Serde(String),
}

impl From<serde_json::Error> for KeepError {
    fn from(error: serde_json::Error) -> Self {
        KeepError::Serde(error.to_string())
    }
}

impl serde::Serialize for KeepError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
