use serde::{Deserialize, Serialize};

use super::error::KeepError;

/// 统一的操作返回结构
///
/// `error` 只用于整体失败，`warning` 用于部分成功。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> OperationResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            warning: None,
            message: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            warning: None,
            message: None,
        }
    }

    /// 部分成功：仍然报告成功，附带警告
    pub fn partial(data: T, warning: impl Into<String>) -> Self {
        Self {
            warning: Some(warning.into()),
            ..Self::ok(data)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    /// 顶层操作的最外层捕获：把未处理的错误转换为失败结构
    pub fn from_result(result: Result<T, KeepError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                tracing::error!("操作失败: {}", e);
                Self::failure(e.to_string())
            }
        }
    }
}
