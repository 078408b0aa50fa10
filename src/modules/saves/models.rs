use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 配置文件名
pub const CONFIG_FILE: &str = "app-config.json";

/// 默认存档名
pub const DEFAULT_SAVE: &str = "contas.json";

/// 存档文件
///
/// 存档内容整体保存为 JSON 值，读写不改动任何键和值；
/// 只有列表展示用到的几个字段提供只读访问。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveFile(Value);

impl SaveFile {
    /// 新存档模板
    pub fn template() -> Self {
        let section = |color: &str| {
            json!({
                "url": "",
                "value": 0,
                "number": "",
                "returnDays": 5,
                "color": color,
                "collapsed": false,
                "dateGroups": [],
            })
        };

        Self(json!({
            "sections": [section("#52525b"), section("#71717a")],
            "folders": [],
            "tabLayout": true,
            "hideReturnsAbove": 1,
            "hideHighlightedAbove": 6,
        }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// 分组数量，缺少 `sections` 或类型不对时为 0
    pub fn section_count(&self) -> usize {
        self.array_len("sections")
    }

    pub fn folder_count(&self) -> usize {
        self.array_len("folders")
    }

    fn array_len(&self, key: &str) -> usize {
        self.0.get(key).and_then(Value::as_array).map_or(0, Vec::len)
    }
}

impl From<Value> for SaveFile {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// 应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_save")]
    pub current_save: String,
}

fn default_save() -> String {
    DEFAULT_SAVE.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            current_save: default_save(),
        }
    }
}

/// 存档列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveListing {
    pub current: String,
    pub normal: Vec<String>,
    pub backups: Vec<String>,
}

/// 切换或恢复后的存档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedSave {
    pub file_name: String,
    pub path: String,
    pub data: SaveFile,
}
