//! 通过 `reg query` 读取注册表值
//!
//! `reg` 在键或值不存在时返回非零退出码并输出 `ERROR:`，这里把它当作"不存在"。

use regex::Regex;
use std::sync::OnceLock;

use super::models::RegData;
use crate::modules::common::error::KeepError;
use crate::modules::executor::{CommandRunner, CommandSpec, ExecError};

fn value_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s+(?P<name>.+?)\s{4}(?P<kind>REG_[A-Z_]+)(?:\s{4}(?P<data>.*))?$")
            .expect("valid reg query pattern")
    })
}

/// 从 `reg query <key> /v <name>` 的输出中提取值
///
/// 无法原样写回的类型返回错误，不会被当作字符串备份。
pub fn parse_value(stdout: &str, name: &str) -> Result<Option<RegData>, KeepError> {
    let Some(caps) = stdout.lines().find_map(|line| {
        let caps = value_line_pattern().captures(line.trim_end())?;
        caps["name"].eq_ignore_ascii_case(name).then_some(caps)
    }) else {
        return Ok(None);
    };

    let kind = &caps["kind"];
    let data = caps.name("data").map(|m| m.as_str()).unwrap_or("");
    let invalid = || KeepError::Registry(format!("无法解析 {} 类型的值 {}: {}", kind, name, data));

    let value = match kind {
        "REG_SZ" => RegData::String(data.to_string()),
        "REG_EXPAND_SZ" => RegData::ExpandString(data.to_string()),
        "REG_MULTI_SZ" if data.is_empty() => RegData::MultiString(Vec::new()),
        "REG_MULTI_SZ" => RegData::MultiString(data.split("\\0").map(str::to_string).collect()),
        "REG_DWORD" => {
            let hex = data.trim().trim_start_matches("0x");
            RegData::Dword(u32::from_str_radix(hex, 16).map_err(|_| invalid())?)
        }
        "REG_QWORD" => {
            let hex = data.trim().trim_start_matches("0x");
            RegData::Qword(u64::from_str_radix(hex, 16).map_err(|_| invalid())?)
        }
        "REG_BINARY" => RegData::Binary(parse_hex(data.trim()).ok_or_else(invalid)?),
        other => {
            return Err(KeepError::Registry(format!(
                "不支持备份的值类型 {}: {}",
                other, name
            )))
        }
    };

    Ok(Some(value))
}

fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// 执行 `reg query` 并解析值，键或值不存在时返回 `None`
pub async fn query_value<R: CommandRunner>(
    runner: &R,
    key: &str,
    name: &str,
) -> Result<Option<RegData>, KeepError> {
    let spec = CommandSpec::new("reg").args(["query", key, "/v", name]);

    match runner.run(&spec, None).await {
        Ok(output) => parse_value(&output.stdout, name),
        Err(e @ ExecError::NonZeroExit { .. }) if e.output_contains("ERROR:") => {
            tracing::debug!("注册表值不存在: {}\\{}", key, name);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
