use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// 规范化注册表路径：统一斜杠、去掉重复分隔符和末尾分隔符
pub fn normalize_registry_path(path: &str) -> String {
    let path = path.trim().replace('/', "\\");
    let mut normalized = String::with_capacity(path.len());
    let mut last_was_sep = false;

    for c in path.chars() {
        if c == '\\' {
            if !last_was_sep {
                normalized.push(c);
            }
            last_was_sep = true;
        } else {
            normalized.push(c);
            last_was_sep = false;
        }
    }

    normalized.trim_end_matches('\\').to_string()
}

/// 计算目录大小
pub fn calculate_dir_size(path: &Path) -> std::io::Result<u64> {
    if path.is_file() {
        return path.metadata().map(|m| m.len());
    }

    let size = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();

    Ok(size)
}

/// 格式化文件大小
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%([A-Za-z0-9_()]+)%").expect("valid env var pattern"))
}

/// 展开 `%APPDATA%` 形式的环境变量，未定义的变量保持原样
pub fn expand_env_vars(input: &str) -> String {
    env_var_pattern()
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// 路径中是否还残留未展开的变量
pub fn has_unexpanded_vars(input: &str) -> bool {
    env_var_pattern().is_match(input)
}

/// 获取模糊匹配分数
pub fn fuzzy_score(text: &str, pattern: &str) -> Option<i64> {
    let matcher = SkimMatcherV2::default().ignore_case();
    matcher.fuzzy_match(text, pattern)
}

/// PowerShell 单引号字符串转义
pub fn ps_quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// 生成唯一 ID
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_registry_path_collapses_separators() {
        assert_eq!(
            normalize_registry_path(r"HKCU\\Software//Vendor\"),
            r"HKCU\Software\Vendor"
        );
    }

    #[test]
    fn expand_env_vars_replaces_known_and_keeps_unknown() {
        std::env::set_var("RUST_KEEP_UTILS_TEST_VAR", r"C:\Data");
        assert_eq!(
            expand_env_vars(r"%RUST_KEEP_UTILS_TEST_VAR%\Vendor"),
            r"C:\Data\Vendor"
        );
        assert_eq!(
            expand_env_vars(r"%RUST_KEEP_SURELY_UNDEFINED%\x"),
            r"%RUST_KEEP_SURELY_UNDEFINED%\x"
        );
        assert!(has_unexpanded_vars(r"%RUST_KEEP_SURELY_UNDEFINED%\x"));
    }

    #[test]
    fn format_size_uses_binary_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn calculate_dir_size_sums_nested_files() {
        let root = std::env::temp_dir().join(format!("rust-keep-size-{}", generate_id()));
        assert!(std::fs::create_dir_all(root.join("nested")).is_ok());
        assert!(std::fs::write(root.join("a.bin"), [0u8; 10]).is_ok());
        assert!(std::fs::write(root.join("nested").join("b.bin"), [0u8; 5]).is_ok());

        assert_eq!(calculate_dir_size(&root).ok(), Some(15));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fuzzy_score_ignores_case() {
        assert!(fuzzy_score("Contas_Principal.json", "principal").is_some());
        assert!(fuzzy_score("contas.json", "zzz").is_none());
    }
}
