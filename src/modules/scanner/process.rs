use regex::Regex;

use crate::modules::executor::{CommandRunner, CommandSpec};

/// 用 `tasklist` 检查进程是否在运行，执行失败视为未运行
pub async fn is_process_running<R: CommandRunner>(runner: &R, image: &str) -> bool {
    let spec = CommandSpec::new("tasklist").args([
        "/FI".to_string(),
        format!("IMAGENAME eq {}", image),
        "/NH".to_string(),
        "/FO".to_string(),
        "CSV".to_string(),
    ]);

    match runner.run(&spec, None).await {
        Ok(output) => tasklist_contains(&output.stdout, image),
        Err(e) => {
            tracing::debug!("tasklist 执行失败 {}: {}", image, e);
            false
        }
    }
}

/// CSV 输出的每行以带引号的映像名开头；没有匹配时输出 `INFO: ...`
pub fn tasklist_contains(stdout: &str, image: &str) -> bool {
    let pattern = format!(r#"(?im)^"{}","#, regex::escape(image));
    Regex::new(&pattern)
        .map(|re| re.is_match(stdout))
        .unwrap_or(false)
}
