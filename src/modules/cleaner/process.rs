use std::time::Duration;

use super::models::StepRecord;
use crate::modules::executor::{CommandRunner, CommandSpec, ExecError};
use crate::modules::scanner::models::TargetKind;

/// taskkill 找不到进程时的退出码
const TASKKILL_NOT_FOUND: i32 = 128;

/// 强制结束进程；成功后等待 `settle` 让系统释放文件句柄
pub async fn kill_process<R: CommandRunner>(
    runner: &R,
    image: &str,
    settle: Duration,
) -> StepRecord {
    let spec = CommandSpec::new("taskkill").args(["/F", "/IM", image]);

    match runner.run(&spec, None).await {
        Ok(_) => {
            tracing::info!("已结束进程: {}", image);
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
            StepRecord::done(TargetKind::Process, image)
        }
        Err(ExecError::NonZeroExit { code, stdout, stderr })
            if code == Some(TASKKILL_NOT_FOUND)
                || stdout.contains("not found")
                || stderr.contains("not found") =>
        {
            tracing::debug!("进程未运行: {}", image);
            StepRecord::not_found(TargetKind::Process, image)
        }
        Err(e) => {
            tracing::warn!("结束进程失败 {}: {}", image, e);
            StepRecord::failed(TargetKind::Process, image, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cleaner::models::StepOutcome;
    use crate::modules::executor::testing::ScriptedRunner;

    #[tokio::test]
    async fn missing_process_is_not_found() {
        let runner = ScriptedRunner::new()
            .on_failure("taskkill", "ERROR: The process \"vendor.exe\" not found.");

        let record = kill_process(&runner, "vendor.exe", Duration::ZERO).await;
        assert_eq!(record.outcome, StepOutcome::NotFound);
    }

    #[tokio::test]
    async fn access_denied_is_failure() {
        let runner = ScriptedRunner::new().on_failure("taskkill", "ERROR: Access is denied.");

        let record = kill_process(&runner, "vendor.exe", Duration::ZERO).await;
        assert!(matches!(record.outcome, StepOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn successful_kill_is_done() {
        let runner = ScriptedRunner::new().on_success("taskkill /F /IM vendor.exe", "SUCCESS");

        let record = kill_process(&runner, "vendor.exe", Duration::ZERO).await;
        assert_eq!(record.outcome, StepOutcome::Done);
        assert!(!record.is_cleanup());
    }
}
