//! 基于外部命令的协作者实现
//!
//! - 检测命令：标准输出最后一行为 JSON 格式的 [`DetectionResult`]
//! - 分析命令：日期 (YYYY-MM-DD) 作为最后一个参数；标准输出可选地给出 JSON
//!   指标对象，输出 `null` 表示该日无数据
//! - 探针命令：退出码 0 表示健康

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::process::{Command as StdCommand, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use orchestrator_core::config::{CommandConfig, ProbeConfig};

use crate::collaborators::{
    AnalysisBackend, AnalysisReport, DetectionBackend, DetectionRequest, DetectionResult,
    HealthProbe, ProbeReport,
};

/// 检测命令读取的环境变量
pub const ENV_USE_AUXILIARY_LIGHT: &str = "ORCHESTRATOR_USE_AUXILIARY_LIGHT";
pub const ENV_PERSIST_RESULTS: &str = "ORCHESTRATOR_PERSIST_RESULTS";
/// 分析命令读取的环境变量
pub const ENV_GENERATE_REPORT: &str = "ORCHESTRATOR_GENERATE_REPORT";

struct CommandOutput {
    stdout: String,
}

async fn run_command(
    program: &str,
    args: &[String],
    env: &[(&str, String)],
) -> anyhow::Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    debug!("执行外部命令: program={}, args={:?}", program, args);
    let output = cmd
        .output()
        .await
        .with_context(|| format!("启动命令 {program} 失败"))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "命令 {} 执行失败，退出码: {:?}: {}",
            program,
            output.status.code(),
            stderr.trim()
        );
    }
    Ok(CommandOutput { stdout })
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

fn last_line(stdout: &str) -> Option<&str> {
    stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// 通过外部命令执行检测
pub struct CommandDetection {
    command: CommandConfig,
}

impl CommandDetection {
    pub fn new(command: CommandConfig) -> Self {
        Self { command }
    }
}

#[async_trait]
impl DetectionBackend for CommandDetection {
    async fn run_detection(&self, request: &DetectionRequest) -> anyhow::Result<DetectionResult> {
        let env = [
            (ENV_USE_AUXILIARY_LIGHT, flag(request.use_auxiliary_light)),
            (ENV_PERSIST_RESULTS, flag(request.persist_results)),
        ];
        let output = run_command(&self.command.program, &self.command.args, &env).await?;
        let line = last_line(&output.stdout)
            .ok_or_else(|| anyhow!("检测命令 {} 没有输出结果", self.command.program))?;
        serde_json::from_str(line).with_context(|| format!("无法解析检测结果: {line}"))
    }
}

/// 通过外部命令执行每日分析
pub struct CommandAnalysis {
    command: CommandConfig,
}

impl CommandAnalysis {
    pub fn new(command: CommandConfig) -> Self {
        Self { command }
    }
}

#[async_trait]
impl AnalysisBackend for CommandAnalysis {
    async fn analyze(
        &self,
        date: NaiveDate,
        generate_report: bool,
    ) -> anyhow::Result<Option<AnalysisReport>> {
        let mut args = self.command.args.clone();
        args.push(date.format("%Y-%m-%d").to_string());
        let env = [(ENV_GENERATE_REPORT, flag(generate_report))];
        let output = run_command(&self.command.program, &args, &env).await?;

        let metrics = match last_line(&output.stdout) {
            None => BTreeMap::new(),
            Some(line) => match serde_json::from_str::<serde_json::Value>(line) {
                Ok(serde_json::Value::Null) => return Ok(None),
                Ok(serde_json::Value::Object(map)) => map
                    .into_iter()
                    .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
                    .collect(),
                _ => BTreeMap::new(),
            },
        };
        info!("分析命令完成: date={}, metrics={}", date, metrics.len());
        Ok(Some(AnalysisReport {
            date,
            metrics,
            report_path: None,
        }))
    }
}

/// 通过外部命令检查子系统
pub struct CommandProbe {
    config: ProbeConfig,
}

impl CommandProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl HealthProbe for CommandProbe {
    fn check_health(&self) -> ProbeReport {
        let output = StdCommand::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .output();
        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = last_line(&stdout)
                    .or_else(|| last_line(&stderr))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("exit code {:?}", output.status.code()));
                if output.status.success() {
                    ProbeReport::healthy(message)
                } else {
                    ProbeReport::unhealthy(message)
                }
            }
            Err(e) => ProbeReport::unhealthy(format!("无法执行探针 {}: {e}", self.config.program)),
        }
    }
}
