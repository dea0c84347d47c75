//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::durable::{ContextOptions, RetryPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub durable: DurableSection,
    pub tools: ToolsSection,
    pub server: ServerSection,
    pub log: LogSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：mock / openai / deepseek
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 工作流默认模型
    #[serde(default = "default_model")]
    pub model: String,
    /// 评审、抽取等轻量调用使用的模型
    #[serde(default = "default_small_model")]
    pub small_model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            small_model: default_small_model(),
            base_url: None,
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_small_model() -> String {
    "deepseek-chat".to_string()
}

/// [durable] 段：检查点存储与默认重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct DurableSection {
    /// 存储：memory / file
    #[serde(default = "default_store")]
    pub store: String,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// 等待回调的默认超时（秒）
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
    /// serve 模式下扫描过期回调的间隔（秒）
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for DurableSection {
    fn default() -> Self {
        Self {
            store: default_store(),
            store_dir: default_store_dir(),
            callback_timeout_secs: default_callback_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            retry: RetrySection::default(),
        }
    }
}

impl DurableSection {
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            retry: self.retry.policy(),
            callback_timeout: Some(Duration::from_secs(self.callback_timeout_secs)),
        }
    }
}

fn default_store() -> String {
    "file".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".bee/executions")
}

fn default_callback_timeout_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// [durable.retry] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 同一轮内并发执行的工具上限
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            max_concurrent_tools: default_max_concurrent_tools(),
        }
    }
}

fn default_max_concurrent_tools() -> usize {
    4
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// [log] 段
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 加载配置：config/default.toml（若存在）→ 指定文件 → `BEE__*` 环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.durable.store, "file");
        assert_eq!(cfg.durable.callback_timeout_secs, 604_800);
        assert_eq!(cfg.durable.sweep_interval_secs, 30);
        assert_eq!(cfg.tools.max_concurrent_tools, 4);
        let policy = cfg.durable.retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bee.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\n\n[durable]\nstore = \"memory\"\n\n[durable.retry]\nmax_attempts = 5\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.durable.store, "memory");
        assert_eq!(cfg.durable.retry.max_attempts, 5);
        assert_eq!(cfg.durable.retry.initial_delay_ms, 500);
    }
}
