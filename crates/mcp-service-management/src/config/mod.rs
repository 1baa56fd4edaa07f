use crate::registry::ServiceSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default = "builtin_services")]
    pub services: Vec<ServiceConfig>,
}

/// Supervisor-wide options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Working directory and search-path root for every child.
    /// Defaults to the current directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    /// Relative paths are taken from the project root
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Pid file directory; defaults to `<log_dir>/run`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Pause between launching every service and the first probe pass
    #[serde(default = "default_startup_delay", with = "duration_serde")]
    pub startup_delay: Duration,

    #[serde(default = "default_probe_grace", with = "duration_serde")]
    pub probe_grace: Duration,

    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    #[serde(default = "default_probe_host")]
    pub probe_host: String,

    /// Per-service bound on graceful termination before a forced kill
    #[serde(default = "default_graceful_timeout", with = "duration_serde")]
    pub graceful_timeout: Duration,

    /// Module search-path variable handed to children with the project root prepended
    #[serde(default = "default_search_path_var")]
    pub search_path_var: String,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            project_root: None,
            log_dir: default_log_dir(),
            run_dir: None,
            log_level: default_log_level(),
            poll_interval: default_poll_interval(),
            startup_delay: default_startup_delay(),
            probe_grace: default_probe_grace(),
            probe_timeout: default_probe_timeout(),
            probe_host: default_probe_host(),
            graceful_timeout: default_graceful_timeout(),
            search_path_var: default_search_path_var(),
        }
    }
}

/// Individual tool server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub id: String,
    /// Display name; defaults to the id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Script passed as the first argument, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub port: u16,
    /// Environment variable overriding `port`; also exported to the child
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ServiceConfig {
    /// A built-in python tool server definition.
    fn tool(id: &str, name: &str, script: &str, port: u16, port_env: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            executable: default_executable(),
            script: Some(script.to_string()),
            args: Vec::new(),
            port,
            port_env: Some(port_env.to_string()),
            enabled: true,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// The six tool servers of the agent tool suite.
pub fn builtin_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::tool("trade", "TradeTools", "./agent_tools/tool_trade.py", 8002, "TRADE_HTTP_PORT"),
        ServiceConfig::tool("analysis", "StockAnalysis", "./agent_tools/tool_stock_analysis.py", 8004, "ANALYSIS_HTTP_PORT"),
        ServiceConfig::tool("python", "PythonInterpreter", "./agent_tools/tool_python.py", 8005, "PYTHON_HTTP_PORT"),
        ServiceConfig::tool("news", "StockNewsSearch", "./agent_tools/tool_stock_news_search.py", 8006, "NEWS_HTTP_PORT"),
        ServiceConfig::tool("macro", "MacroSummary", "./agent_tools/tool_macro_summary.py", 8007, "MACRO_HTTP_PORT"),
        ServiceConfig::tool("fin_report", "FinancialReportSummary", "./agent_tools/tool_financial_report.py", 8008, "FIN_REPORT_HTTP_PORT"),
    ]
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorOptions::default(),
            services: builtin_services(),
        }
    }
}

impl SupervisorConfig {
    /// Load the configuration file (or the built-in table), apply port
    /// overrides from the process environment, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::parse_file(path)?,
            None => Self::default(),
        };

        config.apply_port_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse_string(&content)
    }

    fn parse_string(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")
    }

    /// Replace each service's port with the value of its `port_env`
    /// variable, when `lookup` yields one.
    fn apply_port_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for service in &mut self.services {
            let Some(ref var) = service.port_env else {
                continue;
            };
            if let Some(raw) = lookup(var) {
                service.port = raw.trim().parse().with_context(|| {
                    format!("Invalid port in {} for service {}: '{}'", var, service.id, raw)
                })?;
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Get enabled services only
    pub fn enabled_services(&self) -> Vec<&ServiceConfig> {
        self.services.iter().filter(|s| s.enabled).collect()
    }

    /// Enabled services as registry candidates, in configuration order.
    pub fn service_specs(&self) -> Vec<ServiceSpec> {
        self.enabled_services().into_iter().map(ServiceSpec::from).collect()
    }

    /// Project root: the CLI override, else the configured root, else the
    /// current directory. Always returned absolute.
    pub fn resolve_project_root(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        let root = match cli_override.or(self.supervisor.project_root.as_deref()) {
            Some(root) => root.to_path_buf(),
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };

        std::fs::canonicalize(&root)
            .with_context(|| format!("Project root does not exist: {}", root.display()))
    }
}

impl SupervisorOptions {
    pub fn log_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.log_dir)
    }

    pub fn run_dir(&self, project_root: &Path) -> PathBuf {
        match self.run_dir {
            Some(ref dir) => project_root.join(dir),
            None => self.log_dir(project_root).join("run"),
        }
    }
}

// Default value functions
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_startup_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_probe_grace() -> Duration {
    Duration::from_millis(1500)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_probe_host() -> String {
    mcp_monitoring::DEFAULT_PROBE_HOST.to_string()
}

fn default_graceful_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_search_path_var() -> String {
    "PYTHONPATH".to_string()
}

fn default_executable() -> String {
    "python3".to_string()
}

fn default_true() -> bool {
    true
}

// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // "ms" before "s", since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
            let secs = mins
                .checked_mul(60)
                .ok_or_else(|| format!("Duration too large: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}
