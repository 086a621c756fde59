//! Startup configuration.
//!
//! `Settings::resolve` merges, highest precedence first:
//!   CLI flags > K8S_MCP_* env > optional YAML config file > defaults
//!
//! Kubeconfig lookup additionally honours the standard `KUBECONFIG` variable
//! (first entry) before falling back to `$HOME/.kube/config`. The resolved
//! kubeconfig must exist and be readable, otherwise startup fails.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Deserialize;
use shell_words::split as shell_split;

pub const ENV_CONFIG: &str = "K8S_MCP_CONFIG";
pub const ENV_KUBECONFIG: &str = "K8S_MCP_KUBECONFIG";
pub const ENV_CONTEXT: &str = "K8S_MCP_CONTEXT";
pub const ENV_KUBECTL: &str = "K8S_MCP_KUBECTL";
pub const ENV_TIMEOUT: &str = "K8S_MCP_TIMEOUT_SECS";
pub const ENV_STANDARD_KUBECONFIG: &str = "KUBECONFIG";

const DEFAULT_KUBECTL: &str = "kubectl";

/// Startup flags, flattened into the top-level CLI.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// YAML config file (keys: kubectl, kubeconfig, context, timeout_secs). Falls back to K8S_MCP_CONFIG
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Kubeconfig to pass to kubectl. Falls back to K8S_MCP_KUBECONFIG, KUBECONFIG, ~/.kube/config
    #[arg(long = "kubeconfig", value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use. Falls back to K8S_MCP_CONTEXT
    #[arg(long = "context", value_name = "NAME")]
    pub context: Option<String>,

    /// kubectl command line (e.g. "minikube kubectl --"). Falls back to K8S_MCP_KUBECTL
    #[arg(long = "kubectl", value_name = "COMMAND")]
    pub kubectl: Option<String>,

    /// Kill kubectl after this many seconds (0 = no timeout). Falls back to K8S_MCP_TIMEOUT_SECS
    #[arg(long = "timeout-secs", value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

/// On-disk config file shape.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub kubectl: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Program plus leading arguments used to launch kubectl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubectlCommand {
    pub program: String,
    pub prefix_args: Vec<String>,
}

impl KubectlCommand {
    /// Split a command line with shell-word rules.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("kubectl command is empty");
        }
        let mut parts = shell_split(trimmed)
            .with_context(|| format!("Failed to parse kubectl command line: '{trimmed}'"))?;
        if parts.is_empty() || parts[0].is_empty() {
            bail!("Empty program name in kubectl command: '{trimmed}'");
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            prefix_args: parts,
        })
    }
}

impl Default for KubectlCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_KUBECTL.to_string(),
            prefix_args: Vec::new(),
        }
    }
}

/// Resolved, read-only configuration shared by every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub kubectl: KubectlCommand,
    pub kubeconfig: PathBuf,
    pub context: Option<String>,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// Resolve from the process environment.
    pub fn from_env(args: &ConfigArgs) -> Result<Self> {
        Self::resolve(args, |key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Resolve with an injectable environment lookup and home directory.
    pub fn resolve<F>(args: &ConfigArgs, env: F, home: Option<PathBuf>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let file = match args
            .config
            .clone()
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from))
        {
            Some(path) => FileConfig::load(&path)?,
            None => FileConfig::default(),
        };

        let kubectl = match args
            .kubectl
            .clone()
            .or_else(|| env(ENV_KUBECTL))
            .or(file.kubectl)
        {
            Some(raw) => KubectlCommand::parse(&raw)?,
            None => KubectlCommand::default(),
        };

        let kubeconfig = args
            .kubeconfig
            .clone()
            .or_else(|| env(ENV_KUBECONFIG).map(PathBuf::from))
            .or_else(|| {
                env(ENV_STANDARD_KUBECONFIG)
                    .and_then(|list| std::env::split_paths(&list).find(|p| !p.as_os_str().is_empty()))
            })
            .or(file.kubeconfig)
            .or_else(|| home.map(|h| h.join(".kube").join("config")))
            .context("No kubeconfig configured and home directory is unknown")?;
        ensure_readable(&kubeconfig)?;

        let context = args
            .context
            .clone()
            .or_else(|| env(ENV_CONTEXT))
            .or(file.context)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let timeout_secs = match args.timeout_secs {
            Some(s) => Some(s),
            None => match env(ENV_TIMEOUT) {
                Some(raw) => Some(
                    raw.trim()
                        .parse::<u64>()
                        .with_context(|| format!("Invalid {ENV_TIMEOUT} value: '{raw}'"))?,
                ),
                None => file.timeout_secs,
            },
        };
        let timeout = timeout_secs.filter(|s| *s > 0).map(Duration::from_secs);

        Ok(Self {
            kubectl,
            kubeconfig,
            context,
            timeout,
        })
    }

    /// Global flags placed before every kubectl subcommand.
    pub fn global_args(&self) -> Vec<String> {
        let mut args = self.kubectl.prefix_args.clone();
        args.push("--kubeconfig".to_string());
        args.push(self.kubeconfig.to_string_lossy().into_owned());
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args
    }
}

fn ensure_readable(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Kubeconfig not found: {}", path.display()))?;
    if !meta.is_file() {
        bail!("Kubeconfig is not a regular file: {}", path.display());
    }
    std::fs::File::open(path)
        .with_context(|| format!("Kubeconfig not readable: {}", path.display()))?;
    Ok(())
}
