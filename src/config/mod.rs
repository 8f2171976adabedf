use crate::executor::{Interpreter, ScriptDialect};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_PORT: u16 = 6702;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub script_timeout_ms: u64,
    pub interpreter: Interpreter,
}

impl Default for Config {
    fn default() -> Self {
        let database_url = crate::paths::data_dir()
            .map(|dir| format!("sqlite:{}", dir.join("script_desk.db").display()))
            .unwrap_or_else(|_| "sqlite:script_desk.db".to_string());
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            interpreter: Interpreter::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = Self::from_conf_file()? {
            config.apply_file(file_config);
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.normalize_database_url()?;
        Ok(config)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }

    fn from_conf_file() -> Result<Option<FileConfig>> {
        let path = crate::paths::conf_dir()?.join("config.json");
        Self::read_conf_file(&path)
    }

    fn read_conf_file(path: &Path) -> Result<Option<FileConfig>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(file_config))
    }

    fn apply_file(&mut self, file_config: FileConfig) {
        if let Some(database_url) = file_config.database_url {
            self.database_url = database_url;
        }
        if let Some(host) = file_config.host {
            self.host = host;
        }
        if let Some(port) = file_config.port {
            self.port = port;
        }
        if let Some(timeout_ms) = file_config.script_timeout_ms {
            self.script_timeout_ms = timeout_ms;
        }
        if let Some(interpreter) = file_config.interpreter {
            if let Some(dialect) = interpreter.dialect {
                self.interpreter = Interpreter::for_dialect(dialect);
            }
            if let Some(program) = interpreter.program {
                self.interpreter.program = program;
            }
            if let Some(args) = interpreter.args {
                self.interpreter.args = args;
            }
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(db_url) = lookup("DATABASE_URL") {
            self.database_url = db_url;
        }

        if let Some(host) = lookup("HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }

        if let Some(timeout) = lookup("SCRIPT_TIMEOUT_MS") {
            self.script_timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid SCRIPT_TIMEOUT_MS value '{}'", timeout))?;
        }

        if let Some(dialect) = lookup("SCRIPT_DIALECT") {
            let dialect: ScriptDialect = dialect.parse()?;
            self.interpreter = Interpreter::for_dialect(dialect);
        }

        if let Some(program) = lookup("SCRIPT_INTERPRETER") {
            if program.trim().is_empty() {
                anyhow::bail!("SCRIPT_INTERPRETER cannot be empty");
            }
            self.interpreter.program = program;
        }

        Ok(())
    }

    fn normalize_database_url(&mut self) -> Result<()> {
        let Some(path_str) = self.database_url.strip_prefix("sqlite:") else {
            return Ok(());
        };
        if path_str.starts_with(":memory:") {
            return Ok(());
        }

        let path = Path::new(path_str);
        let root = crate::paths::install_root()?;

        if path.is_absolute() {
            if !path.starts_with(&root) {
                anyhow::bail!(
                    "SQLite database path must be under install root: {}",
                    root.display()
                );
            }
            return Ok(());
        }

        if path
            .components()
            .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            anyhow::bail!("SQLite database path cannot contain '..'");
        }

        let absolute = root.join(path);
        self.database_url = format!("sqlite:{}", absolute.display());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    script_timeout_ms: Option<u64>,
    interpreter: Option<FileInterpreterConfig>,
}

#[derive(Debug, Deserialize)]
struct FileInterpreterConfig {
    program: Option<String>,
    args: Option<Vec<String>>,
    dialect: Option<ScriptDialect>,
}
