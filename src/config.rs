use crate::error::{GenerateError, Violation, Violations};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Config file used when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Runtime command used when the config does not set `runtime`
pub const DEFAULT_RUNTIME: &str = "docker";

/// Validated generator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where the rendered upstream file is written
    pub output_location: PathBuf,

    /// Items to render, in output order
    pub items: Vec<ItemConfig>,

    /// Runtime command line split into words, e.g. `["sudo", "docker"]`
    pub runtime: Vec<String>,
}

/// One container to resolve into an upstream block
#[derive(Debug, Clone, PartialEq)]
pub struct ItemConfig {
    /// Container name or id as the runtime knows it
    pub container_name: String,

    /// Name of the generated `upstream` block
    pub upstream_name: String,

    /// Port appended to every resolved address
    pub port: u16,

    /// Text appended verbatim after `address:port` on each server line
    pub extra: Option<String>,
}

impl ItemConfig {
    pub fn new(container_name: &str, upstream_name: &str, port: u16) -> Self {
        Self {
            container_name: container_name.to_string(),
            upstream_name: upstream_name.to_string(),
            port,
            extra: None,
        }
    }

    /// Set extra server directives (builder pattern)
    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    fn violations(&self, index: usize) -> Vec<Violation> {
        let mut violations = Vec::new();
        violations.extend(check_non_empty(
            &item_field(index, "containerName"),
            &self.container_name,
        ));
        violations.extend(check_non_empty(
            &item_field(index, "upstreamName"),
            &self.upstream_name,
        ));
        violations.extend(check_port(&item_field(index, "port"), u64::from(self.port)));
        violations
    }
}

/// Config file syntax, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl Config {
    /// Create a config using the default runtime
    pub fn new(output_location: impl Into<PathBuf>, items: Vec<ItemConfig>) -> Self {
        Self {
            output_location: output_location.into(),
            items,
            runtime: vec![DEFAULT_RUNTIME.to_string()],
        }
    }

    /// Set the runtime command line (builder pattern)
    pub fn with_runtime(mut self, runtime: Vec<String>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GenerateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| GenerateError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, ConfigFormat::from_path(path)).map_err(|e| match e {
            GenerateError::ConfigSyntax(message) => GenerateError::ConfigLoad {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate config text
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, GenerateError> {
        let value: Value = match format {
            ConfigFormat::Json => serde_json::from_str::<Value>(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str::<Value>(content).map_err(|e| e.to_string()),
        }
        .map_err(GenerateError::ConfigSyntax)?;

        Self::from_value(&value)
    }

    /// Check the shape of raw config data and build a typed config.
    ///
    /// Every violation is collected before failing, so one run reports all
    /// broken fields at once.
    pub fn from_value(value: &Value) -> Result<Self, GenerateError> {
        let Some(root) = value.as_object() else {
            return Err(GenerateError::ConfigInvalid(Violations(vec![Violation::new(
                "config",
                "must be an object",
            )])));
        };

        let mut violations = Vec::new();

        let output_location = take_string(root, "outputLocation", "outputLocation", &mut violations);

        let runtime = match root.get("runtime") {
            None | Some(Value::Null) => vec![DEFAULT_RUNTIME.to_string()],
            Some(Value::String(command)) => match split_runtime(command) {
                Ok(words) => words,
                Err(violation) => {
                    violations.push(violation);
                    Vec::new()
                }
            },
            Some(_) => {
                violations.push(Violation::new("runtime", "must be a string"));
                Vec::new()
            }
        };

        let mut items = Vec::new();
        match root.get("items") {
            Some(Value::Array(raw_items)) if raw_items.is_empty() => {
                violations.push(Violation::new("items", "no items provided"));
            }
            Some(Value::Array(raw_items)) => {
                for (index, raw) in raw_items.iter().enumerate() {
                    if let Some(item) = parse_item(index, raw, &mut violations) {
                        items.push(item);
                    }
                }
            }
            Some(_) => violations.push(Violation::new("items", "must be an array")),
            None => violations.push(Violation::new("items", "no items provided")),
        }

        if !violations.is_empty() {
            return Err(GenerateError::ConfigInvalid(Violations(violations)));
        }

        Ok(Self {
            output_location: PathBuf::from(output_location.unwrap_or_default()),
            items,
            runtime,
        })
    }

    /// Validate all configuration
    pub fn validate(&self) -> Result<(), GenerateError> {
        let violations = self.violations();
        if !violations.is_empty() {
            return Err(GenerateError::ConfigInvalid(Violations(violations)));
        }
        Ok(())
    }

    pub fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.output_location.as_os_str().is_empty() {
            violations.push(Violation::new("outputLocation", "must be a non-empty string"));
        }
        if self.items.is_empty() {
            violations.push(Violation::new("items", "no items provided"));
        }
        if self.runtime.first().map_or(true, |program| program.is_empty()) {
            violations.push(Violation::new("runtime", "must name a command"));
        }
        for (index, item) in self.items.iter().enumerate() {
            violations.extend(item.violations(index));
        }

        violations
    }

    /// Runtime program, e.g. `docker`
    pub fn runtime_program(&self) -> &str {
        self.runtime.first().map(String::as_str).unwrap_or(DEFAULT_RUNTIME)
    }

    /// Arguments placed before `inspect <container>`
    pub fn runtime_args(&self) -> &[String] {
        self.runtime.get(1..).unwrap_or(&[])
    }
}

/// Config path from command line arguments.
///
/// Arguments are joined with spaces, so unquoted paths containing spaces
/// still work. With no arguments the default `config.json` is used.
pub fn config_path_from_args(args: &[String]) -> PathBuf {
    let provided = args.join(" ");
    let provided = provided.trim();

    if provided.is_empty() {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    } else {
        info!("Using config location provided");
        PathBuf::from(provided)
    }
}

/// Resolve the config path from arguments and make sure the file exists
pub fn locate_config(args: &[String]) -> anyhow::Result<PathBuf> {
    let path = config_path_from_args(args);

    if !path.exists() {
        anyhow::bail!(
            "{} doesn't exist. Create a config with outputLocation and items (see --help)",
            path.display()
        );
    }

    Ok(path)
}

fn item_field(index: usize, name: &str) -> String {
    format!("items[{}].{}", index, name)
}

fn check_non_empty(field: &str, value: &str) -> Option<Violation> {
    if value.is_empty() {
        Some(Violation::new(field, "must be a non-empty string"))
    } else {
        None
    }
}

fn check_port(field: &str, port: u64) -> Option<Violation> {
    if port == 0 || port > u64::from(u16::MAX) {
        Some(Violation::new(field, "must be an integer between 1 and 65535"))
    } else {
        None
    }
}

fn split_runtime(command: &str) -> Result<Vec<String>, Violation> {
    let words = shell_words::split(command)
        .map_err(|e| Violation::new("runtime", format!("cannot be split: {}", e)))?;
    if words.is_empty() {
        return Err(Violation::new("runtime", "must name a command"));
    }
    Ok(words)
}

/// Read a required non-empty string, recording a violation when absent or wrong
fn take_string(
    object: &Map<String, Value>,
    key: &str,
    field: &str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    match object.get(key) {
        Some(Value::String(s)) => match check_non_empty(field, s) {
            Some(violation) => {
                violations.push(violation);
                None
            }
            None => Some(s.clone()),
        },
        _ => {
            violations.push(Violation::new(field, "must be a non-empty string"));
            None
        }
    }
}

fn parse_item(index: usize, raw: &Value, violations: &mut Vec<Violation>) -> Option<ItemConfig> {
    let Some(object) = raw.as_object() else {
        violations.push(Violation::new(format!("items[{}]", index), "must be an object"));
        return None;
    };

    let container_name = take_string(
        object,
        "containerName",
        &item_field(index, "containerName"),
        violations,
    );
    let upstream_name = take_string(
        object,
        "upstreamName",
        &item_field(index, "upstreamName"),
        violations,
    );

    let port_field = item_field(index, "port");
    let port = match object.get("port").and_then(Value::as_u64) {
        Some(port) => match check_port(&port_field, port) {
            Some(violation) => {
                violations.push(violation);
                None
            }
            None => u16::try_from(port).ok(),
        },
        None => {
            violations.push(Violation::new(
                port_field,
                "must be an integer between 1 and 65535",
            ));
            None
        }
    };

    let extra = match object.get("extra") {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(extra)) => Some(Some(extra.clone())),
        Some(_) => {
            violations.push(Violation::new(item_field(index, "extra"), "must be a string"));
            None
        }
    };

    Some(ItemConfig {
        container_name: container_name?,
        upstream_name: upstream_name?,
        port: port?,
        extra: extra?,
    })
}
