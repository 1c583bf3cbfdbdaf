//! Container inspection through the runtime CLI
//!
//! The generator never talks to the container runtime directly. It goes
//! through [`ContainerInspector`], which the production [`CommandInspector`]
//! implements by running `<runtime> inspect <container>` and which tests
//! replace with canned output.

use indexmap::IndexMap;
use serde::Deserialize;
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Network label the runtime uses for host-networked containers
pub const HOST_NETWORK: &str = "host";

/// Address written for containers on the host network
pub const LOOPBACK_HOST: &str = "localhost";

/// Captured result of one inspection command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl InspectOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can look up a container's runtime metadata
pub trait ContainerInspector {
    /// Run the inspection for `container`.
    ///
    /// An `Err` means the inspection could not be started at all; a command
    /// that ran and failed is reported through [`InspectOutput::code`].
    fn inspect(&self, container: &str) -> impl Future<Output = std::io::Result<InspectOutput>> + Send;

    /// Program name used in diagnostics
    fn program(&self) -> &str;
}

/// Runs the container runtime's `inspect` subcommand as a child process
#[derive(Debug, Clone)]
pub struct CommandInspector {
    program: String,
    args: Vec<String>,
}

impl CommandInspector {
    /// Create an inspector for `program`, with `args` placed before `inspect`
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }
}

impl ContainerInspector for CommandInspector {
    async fn inspect(&self, container: &str) -> std::io::Result<InspectOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("inspect")
            .arg(container)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running: {:?}", cmd);

        let output = cmd.output().await?;

        Ok(InspectOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn program(&self) -> &str {
        &self.program
    }
}

/// One network attachment resolved to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub network: String,
    pub address: String,
}

impl ResolvedEndpoint {
    /// Build an endpoint, substituting the loopback host for the host network
    pub fn new(network: &str, address: &str) -> Self {
        let address = if network == HOST_NETWORK {
            LOOPBACK_HOST
        } else {
            address
        };
        Self {
            network: network.to_string(),
            address: address.to_string(),
        }
    }
}

/// Why inspection output could not be turned into endpoints
#[derive(Debug)]
pub enum ExtractError {
    /// The JSON array had no entries
    Empty,
    /// stdout was not the expected JSON shape
    Malformed(serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerDetails {
    #[serde(default)]
    network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default)]
    networks: Option<IndexMap<String, NetworkAttachment>>,
}

#[derive(Debug, Deserialize)]
struct NetworkAttachment {
    #[serde(rename = "IPAddress", default)]
    ip_address: Option<String>,
}

/// Extract one endpoint per attached network from `inspect` JSON output.
///
/// Only the first array entry is used. Endpoints come back in the order the
/// runtime listed the networks. A container without a `Networks` object has
/// no endpoints.
pub fn extract_endpoints(stdout: &str) -> Result<Vec<ResolvedEndpoint>, ExtractError> {
    let details: Vec<ContainerDetails> =
        serde_json::from_str(stdout).map_err(ExtractError::Malformed)?;

    let first = details.into_iter().next().ok_or(ExtractError::Empty)?;

    let networks = first
        .network_settings
        .and_then(|settings| settings.networks)
        .unwrap_or_default();

    Ok(networks
        .iter()
        .map(|(label, attachment)| {
            ResolvedEndpoint::new(label, attachment.ip_address.as_deref().unwrap_or_default())
        })
        .collect())
}
