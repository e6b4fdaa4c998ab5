//! The tool registry: immutable descriptors for the wrapped analysis tools.
//!
//! Descriptors are pure data. They are built once at startup (built-in set
//! plus optional config overrides) and shared read-only across all
//! concurrent workers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a tool delivers its findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// The tool writes a file at `output_path` inside the sandbox.
    File,
    /// Findings are read from the tool's stdout/stderr lines.
    Stream,
}

/// Resource limits applied to one tool invocation.
///
/// The docker backend enforces these on the container; the subprocess
/// backend only enforces the timeout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory cap in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    /// CPU cap (fractional cores).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
}

/// Declarative description of one analysis tool.
///
/// Command templates use the placeholders `{filename}`, `{timeout}`, and
/// `{bindir}`, substituted by the sandbox at invocation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Stable identifier, also the normalizer lookup key.
    pub id: String,
    /// Human-readable name for reports.
    pub display_name: String,
    /// Version the descriptor was written against.
    pub version: String,
    /// Docker image for the container backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Shell command template with placeholders.
    pub command_template: String,
    /// Where findings come from.
    pub output_mode: OutputMode,
    /// Output file path relative to the sandbox working area.
    /// Required when `output_mode` is `File`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Default per-invocation timeout in seconds.
    pub default_timeout_secs: u64,
    /// Resource caps for the invocation.
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl ToolDescriptor {
    /// Default timeout as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Renders the command template for one invocation.
    pub fn render_command(&self, filename: &str, timeout: Duration, bindir: &str) -> String {
        self.command_template
            .replace("{filename}", filename)
            .replace("{timeout}", &timeout.as_secs().to_string())
            .replace("{bindir}", bindir)
    }
}

/// Read-only collection of tool descriptors with a fixed registration order.
///
/// The registration order defines the deterministic ordering of issues in
/// the aggregated result, regardless of worker completion order.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Builds the registry with the built-in descriptor set.
    pub fn builtin() -> Self {
        Self {
            tools: vec![
                slither_descriptor(),
                mythril_descriptor(),
                semgrep_descriptor(),
                solhint_descriptor(),
            ],
        }
    }

    /// Builds a registry from an explicit descriptor list.
    #[allow(dead_code)] // Utility for config-layered registries
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Replaces or appends a descriptor, preserving registration order for
    /// replaced ids.
    #[allow(dead_code)] // Utility for config-layered registries
    pub fn register(&mut self, descriptor: ToolDescriptor) {
        match self.tools.iter().position(|t| t.id == descriptor.id) {
            Some(idx) => self.tools[idx] = descriptor,
            None => self.tools.push(descriptor),
        }
    }

    /// Looks up a descriptor by tool id.
    pub fn get(&self, id: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Registration rank of a tool id, used for deterministic issue ordering.
    pub fn rank(&self, id: &str) -> Option<usize> {
        self.tools.iter().position(|t| t.id == id)
    }

    /// All registered tool ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.id.clone()).collect()
    }

    /// All descriptors in registration order.
    #[allow(dead_code)] // Utility for config-layered registries
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }
}

fn slither_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        id: "slither".to_string(),
        display_name: "Slither".to_string(),
        version: "0.11".to_string(),
        image: Some("trailofbits/eth-security-toolbox:latest".to_string()),
        command_template: "slither '{filename}' --json output.json".to_string(),
        output_mode: OutputMode::File,
        output_path: Some("output.json".to_string()),
        default_timeout_secs: 120,
        limits: ResourceLimits {
            memory_mb: Some(2048),
            cpus: Some(1.0),
        },
    }
}

fn mythril_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        id: "mythril".to_string(),
        display_name: "Mythril".to_string(),
        version: "0.24".to_string(),
        image: Some("mythril/myth:latest".to_string()),
        command_template: "myth analyze '{filename}' -o json --execution-timeout {timeout}"
            .to_string(),
        output_mode: OutputMode::Stream,
        output_path: None,
        default_timeout_secs: 300,
        limits: ResourceLimits {
            memory_mb: Some(4096),
            cpus: Some(2.0),
        },
    }
}

fn semgrep_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        id: "semgrep".to_string(),
        display_name: "Semgrep".to_string(),
        version: "1.131".to_string(),
        image: Some("semgrep/semgrep:latest".to_string()),
        command_template: "semgrep --config p/smart-contracts --json '{filename}'".to_string(),
        output_mode: OutputMode::Stream,
        output_path: None,
        default_timeout_secs: 120,
        limits: ResourceLimits {
            memory_mb: Some(2048),
            cpus: Some(1.0),
        },
    }
}

fn solhint_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        id: "solhint".to_string(),
        display_name: "Solhint".to_string(),
        version: "6.0".to_string(),
        image: Some("node:20-alpine".to_string()),
        command_template: "solhint -f unix '{filename}'".to_string(),
        output_mode: OutputMode::Stream,
        output_path: None,
        default_timeout_secs: 60,
        limits: ResourceLimits {
            memory_mb: Some(1024),
            cpus: Some(1.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registration_order() {
        let registry = ToolRegistry::builtin();
        assert_eq!(registry.ids(), vec!["slither", "mythril", "semgrep", "solhint"]);
        assert_eq!(registry.rank("slither"), Some(0));
        assert_eq!(registry.rank("solhint"), Some(3));
        assert_eq!(registry.rank("oyente"), None);
    }

    #[test]
    fn test_render_command() {
        let registry = ToolRegistry::builtin();
        let mythril = registry.get("mythril").unwrap();
        let cmd = mythril.render_command("contract.sol", Duration::from_secs(90), "/sb/bin");
        assert_eq!(cmd, "myth analyze 'contract.sol' -o json --execution-timeout 90");
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = ToolRegistry::builtin();
        let mut custom = slither_descriptor();
        custom.default_timeout_secs = 10;
        registry.register(custom);
        // Replacement keeps the original registration rank.
        assert_eq!(registry.rank("slither"), Some(0));
        assert_eq!(registry.get("slither").unwrap().default_timeout_secs, 10);
    }

    #[test]
    fn test_file_mode_has_output_path() {
        let registry = ToolRegistry::builtin();
        for tool in registry.descriptors() {
            if tool.output_mode == OutputMode::File {
                assert!(tool.output_path.is_some(), "{} needs an output path", tool.id);
            }
        }
    }
}
