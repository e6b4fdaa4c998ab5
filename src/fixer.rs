//! LLM-backed contract fixer.
//!
//! Talks to an Ollama-compatible chat endpoint, asks for a corrected
//! version of the artifact, and cleans the response back into compilable
//! source (fence stripping, SPDX/pragma header repair).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::models::Issue;

/// Configuration for the LLM fixer.
#[derive(Debug, Clone)]
pub struct FixerConfig {
    pub endpoint: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 300,
        }
    }
}

/// Produces a candidate artifact addressing the given issues.
///
/// Implementations must not panic on bad model output; a candidate that
/// cannot be salvaged is returned as-is and rejected by the caller's
/// validation.
#[async_trait]
pub trait Fixer: Send + Sync {
    async fn fix(
        &self,
        artifact: &str,
        issues: &[Issue],
        iteration: usize,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String>;
}

/// Message in the chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Fixer backed by an Ollama-compatible `/api/chat` endpoint.
pub struct LlmFixer {
    config: FixerConfig,
    http_client: reqwest::Client,
}

impl LlmFixer {
    pub fn new(config: FixerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn send_prompt(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.endpoint);

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: FIXER_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to model endpoint at {}", self.config.endpoint)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Model API error {}: {}", status, body));
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse model response")?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl Fixer for LlmFixer {
    async fn fix(
        &self,
        artifact: &str,
        issues: &[Issue],
        iteration: usize,
        metadata: &BTreeMap<String, String>,
    ) -> Result<String> {
        let prompt = build_prompt(artifact, issues, iteration, metadata);
        debug!(prompt_len = prompt.len(), iteration, "sending fix request");

        let raw = self.send_prompt(&prompt).await?;
        let cleaned = clean_code(&raw, artifact);

        info!(
            iteration,
            issues = issues.len(),
            response_len = cleaned.len(),
            "fix candidate received"
        );
        Ok(cleaned)
    }
}

/// Builds the fix prompt: issue listing with locations and remediation
/// hints, the untouched metadata block, then the full source.
fn build_prompt(
    artifact: &str,
    issues: &[Issue],
    iteration: usize,
    metadata: &BTreeMap<String, String>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Fix the security issues in this Solidity contract (attempt {}).\n\n",
        iteration + 1
    ));

    prompt.push_str("## Issues to fix\n\n");
    for (idx, issue) in issues.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {} ({})\n",
            idx + 1,
            issue.severity,
            issue.title,
            issue.tool
        ));
        if issue.line.is_some() {
            let file = issue.source_file.as_deref().unwrap_or("source");
            prompt.push_str(&format!("   Location: {}#{}\n", file, issue.line_range()));
        }
        if let (Some(contract), Some(function)) = (&issue.contract, &issue.function) {
            prompt.push_str(&format!("   In: {}.{}\n", contract, function));
        }
        prompt.push_str(&format!("   {}\n", issue.description.trim()));
        prompt.push_str(&format!("   Recommendation: {}\n\n", issue.recommendation));
    }

    if !metadata.is_empty() {
        prompt.push_str("## Context\n\n");
        for (key, value) in metadata {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
        prompt.push('\n');
    }

    prompt.push_str("## Source\n\n```solidity\n");
    prompt.push_str(artifact);
    prompt.push_str("\n```\n\n");
    prompt.push_str(
        "Output ONLY the complete fixed Solidity source. \
         No explanations, no markdown, no partial snippets.",
    );
    prompt
}

/// Cleans a model response into compilable source.
///
/// Strips markdown fences and leading prose, then reinstates the SPDX
/// and pragma headers from the original when the model dropped them.
pub(crate) fn clean_code(response: &str, original: &str) -> String {
    let mut code = response.trim();

    // Prefer the content of the first fenced block if one is present.
    if let Some(start) = code.find("```") {
        let after_fence = &code[start + 3..];
        // Skip the language tag on the fence line.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        code = match body.find("```") {
            Some(end) => body[..end].trim(),
            None => body.trim(),
        };
    }

    let mut result = code.to_string();

    let has_spdx = result.contains("SPDX-License-Identifier");
    let has_pragma = result.contains("pragma solidity");

    if !has_pragma {
        let pragma = original
            .lines()
            .find(|l| l.trim_start().starts_with("pragma solidity"))
            .unwrap_or("pragma solidity ^0.8.20;");
        result = format!("{}\n{}", pragma.trim(), result);
    }
    if !has_spdx {
        let spdx = original
            .lines()
            .find(|l| l.contains("SPDX-License-Identifier"))
            .unwrap_or("// SPDX-License-Identifier: MIT");
        result = format!("{}\n{}", spdx.trim(), result);
    }

    result
}

const FIXER_SYSTEM_PROMPT: &str = r#"You are an expert Solidity security engineer.
You receive a contract and a list of confirmed security issues.
Rewrite the contract so every listed issue is fixed while preserving all intended behavior.
Output only the complete Solidity source file, nothing else."#;
