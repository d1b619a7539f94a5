// src/tunable.rs

//! Editing the single tunable in a node's runtime configuration file.
//!
//! The file is line-oriented `KEY=value` text. Only the tunable's own line
//! is ever touched:
//! 1. active `KEY=...` lines get the new value;
//! 2. otherwise the first commented `# KEY=...` placeholder is replaced;
//! 3. otherwise `KEY=value` is appended.
//!
//! The managed process reads this file only at start, so an edit has no
//! effect on a container that is already running.

use regex::Regex;
use tracing::{debug, info};

use crate::errors::{FleetError, Result};
use crate::fleet::Node;
use crate::process::docker;
use crate::remote::RemoteGateway;
use crate::remote::gateway::command_failure;

/// Compiled matcher for one tunable key.
#[derive(Debug, Clone)]
pub struct TunableEditor {
    key: String,
    active: Regex,
    commented: Regex,
}

impl TunableEditor {
    pub fn new(key: &str) -> Result<Self> {
        validate_key(key)?;
        let escaped = regex::escape(key);
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| {
                FleetError::ConfigError(format!("tunable key '{key}' does not form a pattern: {e}"))
            })
        };
        Ok(Self {
            key: key.to_string(),
            active: compile(format!(r"^\s*{escaped}\s*="))?,
            commented: compile(format!(r"^\s*#\s*{escaped}\s*="))?,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Apply the update-in-place rule to `contents`.
    ///
    /// Every line keeps its own terminator, so `\r\n` files stay `\r\n`.
    /// An appended line uses the file's first terminator.
    pub fn apply(&self, contents: &str, value: &str) -> String {
        let new_line = format!("{}={}", self.key, value);
        let mut lines: Vec<(String, &str)> = contents
            .split_inclusive('\n')
            .map(|raw| {
                let body = raw
                    .strip_suffix('\n')
                    .map_or(raw, |b| b.strip_suffix('\r').unwrap_or(b));
                (body.to_string(), &raw[body.len()..])
            })
            .collect();

        if lines.iter().any(|(body, _)| self.active.is_match(body)) {
            for (body, _) in lines.iter_mut().filter(|(b, _)| self.active.is_match(b)) {
                *body = new_line.clone();
            }
        } else if let Some((body, _)) = lines.iter_mut().find(|(b, _)| self.commented.is_match(b)) {
            *body = new_line;
        } else {
            let eol = lines
                .first()
                .map(|(_, eol)| *eol)
                .filter(|eol| !eol.is_empty())
                .unwrap_or("\n");
            // No trailing newline: separate, and keep it that way.
            let unterminated = lines.last().is_some_and(|(_, eol)| eol.is_empty());
            if let Some((_, last)) = lines.last_mut().filter(|_| unterminated) {
                *last = eol;
            }
            lines.push((new_line, if unterminated { "" } else { eol }));
        }

        let mut out = String::with_capacity(contents.len() + self.key.len() + value.len() + 2);
        for (body, eol) in &lines {
            out.push_str(body);
            out.push_str(eol);
        }
        out
    }

    /// The active value of the key in `contents`, if any.
    pub fn read(&self, contents: &str) -> Option<String> {
        contents
            .lines()
            .find(|l| self.active.is_match(l))
            .and_then(|l| l.split_once('='))
            .map(|(_, v)| v.trim().to_string())
    }
}

/// Set the tunable in `node`'s runtime configuration file.
///
/// Returns whether the file changed. An unchanged file is not rewritten.
pub async fn set_on_node(
    gateway: &RemoteGateway,
    node: &Node,
    editor: &TunableEditor,
    value: &str,
) -> Result<bool> {
    let key = editor.key();
    let path = node.runtime_config.as_str();

    let read = docker::read_file(path);
    let out = gateway.execute(node, &read).await?;
    if !out.success() {
        return Err(command_failure(node, &read.to_shell_line(), &out));
    }

    // stdout only: whatever the transport prints on stderr is not file content.
    let updated = editor.apply(&out.stdout, value);
    if updated == out.stdout {
        debug!(node = %node.id, path, key, value, "tunable already set");
        return Ok(false);
    }

    gateway
        .execute_checked(node, &docker::write_file(path, &updated))
        .await?;
    info!(node = %node.id, path, key, value, "tunable updated");
    Ok(true)
}

/// Reject keys that cannot be matched as a `KEY=` line.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.contains('=')
        || key.starts_with('#')
        || key.chars().any(char::is_whitespace)
    {
        return Err(FleetError::ConfigError(format!(
            "invalid tunable key '{key}': must be non-empty without '=', '#' prefix or whitespace"
        )));
    }
    Ok(())
}
