//! Management node shell layout.

use std::time::Duration;

use indexmap::IndexMap;

use crate::channel::PromptSet;
use crate::config::NodeConfig;
use crate::error::{ConfigError, Result};

/// A layer of the management node's CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellLevel {
    /// The administrative CLI the login lands in.
    Restricted,
    /// The general-purpose shell reached from it.
    SubShell,
}

/// Prompts and transitions for one shell level.
#[derive(Debug, Clone)]
pub struct LevelDefinition {
    /// Literals that mark this level as ready.
    pub prompts: PromptSet,

    /// Command that enters this level from its parent.
    pub entry_command: Option<String>,

    /// Command that leaves this level back to its parent.
    pub exit_command: Option<String>,
}

/// How the management node's shells look and how long each stage may take.
#[derive(Debug, Clone)]
pub struct NodeProfile {
    levels: IndexMap<ShellLevel, LevelDefinition>,

    /// Ceiling for level changes and short sub-shell commands.
    pub prompt_ceiling: Duration,

    /// Ceiling for the remote tool run.
    pub invoke_ceiling: Duration,
}

impl NodeProfile {
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        if config.restricted_prompts.iter().all(String::is_empty)
            || config.subshell_prompts.iter().all(String::is_empty)
        {
            return Err(ConfigError::Invalid(
                "restricted_prompts and subshell_prompts must each name at least one prompt"
                    .to_string(),
            )
            .into());
        }

        let mut levels = IndexMap::new();
        levels.insert(
            ShellLevel::Restricted,
            LevelDefinition {
                prompts: PromptSet::new(config.restricted_prompts.iter().cloned()),
                entry_command: None,
                exit_command: None,
            },
        );
        levels.insert(
            ShellLevel::SubShell,
            LevelDefinition {
                prompts: PromptSet::new(config.subshell_prompts.iter().cloned()),
                entry_command: Some(config.subshell_command.clone()),
                exit_command: Some(config.exit_command.clone()),
            },
        );

        Ok(Self {
            levels,
            prompt_ceiling: config.prompt_ceiling,
            invoke_ceiling: config.invoke_ceiling,
        })
    }

    pub fn level(&self, level: ShellLevel) -> Option<&LevelDefinition> {
        self.levels.get(&level)
    }

    /// Prompt literals for `level`; empty when the level is not defined.
    pub fn prompts(&self, level: ShellLevel) -> PromptSet {
        self.level(level)
            .map(|l| l.prompts.clone())
            .unwrap_or_else(|| PromptSet::new(Vec::<String>::new()))
    }

    /// Levels in definition order.
    pub fn levels(&self) -> impl Iterator<Item = (&ShellLevel, &LevelDefinition)> {
        self.levels.iter()
    }
}

impl Default for NodeProfile {
    fn default() -> Self {
        let config = NodeConfig::default();
        let mut levels = IndexMap::new();
        levels.insert(
            ShellLevel::Restricted,
            LevelDefinition {
                prompts: PromptSet::new(config.restricted_prompts),
                entry_command: None,
                exit_command: None,
            },
        );
        levels.insert(
            ShellLevel::SubShell,
            LevelDefinition {
                prompts: PromptSet::new(config.subshell_prompts),
                entry_command: Some(config.subshell_command),
                exit_command: Some(config.exit_command),
            },
        );
        Self {
            levels,
            prompt_ceiling: config.prompt_ceiling,
            invoke_ceiling: config.invoke_ceiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vmanage_layout() {
        let profile = NodeProfile::default();
        let order: Vec<_> = profile.levels().map(|(level, _)| *level).collect();
        assert_eq!(order, vec![ShellLevel::Restricted, ShellLevel::SubShell]);

        let sub = profile.level(ShellLevel::SubShell).unwrap();
        assert_eq!(sub.entry_command.as_deref(), Some("vshell"));
        assert_eq!(sub.prompts.literals(), &["vmanage:~$", "vmanage:~#"]);
        assert_eq!(profile.invoke_ceiling, Duration::from_secs(600));
    }

    #[test]
    fn test_from_config_requires_prompts() {
        let config = NodeConfig {
            subshell_prompts: vec![String::new()],
            ..NodeConfig::default()
        };
        assert!(NodeProfile::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_custom_prompts() {
        let config = NodeConfig {
            restricted_prompts: vec!["mgmt#".to_string()],
            subshell_prompts: vec!["bash-5.1$".to_string()],
            subshell_command: "shell".to_string(),
            ..NodeConfig::default()
        };
        let profile = NodeProfile::from_config(&config).unwrap();
        assert_eq!(
            profile.prompts(ShellLevel::Restricted).literals(),
            &["mgmt#"]
        );
        assert_eq!(
            profile
                .level(ShellLevel::SubShell)
                .and_then(|l| l.entry_command.as_deref()),
            Some("shell")
        );
    }
}
