// file: src/steps/shell.rs
// version: 1.0.0
// guid: e5c1a8f4-2d79-4b36-9f0e-6a4b7d2c8e15

//! 03-shell: shell tooling and dotfiles for the primary user

use super::{ProvisionStep, StepContext};
use anyhow::Result;

pub struct ShellStep;

const BASH_ALIASES: &str = r#"# Managed by server-setup
alias ll='ls -alF'
alias la='ls -A'
alias l='ls -CF'
alias ..='cd ..'
alias ...='cd ../..'
alias gs='git status'
alias gd='git diff'
alias gl='git log --oneline --graph --decorate -20'
alias ports='ss -tulpn'
alias logs='sudo journalctl -f'
alias status='/usr/local/bin/system-status.sh'

export HISTSIZE=10000
export HISTFILESIZE=20000
export HISTCONTROL=ignoreboth:erasedups
export EDITOR=vim
"#;

const TMUX_CONF: &str = r#"# Managed by server-setup
set -g mouse on
set -g history-limit 50000
set -g base-index 1
setw -g pane-base-index 1
set -g status-interval 5
bind r source-file ~/.tmux.conf \; display "reloaded"
"#;

#[async_trait::async_trait]
impl ProvisionStep for ShellStep {
    fn name(&self) -> &'static str {
        "03-shell"
    }

    fn description(&self) -> &'static str {
        "Install shell tools and write aliases and tmux configuration"
    }

    fn provided_commands(&self) -> &'static [&'static str] {
        &["zsh", "tmux", "htop"]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.apt_install(&ctx.settings.packages.shell).await?;

        let home = ctx.home();
        ctx.write_user_file(&home.join(".bash_aliases"), BASH_ALIASES, 0o644)
            .await?;
        ctx.write_user_file(&home.join(".tmux.conf"), TMUX_CONF, 0o644)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::steps::test_support::context;
    use crate::utils::command::RecordingRunner;

    #[tokio::test]
    async fn test_writes_dotfiles_owned_by_user() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::with_system_root(root.path());
        let runner = RecordingRunner::new();

        ShellStep
            .run(&context(&settings, &runner, &[]))
            .await
            .unwrap();

        let aliases = std::fs::read_to_string(root.path().join("home/ubuntu/.bash_aliases")).unwrap();
        assert!(aliases.contains("alias ll='ls -alF'"));
        assert!(root.path().join("home/ubuntu/.tmux.conf").exists());
        assert_eq!(runner.count_matching("chown ubuntu:ubuntu"), 2);
        assert_eq!(runner.count_matching("install -y --no-install-recommends zsh"), 1);
    }
}
