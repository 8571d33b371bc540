//! Shell-specific environment scripts.
//!
//! A credential bundle carries one environment script per supported shell.
//! `carina env` picks the script for the user's shell and prints the command
//! that loads it.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;

/// Shells for which a credential bundle carries an environment script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// POSIX shells (bash, zsh, sh).
    #[default]
    Bash,
    /// The fish shell.
    Fish,
    /// Windows `PowerShell`.
    Powershell,
    /// The Windows command prompt.
    Cmd,
}

impl Shell {
    /// Detect the shell from the value of `SHELL`, defaulting to bash.
    #[must_use]
    pub fn detect(shell_var: Option<&str>) -> Self {
        let Some(path) = shell_var.filter(|s| !s.is_empty()) else {
            return Self::Bash;
        };
        let name = Utf8Path::new(path)
            .file_stem()
            .unwrap_or(path)
            .to_ascii_lowercase();
        match name.as_str() {
            "fish" => Self::Fish,
            "powershell" | "pwsh" => Self::Powershell,
            "cmd" => Self::Cmd,
            _ => Self::Bash,
        }
    }

    /// Name of the script inside the bundle directory.
    #[must_use]
    pub const fn script_name(self) -> &'static str {
        match self {
            Self::Bash => "docker.env",
            Self::Fish => "docker.fish",
            Self::Powershell => "docker.ps1",
            Self::Cmd => "docker.cmd",
        }
    }

    /// Render the script that points Docker at `docker_host` using the TLS
    /// material stored next to the script.
    #[must_use]
    pub fn env_script(self, docker_host: &str) -> String {
        match self {
            Self::Bash => format!(
                "export DOCKER_HOST={docker_host}\n\
                 export DOCKER_TLS_VERIFY=1\n\
                 export DOCKER_CERT_PATH=\"$(cd \"$(dirname \"${{BASH_SOURCE[0]}}\")\" && pwd)\"\n"
            ),
            Self::Fish => format!(
                "set -x DOCKER_HOST {docker_host}\n\
                 set -x DOCKER_TLS_VERIFY 1\n\
                 set -x DOCKER_CERT_PATH (dirname (status -f))\n"
            ),
            Self::Powershell => format!(
                "$env:DOCKER_HOST=\"{docker_host}\"\n\
                 $env:DOCKER_TLS_VERIFY=\"1\"\n\
                 $env:DOCKER_CERT_PATH=$PSScriptRoot\n"
            ),
            Self::Cmd => format!(
                "set DOCKER_HOST={docker_host}\r\n\
                 set DOCKER_TLS_VERIFY=1\r\n\
                 set DOCKER_CERT_PATH=%~dp0\r\n"
            ),
        }
    }

    /// Full path of the script inside `dir`.
    #[must_use]
    pub fn script_path(self, dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(self.script_name())
    }

    /// The command that loads `script` into the current shell.
    #[must_use]
    pub fn source_command(self, script: &Utf8Path) -> String {
        match self {
            Self::Bash => format!("source \"{script}\""),
            Self::Fish => format!("source '{script}'"),
            Self::Powershell => format!(". \"{script}\""),
            Self::Cmd => format!("CALL \"{script}\""),
        }
    }

    /// The line users add to load the environment through `carina env`.
    fn eval_hint(self, cluster: &str) -> String {
        match self {
            Self::Bash => format!("eval $(carina env {cluster})"),
            Self::Fish => format!("eval (carina env {cluster} --shell fish)"),
            Self::Powershell => {
                format!("carina env {cluster} --shell powershell | Invoke-Expression")
            }
            Self::Cmd => format!(
                "FOR /f \"tokens=*\" %i IN ('carina env {cluster} --shell cmd') DO %i"
            ),
        }
    }

    /// The line-comment marker of the shell.
    #[must_use]
    pub const fn comment(self) -> &'static str {
        match self {
            Self::Cmd => "REM",
            Self::Bash | Self::Fish | Self::Powershell => "#",
        }
    }

    /// Text printed by `carina env`: the source command and how to run it.
    #[must_use]
    pub fn source_help(self, script: &Utf8Path, cluster: &str) -> String {
        format!(
            "{}\n{} Run the command below to get your Docker environment variables set:\n{} {}",
            self.source_command(script),
            self.comment(),
            self.comment(),
            self.eval_hint(cluster),
        )
    }

    /// Follow-up instructions printed after `carina credentials`.
    #[must_use]
    pub fn next_steps(self, cluster: &str) -> String {
        format!(
            "{c}\n{c} To use these credentials, run:\n{c} {}\n{c}",
            self.eval_hint(cluster),
            c = self.comment(),
        )
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bash => "bash",
            Self::Fish => "fish",
            Self::Powershell => "powershell",
            Self::Cmd => "cmd",
        })
    }
}
