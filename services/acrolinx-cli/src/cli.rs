//! Command line parsing
//!
//! `acrolinx [--config PATH] [--metrics] <command> [args]`

use anyhow::{Result, bail};
use std::path::PathBuf;
use std::time::Duration;

pub const USAGE: &str = "\
usage: acrolinx [--config PATH] [--metrics] <command>

commands:
  info                           platform version and locales
  signin                         browser sign-in, prints the access token
  device-signin <tenant>         device authorization sign-in, prints the access token
  capabilities                   guidance profiles and content formats
  check <file> [--profile ID] [--format ID] [--batch ID] [--timeout SECS]
  dashboard <batch-id>           content analysis dashboard link
  ai-rewrite <file> [--profile ID]
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Info,
    SignIn,
    DeviceSignIn { tenant_id: String },
    Capabilities,
    Check(CheckArgs),
    Dashboard { batch_id: String },
    AiRewrite { file: PathBuf, guidance_profile_id: Option<String> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::SignIn => "signin",
            Self::DeviceSignIn { .. } => "device-signin",
            Self::Capabilities => "capabilities",
            Self::Check(_) => "check",
            Self::Dashboard { .. } => "dashboard",
            Self::AiRewrite { .. } => "ai-rewrite",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckArgs {
    pub file: PathBuf,
    pub guidance_profile_id: Option<String>,
    pub content_format: Option<String>,
    pub batch_id: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config_path: Option<String>,
    pub metrics: bool,
    pub command: Command,
}

impl Cli {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut config_path = None;
        let mut metrics = false;
        let mut positional = Vec::new();
        let mut options = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => config_path = Some(value_of(&mut iter, "--config")?),
                "--metrics" => metrics = true,
                "--profile" | "--format" | "--batch" | "--timeout" => {
                    options.push((arg.clone(), value_of(&mut iter, arg)?));
                }
                flag if flag.starts_with("--") => bail!("unknown option {flag}\n\n{USAGE}"),
                _ => positional.push(arg.clone()),
            }
        }

        let option = |name: &str| {
            options
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };

        let command = match positional.as_slice() {
            [c] if c == "info" => Command::Info,
            [c] if c == "signin" => Command::SignIn,
            [c, tenant] if c == "device-signin" => Command::DeviceSignIn {
                tenant_id: tenant.clone(),
            },
            [c] if c == "capabilities" => Command::Capabilities,
            [c, file] if c == "check" => Command::Check(CheckArgs {
                file: PathBuf::from(file),
                guidance_profile_id: option("--profile"),
                content_format: option("--format"),
                batch_id: option("--batch"),
                timeout: option("--timeout")
                    .map(|secs| parse_secs(&secs))
                    .transpose()?,
            }),
            [c, batch] if c == "dashboard" => Command::Dashboard {
                batch_id: batch.clone(),
            },
            [c, file] if c == "ai-rewrite" => Command::AiRewrite {
                file: PathBuf::from(file),
                guidance_profile_id: option("--profile"),
            },
            [] => bail!("missing command\n\n{USAGE}"),
            other => bail!("unknown command: {}\n\n{USAGE}", other.join(" ")),
        };

        Ok(Self {
            config_path,
            metrics,
            command,
        })
    }
}

fn value_of<'a>(iter: &mut impl Iterator<Item = &'a String>, name: &str) -> Result<String> {
    match iter.next() {
        Some(v) => Ok(v.clone()),
        None => bail!("{name} needs a value"),
    }
}

fn parse_secs(raw: &str) -> Result<Duration> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => bail!("--timeout must be a positive number of seconds, got {raw}"),
    }
}
