use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = k.trim();
        if key.is_empty() {
            return Err(anyhow!("empty key in: {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskflow",
    version,
    about = "TaskFlow: chat front-end for the task API",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Config file; defaults to `$TASKFLOW_CONFIG` or the user config dir.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Override one setting, e.g. `--set page_size=5`.
    #[arg(
        long = "set",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub overrides: Vec<KeyVal>,
}

impl GlobalCli {
    /// Any `-v`/`-q` wins over the configured level.
    fn level_override(&self) -> Option<&'static str> {
        if self.quiet >= 2 {
            Some("error")
        } else if self.quiet == 1 {
            Some("warn")
        } else if self.verbose >= 3 {
            Some("trace")
        } else if self.verbose == 2 {
            Some("debug")
        } else if self.verbose == 1 {
            Some("info")
        } else {
            None
        }
    }
}

/// `RUST_LOG` first, then the flags, then `configured`.
pub fn init_tracing(cli: &GlobalCli, configured: &str) -> anyhow::Result<()> {
    let default_level = cli.level_override().unwrap_or(configured);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{GlobalCli, KeyVal};

    #[test]
    fn keyval_requires_equals_and_key() {
        let kv: KeyVal = "page_size = 5".parse().expect("valid");
        assert_eq!(kv.key, "page_size");
        assert_eq!(kv.value, "5");
        assert!("page_size".parse::<KeyVal>().is_err());
        assert!("=5".parse::<KeyVal>().is_err());
    }

    #[test]
    fn flags_pick_the_level() {
        let cli = GlobalCli::parse_from(["taskflow", "-vv", "--set", "timezone=UTC"]);
        assert_eq!(cli.level_override(), Some("debug"));
        assert_eq!(cli.overrides.len(), 1);

        let quiet = GlobalCli::parse_from(["taskflow", "-q"]);
        assert_eq!(quiet.level_override(), Some("warn"));

        let plain = GlobalCli::parse_from(["taskflow"]);
        assert_eq!(plain.level_override(), None);
    }
}
