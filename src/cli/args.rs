//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// On-demand development server
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: ondemand.toml)
    #[arg(short = 'C', long, global = true, default_value = "ondemand.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start development server, compiling pages as they are requested
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Log scheduler decisions (builds, pings, evictions)
        #[arg(short = 'V', long)]
        verbose: bool,
    },

    /// Remove the output directory
    Clean,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["ondemand", "serve", "-p", "8080", "-V"]).unwrap();
        match cli.command {
            Commands::Serve {
                interface,
                port,
                verbose,
            } => {
                assert_eq!(interface, None);
                assert_eq!(port, Some(8080));
                assert!(verbose);
            }
            Commands::Clean => panic!("expected serve"),
        }
        assert_eq!(cli.config, PathBuf::from("ondemand.toml"));
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["ondemand", "clean", "-C", "site/dev.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Clean));
        assert_eq!(cli.config, PathBuf::from("site/dev.toml"));
    }
}
