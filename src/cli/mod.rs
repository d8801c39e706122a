// CLI module for velvet-gateway
// Author: kelexine (https://github.com/kelexine)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// velvet-gateway - Session-scoped image generation gateway
#[derive(Parser, Debug)]
#[command(name = "velvet-gateway", version, about, long_about = None)]
pub struct Args {
    /// Path to a config file (defaults to ~/.velvet-gateway/config.toml)
    #[arg(long, short, global = true, env = "VELVET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (the default)
    Serve {
        /// Override server.host
        #[arg(long)]
        host: Option<String>,

        /// Override server.port
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Generate an image through a running gateway
    Generate {
        prompt: String,

        #[arg(long, short)]
        negative: Option<String>,

        /// Style preset id (see GET /api/styles)
        #[arg(long, short)]
        style: Option<String>,

        /// Write the image here as well as to the gallery
        #[arg(long, short)]
        out: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Replay prompts queued while the gateway was unreachable
    Sync {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List the local gallery
    Gallery,
}

/// Which gateway and session a client command talks to.
#[derive(clap::Args, Debug, Default)]
pub struct TargetArgs {
    /// Override client.server_url
    #[arg(long, env = "VELVET_SERVER_URL")]
    pub server: Option<String>,

    /// Session id (defaults to this profile's own session)
    #[arg(long)]
    pub session: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let args = Args::try_parse_from(["velvet-gateway"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_generate_flags() {
        let args = Args::try_parse_from([
            "velvet-gateway",
            "generate",
            "a sunset over mountains",
            "--style",
            "cinematic",
            "--session",
            "abc",
        ])
        .unwrap();

        match args.command {
            Some(Command::Generate { prompt, style, target, .. }) => {
                assert_eq!(prompt, "a sunset over mountains");
                assert_eq!(style.as_deref(), Some("cinematic"));
                assert_eq!(target.session.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
