use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_PORT: u16 = 3010;

/// 本地 env 文件检查与编辑工具
#[derive(Debug, Parser)]
#[command(name = "env-client")]
#[command(version)]
#[command(about = "Inspect, validate and edit a project's .env files against its env schema", long_about = None)]
pub struct Cli {
    /// Project directory to scan
    #[arg(short, long, value_name = "PATH", default_value = "./", env = "ENV_CLIENT_DIR")]
    pub dir: PathBuf,

    /// Port for the local web UI
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "ENV_CLIENT_PORT")]
    pub port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Open the terminal UI instead of starting the web server
    #[arg(long)]
    pub tui: bool,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        match (self.verbose, self.tui) {
            (true, _) => tracing::Level::DEBUG,
            // 终端界面占用屏幕，只输出错误
            (false, true) => tracing::Level::ERROR,
            (false, false) => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["env-client", "-d", "/tmp/app", "-p", "4000", "-v"]).unwrap();
        assert_eq!(cli.dir, PathBuf::from("/tmp/app"));
        assert_eq!(cli.port, 4000);
        assert!(cli.verbose);
        assert!(!cli.tui);
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_tui_quiets_logging() {
        let cli = Cli::try_parse_from(["env-client", "--tui", "--dir", "."]).unwrap();
        assert!(cli.tui);
        assert_eq!(cli.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_invalid_port() {
        assert!(Cli::try_parse_from(["env-client", "--port", "not-a-port"]).is_err());
    }
}
