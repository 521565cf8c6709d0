//! Command line of the `userapi` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use configs::AppConfig;

/// User directory HTTP service
#[derive(Parser, Debug)]
#[command(name = "userapi")]
#[command(about = "User and role directory over HTTP, backed by flat files")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Serve flags for a bare `userapi` invocation
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Print the application version
    Version,
}

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(clap::Args, Debug, Default)]
pub struct ServeArgs {
    /// Port to listen on [default: 3060]
    #[arg(short, long, env = "USERAPI_PORT")]
    pub port: Option<u16>,

    /// API key expected in `Authorization: bearer <key>` [default: secret]
    #[arg(short = 'k', long = "key", env = "USERAPI_KEY")]
    pub key: Option<String>,

    /// User table, or NONE to keep users in memory only [default: users.csv]
    #[arg(short, long, alias = "usersFile")]
    pub users_file: Option<String>,

    /// Role table, or NONE for an empty catalog [default: roles.csv]
    #[arg(short, long, alias = "rolesFile")]
    pub roles_file: Option<String>,

    /// Advisory lock file shared by writers [default: <tmp>/userstore.lock]
    #[arg(long)]
    pub lock_file: Option<PathBuf>,

    /// TOML config file (falls back to CONFIG_PATH, then ./config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ServeArgs {
    /// Overlay the flags that were given on top of `cfg`.
    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(key) = &self.key {
            cfg.auth.api_key = key.clone();
        }
        if let Some(users) = &self.users_file {
            cfg.storage.users_file = users.clone();
        }
        if let Some(roles) = &self.roles_file {
            cfg.storage.roles_file = roles.clone();
        }
        if let Some(lock) = &self.lock_file {
            cfg.storage.lock_file = Some(lock.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_values() {
        let cli = Cli::parse_from(["userapi", "serve", "-p", "8080", "-k", "k2", "-u", "NONE"]);
        let Some(Commands::Serve(args)) = cli.command else { panic!("expected serve") };
        let mut cfg = AppConfig::default();
        cfg.storage.roles_file = "data/roles.csv".into();
        args.apply(&mut cfg);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.auth.api_key, "k2");
        assert_eq!(cfg.storage.users_file, "NONE");
        assert_eq!(cfg.storage.roles_file, "data/roles.csv");
    }

    #[test]
    fn unset_flags_keep_defaults() {
        let mut cfg = AppConfig::default();
        ServeArgs::default().apply(&mut cfg);
        assert_eq!(cfg.server.port, 3060);
        assert_eq!(cfg.auth.api_key, "secret");
    }

    #[test]
    fn bare_invocation_serves_with_env_and_flags() {
        std::env::set_var("USERAPI_KEY", "from-env");
        let cli = Cli::parse_from(["userapi", "-p", "9000"]);
        std::env::remove_var("USERAPI_KEY");
        assert!(cli.command.is_none());
        let mut cfg = AppConfig::default();
        cli.serve.apply(&mut cfg);
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.auth.api_key, "from-env");
    }

    #[test]
    fn camel_case_file_flags_are_accepted() {
        let cli = Cli::parse_from(["userapi", "serve", "--usersFile", "u.csv", "--rolesFile", "NONE"]);
        let Some(Commands::Serve(args)) = cli.command else { panic!("expected serve") };
        assert_eq!(args.users_file.as_deref(), Some("u.csv"));
        assert_eq!(args.roles_file.as_deref(), Some("NONE"));
    }

    #[test]
    fn version_subcommand_parses() {
        let cli = Cli::parse_from(["userapi", "version"]);
        assert!(matches!(cli.command, Some(Commands::Version)));
    }
}
