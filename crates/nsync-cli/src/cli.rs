//! Command line definition

use clap::{Args, Parser, Subcommand, ValueEnum};
use nsync_remote::NodeLabel;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "nsync", version, about = "Mirror a circle/role organization graph into chat channels and labels")]
pub(crate) struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "NSYNC_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Remote API base URL, overriding config and NESTR_API_URL
    #[arg(long, global = true)]
    pub(crate) api_url: Option<String>,

    /// Mapping store file, overriding config
    #[arg(long, global = true)]
    pub(crate) store: Option<PathBuf>,

    /// Credential store file, overriding config
    #[arg(long, global = true)]
    pub(crate) credentials: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub(crate) json: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Store remote credentials for a chat identity
    Login {
        /// Chat identity the credential belongs to
        #[arg(long)]
        identity: String,
        /// Remote user id
        #[arg(long)]
        user_id: String,
        /// Remote auth token
        #[arg(long, env = "NSYNC_LOGIN_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// List workspaces visible to the credential
    Workspaces(AuthArgs),

    /// Search circles or roles under a node
    Search {
        #[command(flatten)]
        auth: AuthArgs,
        /// Node label to search for
        #[arg(value_enum)]
        label: LabelArg,
        /// Node to search under
        #[arg(long)]
        context: String,
        /// Depth passed to the remote filter
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Create an item in the remote inbox
    Inbox {
        #[command(flatten)]
        auth: AuthArgs,
        /// Item title
        title: String,
        /// Item description
        #[arg(long)]
        description: Option<String>,
    },

    /// Show what a sync would create, without touching the platform or store
    Plan {
        #[command(flatten)]
        auth: AuthArgs,
        /// Platform scope
        #[arg(long)]
        scope: String,
        /// Remote workspace id
        #[arg(long)]
        workspace: String,
        /// Workspace display name
        #[arg(long)]
        name: String,
        /// Prefix for top-level labels and channels
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Print the mapping records of a scope
    Mappings {
        /// Platform scope
        #[arg(long)]
        scope: String,
    },
}

/// Where the remote credential comes from
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct AuthArgs {
    /// Use the credential stored for this chat identity instead of
    /// NESTR_TOKEN / NESTR_USERID
    #[arg(long)]
    pub(crate) identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum LabelArg {
    Circle,
    Role,
}

impl From<LabelArg> for NodeLabel {
    fn from(label: LabelArg) -> Self {
        match label {
            LabelArg::Circle => Self::Circle,
            LabelArg::Role => Self::Role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_plan() {
        let cli = Cli::try_parse_from([
            "nsync", "plan", "--scope", "g1", "--workspace", "W1", "--name", "Acme", "--identity", "u#1",
        ])
        .unwrap();

        match cli.command {
            Command::Plan {
                auth, scope, workspace, ..
            } => {
                assert_eq!(scope, "g1");
                assert_eq!(workspace, "W1");
                assert_eq!(auth.identity.as_deref(), Some("u#1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nsync", "mappings", "--scope", "g1", "--json", "--store", "db.json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.store, Some(PathBuf::from("db.json")));
    }

    #[test]
    fn search_label_is_validated() {
        assert!(Cli::try_parse_from(["nsync", "search", "team", "--context", "W1"]).is_err());
        let cli = Cli::try_parse_from(["nsync", "search", "role", "--context", "W1", "--depth", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Search { label: LabelArg::Role, depth: Some(3), .. }));
    }
}
