//! CLI entry and dispatch.

use anyhow::{Context, Result};
use cfp_core::{config, logging};
use cfp_types::ProposalStatus;
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "cfp")]
#[command(version)]
#[command(about = "Call-for-papers client: proposals, reviews and live notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long, env = "CFP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create an account and sign in with it
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Account role, e.g. speaker or reviewer
        #[arg(long, default_value = "speaker")]
        role: String,
        /// Read from stdin when omitted
        #[arg(long, env = "CFP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the stored token
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Send the email verification link again
    ResendVerification,

    /// Notification feed
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },

    /// Search, submit and review proposals
    Proposals {
        #[command(subcommand)]
        command: ProposalCommands,
    },

    /// Proposal tags
    Tags {
        #[command(subcommand)]
        command: TagCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

#[derive(clap::Subcommand)]
enum NotificationCommands {
    /// Show the latest notifications
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        search: Option<String>,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the unread counter
    Unread,
    /// Mark every notification as read
    ReadAll,
    /// Follow notifications as they arrive (Ctrl-C to stop)
    Watch,
}

#[derive(clap::Subcommand)]
enum ProposalCommands {
    /// Search proposals
    Search {
        /// Full-text query
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long)]
        status: Option<ProposalStatus>,
        /// Tag id (repeatable)
        #[arg(long = "tag", value_name = "TAG_ID")]
        tags: Vec<u64>,
        #[arg(long)]
        page: Option<u64>,
        #[arg(long)]
        per_page: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Show one proposal
    Show {
        #[arg(value_name = "PROPOSAL_ID")]
        id: u64,
        #[arg(long)]
        json: bool,
    },
    /// Submit a new proposal
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Tag id (repeatable)
        #[arg(long = "tag", value_name = "TAG_ID")]
        tags: Vec<u64>,
        /// File to attach (slides, paper)
        #[arg(long, value_name = "PATH")]
        attachment: Option<std::path::PathBuf>,
        /// MIME type of the attachment (guessed from the extension by default)
        #[arg(long, requires = "attachment")]
        mime: Option<String>,
    },
    /// Change a proposal's review status
    Status {
        #[arg(value_name = "PROPOSAL_ID")]
        id: u64,
        #[arg(value_name = "STATUS")]
        status: ProposalStatus,
    },
    /// Download a proposal's attachment
    Download {
        #[arg(value_name = "PROPOSAL_ID")]
        id: u64,
        /// Output file (defaults to the server-provided filename)
        #[arg(long, short)]
        out: Option<std::path::PathBuf>,
    },
    /// List the reviews of a proposal
    Reviews {
        #[arg(value_name = "PROPOSAL_ID")]
        id: u64,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        min_rating: Option<u8>,
        #[arg(long)]
        max_rating: Option<u8>,
        #[arg(long)]
        page: Option<u64>,
        #[arg(long)]
        per_page: Option<u64>,
    },
    /// Create or update your review of a proposal
    Review {
        #[arg(value_name = "PROPOSAL_ID")]
        id: u64,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
        #[arg(long)]
        comment: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum TagCommands {
    /// List tags
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    // Config commands must work even when the current file is broken.
    let command = match cli.command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::Path => {
                    commands::config::path();
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(),
            };
        }
        other => other,
    };

    let config = config::Config::load().context("load config")?;
    let settings = config.settings().context("resolve settings")?;
    let _log_guard = logging::init(Some(&settings.log_filter))?;

    let mut ctx = commands::Ctx::open(settings)?;

    match command {
        // Handled before the config is loaded.
        Commands::Config { .. } => Ok(()),

        Commands::Login { email, password } => {
            commands::auth::login(&mut ctx, &email, password).await
        }
        Commands::Register {
            name,
            email,
            role,
            password,
        } => commands::auth::register(&mut ctx, name, email, role, password).await,
        Commands::Logout => commands::auth::logout(&mut ctx).await,
        Commands::Whoami => commands::auth::whoami(&mut ctx).await,
        Commands::ResendVerification => commands::auth::resend_verification(&mut ctx).await,

        Commands::Notifications { command } => match command {
            NotificationCommands::List {
                limit,
                search,
                json,
            } => commands::notifications::list(&mut ctx, limit, search, json).await,
            NotificationCommands::Unread => commands::notifications::unread(&mut ctx).await,
            NotificationCommands::ReadAll => commands::notifications::read_all(&mut ctx).await,
            NotificationCommands::Watch => commands::notifications::watch(&mut ctx).await,
        },

        Commands::Proposals { command } => match command {
            ProposalCommands::Search {
                query,
                status,
                tags,
                page,
                per_page,
                json,
            } => {
                let params = cfp_types::ProposalSearchParams {
                    search: query,
                    status,
                    tag_ids: tags,
                    page,
                    per_page,
                };
                commands::proposals::search(&mut ctx, &params, json).await
            }
            ProposalCommands::Show { id, json } => {
                commands::proposals::show(&mut ctx, id, json).await
            }
            ProposalCommands::Create {
                title,
                description,
                tags,
                attachment,
                mime,
            } => {
                commands::proposals::create(
                    &mut ctx,
                    commands::proposals::CreateOptions {
                        title,
                        description,
                        tag_ids: tags,
                        attachment,
                        mime,
                    },
                )
                .await
            }
            ProposalCommands::Status { id, status } => {
                commands::proposals::change_status(&mut ctx, id, status).await
            }
            ProposalCommands::Download { id, out } => {
                commands::proposals::download(&mut ctx, id, out).await
            }
            ProposalCommands::Reviews {
                id,
                search,
                min_rating,
                max_rating,
                page,
                per_page,
            } => {
                let params = cfp_types::ReviewSearchParams {
                    search,
                    rating_min: min_rating,
                    rating_max: max_rating,
                    page,
                    per_page,
                };
                commands::proposals::reviews(&mut ctx, id, &params).await
            }
            ProposalCommands::Review {
                id,
                rating,
                comment,
            } => commands::proposals::review(&mut ctx, id, rating, comment).await,
        },

        Commands::Tags { command } => match command {
            TagCommands::List {
                search,
                limit,
                json,
            } => commands::tags::list(&mut ctx, search, limit, json).await,
        },
    }
}
