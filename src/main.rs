use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregate;
mod config;
mod convert;
mod dashboard;
mod error;
mod loader;
mod models;
mod normalize;
mod report;
mod session;
mod store;

use crate::config::Settings;
use crate::dashboard::Filters;
use crate::loader::Loader;
use crate::models::Month;
use crate::session::Session;
use crate::store::{CredentialStore, Role};

#[derive(Parser)]
#[command(name = "agent-performance-dashboard")]
#[command(about = "Call-center agent performance dashboard over monthly, daily and weekly CSV exports", long_about = None)]
struct Cli {
    /// Folder holding the monthly, daily and weekly exports
    #[arg(long, global = true, env = "DASHBOARD_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// JSON file with the user accounts
    #[arg(long, global = true, env = "DASHBOARD_USERS_FILE", default_value = "users.json")]
    users_file: PathBuf,

    /// Year used to date the daily exports (defaults to the current year)
    #[arg(long, global = true, env = "DASHBOARD_YEAR")]
    year: Option<i32>,

    #[arg(long, global = true, env = "DASHBOARD_LOGIN")]
    login: Option<String>,

    #[arg(long, global = true, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List months with a consolidated export
    Months,
    /// Render the dashboard for the logged-in user as markdown
    Dashboard {
        /// Month name, e.g. outubro (defaults to the latest available)
        #[arg(long, value_parser = parse_month)]
        month: Option<Month>,
        /// Admin only: show a single agent
        #[arg(long)]
        agent: Option<String>,
        /// First day of the calendar window (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day of the calendar window (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Change the logged-in user's password
    ChangePassword {
        #[arg(long = "new")]
        new_password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Manage accounts (admin only)
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Show every account
    List,
    /// Create accounts for agents found in the exports that have none
    Sync,
    /// Create an account with the default password
    Add {
        #[arg(long)]
        login: String,
        #[arg(long)]
        agent: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Set a new password and force a change on next login
    Reset {
        #[arg(long)]
        login: String,
        #[arg(long = "new")]
        new_password: String,
    },
    /// Remove an account
    Delete {
        #[arg(long)]
        login: String,
    },
}

fn parse_month(value: &str) -> Result<Month, String> {
    Month::from_name(value).ok_or_else(|| format!("unknown month '{value}'"))
}

fn start_session(cli: &Cli, store: &CredentialStore) -> anyhow::Result<Session> {
    let login = cli
        .login
        .as_deref()
        .context("--login (or DASHBOARD_LOGIN) is required")?;
    let password = cli
        .password
        .as_deref()
        .context("--password (or DASHBOARD_PASSWORD) is required")?;
    Ok(Session::start(store, login, password)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_performance_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::new(&cli.data_dir, &cli.users_file);
    let store = CredentialStore::new(&settings.users_file);
    let mut loader = Loader::new(settings.layout.clone());
    if let Some(year) = cli.year {
        loader = loader.with_year(year);
    }
    tracing::debug!(
        data = %settings.layout.root().display(),
        users = %store.path().display(),
        "starting"
    );

    match &cli.command {
        Commands::Months => {
            print!("{}", report::build_month_list(&loader.available_months()));
        }
        Commands::Dashboard {
            month,
            agent,
            from,
            to,
            out,
        } => {
            let session = start_session(&cli, &store)?;
            let Some(month) = dashboard::select_month(&loader, *month) else {
                bail!(
                    "no monthly files in {}; add e.g. janeiro.csv",
                    settings.layout.root().display()
                );
            };
            let filters = Filters {
                agent: agent.clone(),
                from: *from,
                to: *to,
            };
            let view = dashboard::build(&session, &mut loader, month, &filters)?;
            tracing::debug!(loads = loader.cached_loads(), "dashboard built");
            let rendered = report::build_report(&view);
            match out {
                Some(path) => {
                    std::fs::write(path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Dashboard written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
            session.end();
        }
        Commands::ChangePassword {
            new_password,
            confirm,
        } => {
            let mut session = start_session(&cli, &store)?;
            session.change_password(&store, new_password, confirm)?;
            println!("Password changed for {}.", session.login);
            session.end();
        }
        Commands::Users { action } => {
            let session = start_session(&cli, &store)?;
            session.require_admin()?;
            run_user_action(action, &session, &store, &mut loader)?;
            session.end();
        }
    }

    Ok(())
}

fn run_user_action(
    action: &UserAction,
    session: &Session,
    store: &CredentialStore,
    loader: &mut Loader,
) -> anyhow::Result<()> {
    match action {
        UserAction::List => {
            print!("{}", report::build_user_table(&store.load()?));
        }
        UserAction::Sync => {
            let history = loader.history();
            let agents = aggregate::agent_names(&history.rows);
            if agents.is_empty() {
                bail!("no agent column found in the monthly exports; nothing to sync");
            }
            let created = store.sync_agents(&agents)?;
            if created.is_empty() {
                println!("Every agent in the exports already has a login.");
            } else {
                println!(
                    "Created {} logins with the default password {}:",
                    created.len(),
                    store::DEFAULT_PASSWORD
                );
                for login in created {
                    println!("- {login}");
                }
            }
        }
        UserAction::Add { login, agent, role } => {
            store.create_manual(login, agent, *role)?;
            println!("User '{}' created.", login.trim());
        }
        UserAction::Reset {
            login,
            new_password,
        } => {
            if new_password.is_empty() {
                bail!("the new password must not be empty");
            }
            store.reset_password(login, new_password)?;
            println!("Password for '{login}' reset; it must be changed on next login.");
        }
        UserAction::Delete { login } => {
            store.delete(login, &session.login)?;
            println!("User '{login}' deleted.");
        }
    }
    Ok(())
}
