use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use warden::authz::{Enforcer, Model};
use warden::settings::Settings;
use warden::storage;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Policy-driven access control")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide a request, e.g. `warden enforce alice data1 read`
    Enforce {
        /// Request values in request_definition order
        #[arg(required = true)]
        values: Vec<String>,
        /// Also print the rule that decided the outcome
        #[arg(long)]
        explain: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a policy rule and save
    AddPolicy {
        #[arg(long, default_value = "p")]
        ptype: String,
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Remove a policy rule and save
    RemovePolicy {
        #[arg(long, default_value = "p")]
        ptype: String,
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Assign a role to a user and save
    AddRole {
        user: String,
        role: String,
        #[arg(long)]
        domain: Option<String>,
    },
    /// Remove a role from a user and save
    DeleteRole {
        user: String,
        role: String,
        #[arg(long)]
        domain: Option<String>,
    },
    /// List the roles of a user
    Roles {
        user: String,
        #[arg(long)]
        domain: Option<String>,
        /// Include roles inherited through other roles
        #[arg(long)]
        implicit: bool,
    },
    /// Print stored rules
    List {
        /// Only rules of this type
        #[arg(long)]
        ptype: Option<String>,
    },
    /// Create or upgrade the policy table at storage.database_url
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging (stderr, so command output stays clean)
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    if let Command::Migrate = cli.command {
        storage::DbAdapter::connect(&settings.storage.database_url).await?;
        tracing::info!("Policy table is up to date");
        return Ok(());
    }

    let model = Model::from_file(&settings.model.path)?;
    let adapter = storage::init(&settings.storage).await?;
    let enforcer = Enforcer::with_adapter(model, adapter).await?;

    match cli.command {
        Command::Enforce {
            values,
            explain,
            json,
        } => {
            let result = enforcer.enforce_ex(&values)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                println!("{}", if result.allowed { "allow" } else { "deny" });
                if explain {
                    for rule in &result.explain {
                        println!("  {rule}");
                    }
                }
            }
        }
        Command::AddPolicy { ptype, fields } => {
            if enforcer.add_named_policy(&ptype, &fields)? {
                enforcer.save_policy().await?;
            } else {
                tracing::warn!(%ptype, ?fields, "Rule already present");
            }
        }
        Command::RemovePolicy { ptype, fields } => {
            if enforcer.remove_named_policy(&ptype, &fields)? {
                enforcer.save_policy().await?;
            } else {
                tracing::warn!(%ptype, ?fields, "No such rule");
            }
        }
        Command::AddRole { user, role, domain } => {
            if enforcer.add_role_for_user(&user, &role, domain.as_deref())? {
                enforcer.save_policy().await?;
            } else {
                tracing::warn!(%user, %role, "Role already assigned");
            }
        }
        Command::DeleteRole { user, role, domain } => {
            if enforcer.delete_role_for_user(&user, &role, domain.as_deref())? {
                enforcer.save_policy().await?;
            } else {
                tracing::warn!(%user, %role, "Role was not assigned");
            }
        }
        Command::Roles {
            user,
            domain,
            implicit,
        } => {
            let roles = if implicit {
                enforcer.get_implicit_roles_for_user(&user, domain.as_deref())
            } else {
                enforcer.get_roles_for_user(&user, domain.as_deref())
            };
            for role in roles {
                println!("{role}");
            }
        }
        Command::List { ptype } => {
            for rule in enforcer.rules().iter() {
                if ptype.as_deref().is_none_or(|p| p == rule.ptype) {
                    println!("{rule}");
                }
            }
        }
        Command::Migrate => {}
    }
    Ok(())
}
