//! lambdaport - Lambda export/import between AWS accounts
//!
//! `export` captures functions from the current account into a folder,
//! `import` recreates them in the current account, and `describe` prints a
//! short summary of one deployed function.

use anyhow::{bail, Context};
use aws_config::BehaviorVersion;
use clap::{Parser, Subcommand};
use lambdaport::exporter::dedup_names;
use lambdaport::{
    describe_function, ExportOptions, Exporter, HttpFetcher, ImportOptions, Importer, Overrides,
    ResourceList, RoleSettings, Settings,
};
use lambdaport_core::arn::is_account_id;
use lambdaport_iam::{AccountResolver, IamClient, StsAccountResolver};
use lambdaport_lambda::LambdaClient;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lambdaport")]
#[command(
    about = "Export and import Lambda functions and their IAM roles between accounts",
    long_about = "Export and import Lambda functions and their IAM roles between accounts.\n\n\
                  Imports take no locks: run only one import against a given destination \
                  account at a time."
)]
struct Args {
    /// Configuration file (defaults to an optional lambdaport.toml)
    #[arg(long, global = true, env = "LAMBDAPORT_CONFIG")]
    config: Option<PathBuf>,

    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// AWS shared-config profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LAMBDAPORT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export functions, their code and their roles to a folder
    Export {
        /// Function to export (repeatable)
        #[arg(short = 'f', long = "function")]
        functions: Vec<String>,

        /// JSON file listing functions as {"lambdas": [...]}
        #[arg(long)]
        resources: Option<PathBuf>,

        /// Folder for manifests and packages
        #[arg(long, env = "EXPORT_FOLDER")]
        folder: Option<PathBuf>,

        /// Do not record execution roles and policies
        #[arg(long)]
        skip_roles: bool,
    },

    /// Create or update functions from an export folder
    ///
    /// Only one import may target a destination account at a time.
    Import {
        /// Folder holding manifests and packages
        #[arg(long, env = "IMPORT_FOLDER")]
        folder: Option<PathBuf>,

        /// Destination account id (discovered through STS when omitted)
        #[arg(long, env = "LAMBDAPORT_DESTINATION_ACCOUNT")]
        destination_account: Option<String>,
    },

    /// Print a compact JSON description of one function
    Describe {
        /// Function name
        #[arg(env = "LAMBDA_NAME")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    let mut overrides = Overrides {
        region: args.region,
        profile: args.profile,
        log_level: args.log_level,
        ..Overrides::default()
    };
    match &args.command {
        Command::Export {
            folder, skip_roles, ..
        } => {
            overrides.export_folder.clone_from(folder);
            overrides.skip_roles = *skip_roles;
        }
        Command::Import {
            folder,
            destination_account,
        } => {
            overrides.import_folder.clone_from(folder);
            overrides.destination_account.clone_from(destination_account);
        }
        Command::Describe { .. } => {}
    }
    settings.apply(overrides);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &settings.log_level;
                format!(
                    "lambdaport={level},lambdaport_core={level},lambdaport_lambda={level},lambdaport_iam={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let sdk_config = load_sdk_config(&settings).await;
    let compute = Arc::new(LambdaClient::new(aws_sdk_lambda::Client::new(&sdk_config)));
    let identity = Arc::new(IamClient::new(aws_sdk_iam::Client::new(&sdk_config)));

    match args.command {
        Command::Export {
            functions,
            resources,
            ..
        } => {
            let mut names = functions;
            if let Some(path) = resources {
                let list = ResourceList::load(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                names.extend(list.lambdas);
            }
            let names = dedup_names(names);
            if names.is_empty() {
                bail!("no functions to export: pass --function or --resources");
            }

            info!(count = names.len(), folder = %settings.export_folder.display(), "Starting export");
            let fetcher = Arc::new(HttpFetcher::new(settings.download_timeout())?);
            let exporter = Exporter::new(
                compute,
                identity,
                fetcher,
                ExportOptions {
                    folder: settings.export_folder.clone(),
                    capture_roles: settings.capture_roles,
                },
            );
            let summary = exporter
                .run(&names)
                .await
                .context("export could not run")?;
            Ok(exit_code(summary.is_success()))
        }

        Command::Import { .. } => {
            let destination = match settings.destination_account.clone() {
                Some(account) => account,
                None => StsAccountResolver::new(aws_sdk_sts::Client::new(&sdk_config))
                    .caller_account_id()
                    .await
                    .context("failed to resolve destination account")?,
            };
            if !is_account_id(&destination) {
                bail!("destination account '{destination}' is not a 12-digit account id");
            }

            info!(
                destination_account = %destination,
                folder = %settings.import_folder.display(),
                "Starting import"
            );
            let importer = Importer::new(
                compute,
                identity,
                destination,
                ImportOptions {
                    folder: settings.import_folder.clone(),
                    wait: settings.wait_config(),
                    role: RoleSettings {
                        baseline_policy_arn: settings.baseline_policy_arn.clone(),
                        propagation_delay: settings.role_propagation_delay(),
                    },
                },
            );
            let summary = importer.run().await.with_context(|| {
                format!(
                    "import from {} could not run",
                    settings.import_folder.display()
                )
            })?;
            Ok(exit_code(summary.is_success()))
        }

        Command::Describe { name } => {
            let info = describe_function(compute.as_ref(), &name).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn load_sdk_config(settings: &Settings) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(aws_sdk_lambda::config::Region::new(region.clone()));
    }
    if let Some(profile) = &settings.profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
