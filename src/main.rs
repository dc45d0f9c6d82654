//! `donut` - Donut gateway and console client

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use donut_lib::commands::{self, login::LoginOptions, CommandContext};
use donut_lib::models::{
    AssetAccountStatus, AssetAccountType, ClientTier, InvestorAssetAccount,
    InvestorAssetAccountBasicInfo, User, UserRole,
};
use donut_lib::modules::{self, FileSessionRepository, SessionRepository};
use donut_lib::AppError;

/// Exit code for a command that ran and failed
const EXIT_COMMAND_FAILED: i32 = 500;
const EXIT_USAGE: i32 = 1;

#[derive(Parser)]
#[command(name = "donut")]
#[command(author, version, about = "Donut gateway and console client", long_about = None)]
struct Cli {
    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Serve {
        /// Listening port (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Log in to the authorization server
    Login {
        /// Gateway address, e.g. http://localhost:5009
        service: Option<String>,

        /// Authorization server address
        #[arg(short, long)]
        authority: Option<String>,

        /// Use the test authorization server
        #[arg(short, long, conflicts_with = "authority")]
        test: bool,

        /// Forget the stored login
        #[arg(short, long)]
        reset: bool,
    },

    /// Manage asset accounts
    #[command(subcommand)]
    Accounts(AccountCommands),

    /// Manage users
    #[command(subcommand)]
    Users(UserCommands),
}

#[derive(Args)]
struct AccountDetails {
    /// Margin account id
    #[arg(short = 'm', long)]
    margin_account: Option<String>,

    /// Bank identification of the margin account
    #[arg(short = 'b', long = "bank-ident-margin")]
    bank_identification_margin: Option<String>,

    /// Reference account id
    #[arg(short = 'r', long)]
    reference_account: Option<String>,

    /// Bank identification of the reference account
    #[arg(short = 'k', long = "bank-ident-reference")]
    bank_identification_reference: Option<String>,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Create a new investor asset account
    Add {
        /// The asset account id
        account: String,
        /// The user subject identifier of the owner
        owner: String,
        /// The intermediary asset account id
        intermediary: String,

        /// The asset account type
        #[arg(short = 't', long = "type", default_value = "IBAN")]
        account_type: AssetAccountType,

        #[command(flatten)]
        details: AccountDetails,

        /// Do not allow withdrawals
        #[arg(long)]
        no_withdrawal: bool,
    },

    /// Update an existing asset account
    Modify {
        /// The asset account id
        account: String,

        /// The asset account type
        #[arg(short = 't', long = "type")]
        account_type: AssetAccountType,

        /// The asset account status
        #[arg(short, long)]
        status: AssetAccountStatus,

        #[command(flatten)]
        details: AccountDetails,

        /// Allow withdrawals
        #[arg(short = 'a', long)]
        withdrawal_allowed: bool,
    },

    /// Close an asset account
    Close {
        /// The asset account id to close
        account: String,
    },

    /// Terminate an asset account
    Terminate {
        /// The asset account id to terminate
        account: String,
    },

    /// Deposit to an asset account
    Deposit {
        /// The asset account id to deposit to
        account: String,
        /// The unique reference identifier for this transaction
        reference: String,
        /// The amount to deposit
        amount: String,
        /// The ISO code of the settlement currency
        currency: String,

        /// Free text attached to the deposit
        #[arg(long)]
        text: Option<String>,
    },

    /// Withdraw from an asset account
    Withdraw {
        /// The asset account id to withdraw from
        account: String,
        /// The amount to withdraw
        amount: String,
        /// The reference account id
        reference: String,

        /// Transaction timestamp, `MM/dd/yyyy HH:mm` (UTC) or RFC 3339
        #[arg(short, long)]
        timestamp: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Add {
        /// The user subject identifier
        id: String,
        /// The user client tier
        tier: ClientTier,

        /// The default asset account id for the user
        #[arg(short = 'a', long = "default-account")]
        default_account: Option<String>,

        /// The user role
        #[arg(long, default_value = "Snow_Investor")]
        role: UserRole,
    },
}

async fn run_accounts(ctx: &CommandContext, command: AccountCommands) -> donut_lib::AppResult<()> {
    use commands::accounts;

    match command {
        AccountCommands::Add {
            account,
            owner,
            intermediary,
            account_type,
            details,
            no_withdrawal,
        } => {
            let account = InvestorAssetAccount {
                asset_account_id: account,
                owner_id: owner,
                account_type,
                intermediary_id: intermediary,
                margin_account: details.margin_account,
                bank_identification_margin: details.bank_identification_margin,
                reference_account: details.reference_account,
                bank_identification_reference: details.bank_identification_reference,
                withdrawal_allowed: !no_withdrawal,
            };
            accounts::add(ctx, account).await
        }
        AccountCommands::Modify {
            account,
            account_type,
            status,
            details,
            withdrawal_allowed,
        } => {
            let info = InvestorAssetAccountBasicInfo {
                asset_account_id: account,
                account_type,
                status,
                margin_account: details.margin_account,
                bank_identification_margin: details.bank_identification_margin,
                reference_account: details.reference_account,
                bank_identification_reference: details.bank_identification_reference,
                withdrawal_allowed,
            };
            accounts::modify(ctx, info).await
        }
        AccountCommands::Close { account } => accounts::close(ctx, &account).await,
        AccountCommands::Terminate { account } => accounts::terminate(ctx, &account).await,
        AccountCommands::Deposit {
            account,
            reference,
            amount,
            currency,
            text,
        } => {
            let deposit = accounts::deposit_request(account, reference, &amount, currency, text)?;
            accounts::deposit(ctx, deposit).await
        }
        AccountCommands::Withdraw {
            account,
            amount,
            reference,
            timestamp,
        } => {
            let withdraw =
                accounts::withdraw_request(account, &amount, reference, timestamp.as_deref())?;
            accounts::withdraw(ctx, withdraw).await
        }
    }
}

async fn run_users(ctx: &CommandContext, command: UserCommands) -> donut_lib::AppResult<()> {
    match command {
        UserCommands::Add {
            id,
            tier,
            default_account,
            role,
        } => {
            let user = User {
                user_id: id,
                client_tier: tier,
                role: Some(role),
                default_asset_account_id: default_account.filter(|a| !a.trim().is_empty()),
            };
            commands::users::add(ctx, user).await
        }
    }
}

/// Run a client command with the stored session, persisting it on success
async fn with_session<F, Fut>(session: Arc<dyn SessionRepository>, run: F) -> donut_lib::AppResult<()>
where
    F: FnOnce(Arc<CommandContext>) -> Fut,
    Fut: std::future::Future<Output = donut_lib::AppResult<()>>,
{
    let ctx = Arc::new(CommandContext::connect(session).await?);
    run(ctx.clone()).await?;
    ctx.shutdown()
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = modules::load_app_config().context("Failed to load configuration")?;
    let session: Arc<dyn SessionRepository> = Arc::new(
        FileSessionRepository::default_location().context("Failed to locate session store")?,
    );

    match cli.command {
        Commands::Serve { port } => {
            let mut proxy = config.proxy;
            if let Some(port) = port {
                proxy.port = port;
            }
            commands::proxy::run_gateway(proxy).await?;
        }
        Commands::Login {
            service,
            authority,
            test,
            reset,
        } => {
            let options = LoginOptions {
                service,
                authority,
                test,
                reset,
            };
            commands::login::login(session, &config, options).await?;
        }
        Commands::Accounts(command) => {
            with_session(session, |ctx| async move { run_accounts(&ctx, command).await }).await?;
        }
        Commands::Users(command) => {
            with_session(session, |ctx| async move { run_users(&ctx, command).await }).await?;
        }
    }

    Ok(())
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<AppError>() {
        Some(AppError::InvalidArgument(_)) => EXIT_USAGE,
        _ => EXIT_COMMAND_FAILED,
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };

    modules::init_logger(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(exit_code(&e));
    }
}
