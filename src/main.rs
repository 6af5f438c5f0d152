use checkout_flow::application::scope::FlowStateMachine;
use checkout_flow::application::wallet::WalletScope;
use checkout_flow::config::FlowConfig;
use checkout_flow::domain::payment::{Amount, WalletRequest};
use checkout_flow::domain::ports::{PaymentMethodKind, RegistryBox};
use checkout_flow::domain::state::{Field, PresentationContext};
use checkout_flow::error::{ExternalSurfaceError, FlowError};
use checkout_flow::infrastructure::in_memory::{
    RecordingHost, SandboxInteractor, SandboxWalletSheet, StaticPaymentMethodRegistry,
};
use checkout_flow::interfaces::csv::command_reader::{CommandKind, CommandReader, ScriptCommand};
use checkout_flow::interfaces::render::render_state;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script of flow commands (CSV with a `command,arg,value` header)
    script: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// How the flow was reached; overrides the configuration
    #[arg(long, value_enum)]
    context: Option<ContextArg>,

    /// Payment method type to run, e.g. BANK_DEBIT or WALLET
    #[arg(long)]
    method: Option<String>,

    /// Log filter, e.g. `debug` or `checkout_flow=trace`. Defaults to RUST_LOG, then `info`.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ContextArg {
    Direct,
    FromSelection,
}

impl From<ContextArg> for PresentationContext {
    fn from(arg: ContextArg) -> Self {
        match arg {
            ContextArg::Direct => PresentationContext::Direct,
            ContextArg::FromSelection => PresentationContext::FromSelection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => FlowConfig::from_path(path).into_diagnostic()?,
        None => FlowConfig::default(),
    };
    if let Some(context) = cli.context {
        config.presentation_context = context.into();
    }
    if let Some(method) = cli.method {
        config.payment_method = method;
    }
    config.validate().into_diagnostic()?;

    let registry: RegistryBox = Box::new(StaticPaymentMethodRegistry::default());
    let method = registry
        .lookup(&config.payment_method)
        .ok_or_else(|| miette!("unknown payment method '{}'", config.payment_method))?;
    debug!(method = %method.display_name, "payment method resolved");

    let file = File::open(&cli.script).into_diagnostic()?;
    let commands = CommandReader::new(file).commands();
    let host = Arc::new(RecordingHost::new());
    let interactor = Arc::new(SandboxInteractor::new(config.sandbox.clone()));

    let final_state = match method.kind {
        PaymentMethodKind::BankDebit => {
            let scope = FlowStateMachine::new(
                interactor,
                host.clone(),
                config.presentation_context,
            );
            for command in commands {
                match command {
                    Ok(command) => run_bank_command(&scope, command).await,
                    Err(e) => eprintln!("Error reading command: {}", e),
                }
                debug!(screen = %render_state(&scope.customization(), &scope.current_state()), "rendered");
            }
            to_json(&scope.current_state())?
        }
        PaymentMethodKind::Wallet => {
            let request = WalletRequest {
                merchant_name: config
                    .sandbox
                    .terms_template_name
                    .clone()
                    .unwrap_or_else(|| "Merchant".to_string()),
                amount: Amount::new(config.sandbox.amount).into_diagnostic()?,
                currency_code: config.sandbox.currency.clone(),
                country_code: config.sandbox.country.clone(),
            };
            let scope = WalletScope::new(
                Arc::new(SandboxWalletSheet::from_config(&config.sandbox)),
                interactor,
                host.clone(),
                request,
                config.presentation_context,
                config.surface_timeout(),
            );
            for command in commands {
                match command {
                    Ok(command) => run_wallet_command(&scope, command).await,
                    Err(e) => eprintln!("Error reading command: {}", e),
                }
            }
            to_json(&scope.current_state())?
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{final_state}").into_diagnostic()?;
    for event in host.events() {
        writeln!(out, "{}", to_json(&event)?).into_diagnostic()?;
    }

    Ok(())
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).into_diagnostic()?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).into_diagnostic()
}

async fn run_bank_command(scope: &FlowStateMachine, command: ScriptCommand) {
    debug!(?command, "running command");
    match command.command {
        CommandKind::Start => scope.start().await,
        CommandKind::Update => {
            let field = command.arg.as_deref().unwrap_or_default();
            match field.parse::<Field>() {
                Ok(field) => scope.update_field(field, command.value.unwrap_or_default()),
                Err(e) => eprintln!("Error processing command: {}", e),
            }
        }
        CommandKind::Submit => scope.submit_primary_details().await,
        CommandKind::CollectorSucceeded => {
            scope
                .on_secondary_credential_succeeded(command.arg.unwrap_or_default())
                .await
        }
        CommandKind::CollectorCancelled => scope.on_secondary_credential_cancelled().await,
        CommandKind::CollectorFailed => {
            scope
                .on_secondary_credential_failed(collector_error(command.arg, command.value))
                .await
        }
        CommandKind::Accept => scope.accept_terms().await,
        CommandKind::Decline => scope.decline_terms(),
        CommandKind::Cancel => scope.cancel(),
        CommandKind::Back => scope.on_back(),
        CommandKind::Pay => eprintln!(
            "Error processing command: {}",
            FlowError::Unsupported("pay is only available for wallet payments")
        ),
    }
}

async fn run_wallet_command(scope: &WalletScope, command: ScriptCommand) {
    debug!(?command, "running command");
    match command.command {
        CommandKind::Start => scope.start(),
        CommandKind::Pay => scope.pay().await,
        CommandKind::Cancel => scope.cancel(),
        CommandKind::Back => scope.on_back(),
        other => eprintln!(
            "Error processing command: {} ({:?})",
            FlowError::Unsupported("command not available for wallet payments"),
            other
        ),
    }
}

fn collector_error(code: Option<String>, detail: Option<String>) -> ExternalSurfaceError {
    match code {
        Some(code) => ExternalSurfaceError::RuntimeError {
            code,
            detail: detail.unwrap_or_default(),
        },
        None => ExternalSurfaceError::ProtocolError(
            detail.unwrap_or_else(|| "collector failed".to_string()),
        ),
    }
}
