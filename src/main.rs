use clap::Parser;
use enrollpay::application::checkout::CheckoutService;
use enrollpay::application::enrollment::EnrollmentWriter;
use enrollpay::application::verification::VerificationOrchestrator;
use enrollpay::config::Settings;
use enrollpay::domain::ports::{EnrollmentStoreBox, TransactionStoreBox};
use enrollpay::infrastructure::http_gateway::HttpPaymentGateway;
use enrollpay::infrastructure::in_memory::{InMemoryEnrollmentStore, InMemoryTransactionStore};
use enrollpay::interfaces::csv::event_reader::{EventReader, EventType};
use enrollpay::interfaces::csv::outcome_writer::OutcomeWriter;
use enrollpay::logging;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payment events CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Base URL of the payment gateway API (overrides ENROLLPAY_GATEWAY_URL)
    #[arg(long)]
    gateway_url: Option<String>,

    /// Gateway secret key (overrides ENROLLPAY_GATEWAY_SECRET)
    #[arg(long)]
    gateway_secret: Option<String>,

    /// Gateway request timeout in seconds (overrides ENROLLPAY_GATEWAY_TIMEOUT_SECS)
    #[arg(long)]
    gateway_timeout_secs: Option<u64>,
}

type Stores = (TransactionStoreBox, TransactionStoreBox, EnrollmentStoreBox);

fn in_memory_stores() -> Stores {
    let transactions = InMemoryTransactionStore::new();
    (
        Box::new(transactions.clone()),
        Box::new(transactions),
        Box::new(InMemoryEnrollmentStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use enrollpay::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            Ok((
                Box::new(store.clone()),
                Box::new(store.clone()),
                Box::new(store),
            ))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not \
             enabled. Falling back to in-memory storage."
        );
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let mut settings = Settings::from_env().into_diagnostic()?;
    if let Some(url) = cli.gateway_url {
        settings.gateway_url = url;
    }
    if let Some(secret) = cli.gateway_secret {
        settings.gateway_secret = secret;
    }
    if let Some(secs) = cli.gateway_timeout_secs {
        settings.gateway_timeout = Duration::from_secs(secs);
    }
    settings.validate().into_diagnostic()?;

    let (checkout_store, verification_store, enrollment_store) = open_stores(cli.db_path)?;

    let gateway = HttpPaymentGateway::new(
        &settings.gateway_url,
        settings.gateway_secret.clone(),
        settings.gateway_timeout,
    )
    .into_diagnostic()?;
    let lease = chrono::Duration::from_std(settings.verification_lease).into_diagnostic()?;

    let checkout = CheckoutService::new(checkout_store)
        .with_reference_prefix(settings.reference_prefix.clone());
    let orchestrator = VerificationOrchestrator::new(
        verification_store,
        EnrollmentWriter::new(enrollment_store),
        Box::new(gateway),
    )
    .with_verification_lease(lease);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    for event in reader.events() {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                error!("Error reading event: {}", e);
                continue;
            }
        };

        match event.r#type {
            EventType::Checkout => {
                let initialized = match event.checkout_details() {
                    Ok((user, course, amount, currency)) => {
                        checkout
                            .initialize_with_reference(
                                &event.reference,
                                user,
                                course,
                                amount,
                                currency,
                            )
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = initialized {
                    error!("Error initializing checkout {}: {}", event.reference, e);
                }
            }
            EventType::Callback | EventType::Webhook => {
                match orchestrator.verify(&event.reference).await {
                    Ok(result) => writer
                        .write_outcome(&event.reference, event.r#type, &result)
                        .into_diagnostic()?,
                    Err(e) => error!("Error verifying {}: {}", event.reference, e),
                }
            }
        }
    }

    Ok(())
}
