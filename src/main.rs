use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use sponsorpay::application::effects::DomainEffects;
use sponsorpay::application::reconciler::ReconciliationEngine;
use sponsorpay::application::service::{InitializeRequest, PaymentService};
use sponsorpay::application::webhook::WebhookIngress;
use sponsorpay::config::{GlobalArgs, Settings};
use sponsorpay::domain::history::{DEFAULT_PER_PAGE, HistoryQuery};
use sponsorpay::domain::payment::{PaymentStatus, TargetType};
use sponsorpay::domain::ports::{
    AdoptionRepositoryRef, ExpiringKeyStoreRef, PaymentLedgerRef, ProjectRepositoryRef,
    StatsRepositoryRef,
};
use sponsorpay::infrastructure::gateway::{HttpGateway, WebhookVerifier};
use sponsorpay::infrastructure::in_memory::{
    InMemoryAdoptionRepository, InMemoryExpiringKeys, InMemoryPaymentLedger,
    InMemoryProjectRepository, InMemoryStatsRepository,
};
use sponsorpay::interfaces::csv::payment_writer::PaymentWriter;
use sponsorpay::interfaces::csv::seed_reader::SeedReader;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a pending payment and open a gateway checkout for it
    Initialize {
        #[arg(long)]
        payer: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "KES")]
        currency: String,
        /// adoption-funding, project-backing or visit-fee
        #[arg(long = "type")]
        payment_type: String,
        #[arg(long)]
        target: String,
        /// Free-form JSON stored with the payment
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Ask the gateway for a payment's outcome and reconcile it
    Verify { reference: String },
    /// Process one signed webhook delivery
    Webhook {
        /// File holding the raw request body, `-` for stdin
        #[arg(long)]
        body: PathBuf,
        /// Hex signature header sent by the gateway
        #[arg(long)]
        signature: String,
    },
    /// Export payment history as CSV
    History {
        #[arg(long)]
        payer: Option<String>,
        #[arg(long)]
        status: Option<PaymentStatus>,
        #[arg(long = "type")]
        target_type: Option<TargetType>,
        /// RFC 3339, inclusive
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// RFC 3339, exclusive
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Load projects and adoptions from CSV files
    Seed {
        #[arg(long)]
        projects: Option<PathBuf>,
        #[arg(long)]
        adoptions: Option<PathBuf>,
    },
    /// Drop expired webhook delivery keys
    Sweep,
}

struct Stores {
    ledger: PaymentLedgerRef,
    adoptions: AdoptionRepositoryRef,
    projects: ProjectRepositoryRef,
    stats: StatsRepositoryRef,
    deliveries: ExpiringKeyStoreRef,
}

impl Stores {
    fn in_memory() -> Self {
        Self {
            ledger: Arc::new(InMemoryPaymentLedger::new()),
            adoptions: Arc::new(InMemoryAdoptionRepository::new()),
            projects: Arc::new(InMemoryProjectRepository::new()),
            stats: Arc::new(InMemoryStatsRepository::new()),
            deliveries: Arc::new(InMemoryExpiringKeys::new()),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn open(db_path: Option<&Path>) -> Result<Self> {
        let Some(db_path) = db_path else {
            return Ok(Self::in_memory());
        };
        let store = sponsorpay::infrastructure::rocksdb::RocksDBStore::open(db_path)
            .into_diagnostic()?;
        info!(path = %db_path.display(), "Using RocksDB storage");
        Ok(Self {
            ledger: Arc::new(store.clone()),
            adoptions: Arc::new(store.clone()),
            projects: Arc::new(store.clone()),
            stats: Arc::new(store.clone()),
            deliveries: Arc::new(store),
        })
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn open(db_path: Option<&Path>) -> Result<Self> {
        if db_path.is_some() {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
        Ok(Self::in_memory())
    }

    fn engine(&self) -> Arc<ReconciliationEngine> {
        let effects = DomainEffects::new(
            self.adoptions.clone(),
            self.projects.clone(),
            self.stats.clone(),
        );
        Arc::new(ReconciliationEngine::new(self.ledger.clone(), Arc::new(effects)))
    }

    fn service(&self, settings: &Settings) -> Result<PaymentService> {
        let gateway = HttpGateway::new(&settings.gateway).into_diagnostic()?;
        Ok(PaymentService::new(
            self.ledger.clone(),
            Arc::new(gateway),
            self.engine(),
            settings.fees,
        )
        .with_callback_url(settings.gateway.callback_url.clone()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn read_body(path: &Path) -> io::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        io::Read::read_to_end(&mut io::stdin().lock(), &mut body)?;
        Ok(body)
    } else {
        std::fs::read(path)
    }
}

#[derive(Serialize)]
struct SeedSummary {
    projects: usize,
    adoptions: usize,
    rejected: usize,
}

async fn seed(
    stores: &Stores,
    projects: Option<PathBuf>,
    adoptions: Option<PathBuf>,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary {
        projects: 0,
        adoptions: 0,
        rejected: 0,
    };

    if let Some(path) = projects {
        let file = File::open(path).into_diagnostic()?;
        for row in SeedReader::new(file).projects() {
            match row {
                Ok(project) => {
                    stores.projects.store(project).await.into_diagnostic()?;
                    summary.projects += 1;
                }
                Err(e) => {
                    error!(error = %e, "Error reading project");
                    summary.rejected += 1;
                }
            }
        }
    }

    if let Some(path) = adoptions {
        let file = File::open(path).into_diagnostic()?;
        for row in SeedReader::new(file).adoptions() {
            match row {
                Ok(adoption) => {
                    stores.adoptions.store(adoption).await.into_diagnostic()?;
                    summary.adoptions += 1;
                }
                Err(e) => {
                    error!(error = %e, "Error reading adoption");
                    summary.rejected += 1;
                }
            }
        }
    }

    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_args(&cli.global).into_diagnostic()?;
    let stores = Stores::open(cli.global.db_path.as_deref())?;

    match cli.command {
        Command::Initialize {
            payer,
            email,
            amount,
            currency,
            payment_type,
            target,
            metadata,
        } => {
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw).into_diagnostic()?,
                None => serde_json::Value::Null,
            };
            let request = InitializeRequest {
                payer_id: payer,
                payer_email: email,
                amount,
                currency,
                payment_type,
                target_ref: target,
                metadata,
            };
            let initialized = stores
                .service(&settings)?
                .initialize(request)
                .await
                .into_diagnostic()?;
            print_json(&initialized)?;
        }
        Command::Verify { reference } => {
            let response = match stores.service(&settings)?.verify(&reference).await {
                Ok(response) => response,
                Err(e) => {
                    if e.is_retryable() {
                        warn!(reference = %reference, "{}", e.user_message());
                    }
                    return Err(e).into_diagnostic();
                }
            };
            print_json(&response)?;
        }
        Command::Webhook { body, signature } => {
            let Some(secret) = cli.global.gateway_secret.as_deref() else {
                return Err(miette::miette!(
                    "a gateway secret is required to check webhook signatures"
                ));
            };
            let verifier = WebhookVerifier::new(secret).into_diagnostic()?;
            let raw = read_body(&body).into_diagnostic()?;
            let ingress = WebhookIngress::new(
                Arc::new(verifier),
                stores.engine(),
                stores.deliveries.clone(),
            )
            .with_dedup_ttl(settings.webhook_dedup_ttl);
            let ack = ingress.receive(&raw, &signature).await.into_diagnostic()?;
            print_json(&ack)?;
        }
        Command::History {
            payer,
            status,
            target_type,
            since,
            until,
            page,
            per_page,
        } => {
            let query = HistoryQuery {
                payer_id: payer,
                status,
                target_type,
                since,
                until,
                page,
                per_page,
            };
            let page = stores.ledger.query(&query).await.into_diagnostic()?;
            info!(
                total = page.total,
                page = page.page,
                per_page = page.per_page,
                "Exporting payment history"
            );
            let stdout = io::stdout();
            let mut writer = PaymentWriter::new(stdout.lock());
            writer.write_payments(&page.items).into_diagnostic()?;
        }
        Command::Seed {
            projects,
            adoptions,
        } => {
            let summary = seed(&stores, projects, adoptions).await?;
            print_json(&summary)?;
        }
        Command::Sweep => {
            let removed = stores.deliveries.sweep_expired().await.into_diagnostic()?;
            info!(removed, "Swept expired delivery keys");
            print_json(&serde_json::json!({ "removed": removed }))?;
        }
    }

    Ok(())
}
