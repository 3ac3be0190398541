#![allow(missing_docs)]

//! PaperSentry — zero-trust exam paper access control.
//!
//! `start` runs a scripted end-to-end demonstration against the local
//! store: enrollment, sealing, the dynamic-key unlock workflow, and a
//! monitored editing session terminated by a simulated camera
//! obstruction.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use papersentry::config::Config;
use papersentry::monitor::camera::{Camera, FrameSource, SyntheticCamera};
use papersentry::monitor::SAMPLE_INTERVAL;
use papersentry::oracle::gemini::GeminiOracle;
use papersentry::oracle::resilient::{MonitorFailurePolicy, ResilientOracle};
use papersentry::oracle::sim::SimulatedOracle;
use papersentry::oracle::VerdictOracle;
use papersentry::session::{LoginAttempt, SessionController};
use papersentry::store::{JsonFileRepository, Repository};
use papersentry::types::{User, UserRole};
use papersentry::{logging, store};

/// Demo OTP "delivered" out of band; mirrors the login pipeline.
const DEMO_OTP: &str = "882931";
const DEMO_PASSWORD: &str = "sentry-demo-pass";

const AUTHORISER_EMAIL: &str = "authoriser@papersentry.local";
const SETTER_EMAIL: &str = "demo.setter@papersentry.local";

#[derive(Parser)]
#[command(name = "papersentry", about = "Zero-trust exam paper access control")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the end-to-end demonstration scenario.
    Start,
    /// Manage the identity whitelist.
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },
    /// Show recent audit log entries.
    Logs {
        /// Maximum entries to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum WhitelistAction {
    /// Authorize a new identity.
    Add { email: String },
    /// List authorized identities.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    let data_dir = config.resolved_data_dir()?;

    match cli.command {
        Command::Start => {
            let _guard = logging::init_production(&data_dir.join("logs"))?;
            run_start(&config, &data_dir).await
        }
        Command::Whitelist { action } => {
            logging::init_cli();
            let repo = open_repo(&data_dir)?;
            run_whitelist(repo, action).await
        }
        Command::Logs { limit } => {
            logging::init_cli();
            let repo = open_repo(&data_dir)?;
            run_logs(repo, limit).await
        }
    }
}

fn open_repo(data_dir: &std::path::Path) -> Result<Arc<JsonFileRepository>> {
    Ok(Arc::new(JsonFileRepository::open(data_dir.join("store"))?))
}

fn build_oracle(config: &Config, repo: Arc<dyn Repository>) -> Result<Arc<dyn VerdictOracle>> {
    let remote: Option<Arc<dyn VerdictOracle>> = match &config.oracle.api_key {
        Some(key) => {
            info!("remote verdict oracle configured");
            Some(Arc::new(GeminiOracle::new(
                key.clone(),
                config.oracle.timeout(),
            )?))
        }
        None => {
            info!("no API key configured, verdict oracle running in simulation");
            None
        }
    };
    let policy = if config.oracle.fail_closed_monitoring {
        MonitorFailurePolicy::FailClosed
    } else {
        MonitorFailurePolicy::FailOpen
    };
    Ok(Arc::new(ResilientOracle::new(
        remote,
        SimulatedOracle::new(repo),
        policy,
    )))
}

async fn login_as(
    controller: &SessionController,
    email: &str,
    role: UserRole,
    frame_b64: String,
) -> Result<User> {
    controller
        .login(LoginAttempt {
            email: email.to_owned(),
            role,
            password: DEMO_PASSWORD.to_owned(),
            otp: DEMO_OTP.to_owned(),
            face_frame_b64: frame_b64,
        })
        .await
        .with_context(|| format!("login failed for {email}"))
}

async fn run_start(config: &Config, data_dir: &std::path::Path) -> Result<()> {
    let repo = open_repo(data_dir)?;
    let oracle = build_oracle(config, repo.clone())?;
    let controller = Arc::new(SessionController::new(repo.clone(), oracle));
    controller.identity().seed_defaults().await?;

    let camera = SyntheticCamera::new(160);
    let mut source = camera
        .open()
        .await
        .map_err(|e| anyhow::anyhow!("demo camera failed to open: {e}"))?;
    let frame = source
        .capture()
        .await
        .map_err(|e| anyhow::anyhow!("demo camera failed to capture: {e}"))?;
    let frame_b64 = frame.to_base64();
    drop(source);

    // A setter authors and seals a paper.
    let setter = login_as(&controller, SETTER_EMAIL, UserRole::Setter, frame_b64.clone()).await?;
    let paper = controller.vault().create_paper(&setter).await?;
    controller
        .vault()
        .save(
            &paper.id,
            "Mathematics Paper 1".to_owned(),
            "Q1. State the fundamental theorem of calculus.".to_owned(),
            None,
        )
        .await?;
    controller.vault().seal(&paper.id, &setter.id).await?;
    info!(paper = %paper.id, watermark = %paper.watermark_id, "paper sealed");

    // Sealed papers need a two-party unlock: the setter files a request.
    let request = controller
        .unlock_engine()
        .request_unlock(&paper.id, &setter.id)
        .await?;
    controller.logout().await;

    // The authoriser reviews and approves, minting a one-time key.
    let authoriser = login_as(
        &controller,
        AUTHORISER_EMAIL,
        UserRole::Authoriser,
        frame_b64.clone(),
    )
    .await?;
    let approved = controller
        .unlock_engine()
        .approve_request(&request.id, &authoriser.id)
        .await?;
    let key = approved
        .dynamic_key
        .clone()
        .context("approved request carries a key")?;
    info!(request = %approved.id, key = %key, "unlock request approved");
    controller.logout().await;

    // The setter redeems the key and edits under live monitoring.
    login_as(&controller, SETTER_EMAIL, UserRole::Setter, frame_b64).await?;
    controller.redeem_key(&paper.id, &key).await?;
    controller.begin_editing(&paper.id, &camera).await?;
    info!("editing session open, monitoring active");

    // Let a couple of clean sampling cycles pass, then cover the lens.
    tokio::time::sleep(SAMPLE_INTERVAL.saturating_mul(2)).await;
    info!("simulating camera obstruction");
    camera.obstruction_switch().store(true, Ordering::Relaxed);

    let forced_out = tokio::time::timeout(Duration::from_secs(15), async {
        while controller.current_user().await.is_some() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await
    .is_ok();
    anyhow::ensure!(forced_out, "monitor did not terminate the session");
    info!("session forcibly terminated by the security monitor");

    run_logs(repo, 10).await
}

async fn run_whitelist(repo: Arc<JsonFileRepository>, action: WhitelistAction) -> Result<()> {
    match action {
        WhitelistAction::Add { email } => {
            let audit = papersentry::audit::AuditTrail::new(repo.clone());
            let registry =
                papersentry::identity::IdentityRegistry::new(repo, audit);
            registry
                .add_to_whitelist(papersentry::audit::SYSTEM_USER, &email)
                .await?;
            println!("{email} has been whitelisted.");
        }
        WhitelistAction::List => {
            for email in repo.whitelist().await? {
                println!("{email}");
            }
        }
    }
    Ok(())
}

async fn run_logs(repo: Arc<JsonFileRepository>, limit: usize) -> Result<()> {
    let logs = repo.audit_logs().await?;
    if logs.is_empty() {
        println!("audit log is empty (retention cap {})", store::MAX_AUDIT_ENTRIES);
        return Ok(());
    }
    for entry in logs.iter().take(limit) {
        println!(
            "{} [{:?}/{:?}] {}: {}",
            entry.timestamp.to_rfc3339(),
            entry.kind,
            entry.severity,
            entry.user_id,
            entry.details
        );
    }
    Ok(())
}
