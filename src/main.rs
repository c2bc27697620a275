use std::sync::Arc;

use job_mail_tracker::config::TrackerConfig;
use job_mail_tracker::llm::create_provider;
use job_mail_tracker::mail::credentials::{load_credential, save_credential};
use job_mail_tracker::mail::{GmailSource, GoogleTokenRefresher, MailSource};
use job_mail_tracker::pipeline::Pipeline;
use job_mail_tracker::pipeline::classifier::Classifier;
use job_mail_tracker::pipeline::extractor::Extractor;
use job_mail_tracker::pipeline::reconciler::Reconciler;
use job_mail_tracker::store::{NotionStore, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TrackerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: OPENAI_API_KEY, NOTION_API_KEY, NOTION_DATABASE_ID,");
        eprintln!("            GMAIL_CLIENT_ID, GMAIL_CLIENT_SECRET");
        std::process::exit(1);
    });

    eprintln!("📬 Job Mail Tracker v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Classifier model: {}", config.classifier.model);
    eprintln!("   Extractor model: {}", config.extractor.model);
    eprintln!("   Notion database: {}", config.notion_database_id);
    eprintln!("   Max messages: {}\n", config.max_messages);

    // ── Mail ────────────────────────────────────────────────────────────
    let cached = load_credential(&config.gmail_token_path).await?;
    if cached.is_some() {
        eprintln!("   Token cache: {}", config.gmail_token_path.display());
    }
    let credential = config.gmail_credential(cached)?;
    let gmail = Arc::new(GmailSource::new(
        credential,
        Arc::new(GoogleTokenRefresher::new()),
    ));
    let mail: Arc<dyn MailSource> = gmail.clone();

    // ── Models ──────────────────────────────────────────────────────────
    let classifier = Classifier::new(create_provider(&config.classifier)?);
    let extractor = Extractor::new(create_provider(&config.extractor)?);

    // ── Store ───────────────────────────────────────────────────────────
    let store: Arc<dyn RecordStore> = Arc::new(NotionStore::new(
        config.notion_api_key.clone(),
        config.notion_database_id.clone(),
    ));
    let reconciler = Reconciler::new(store, &config.notion_database_id);

    let pipeline = Pipeline::new(mail, classifier, extractor, reconciler);
    let batch = pipeline.process(config.max_messages).await;

    // Persist whatever the refresher handed out during the run.
    if let Err(e) = save_credential(&config.gmail_token_path, &gmail.current_credential().await).await {
        tracing::warn!(error = %e, "Failed to write token cache");
    }

    let counts = batch.counts();
    eprintln!(
        "\n   Processed {} message(s): {} created, {} updated, {} irrelevant, {} unparseable, {} failed",
        batch.total(),
        counts.created,
        counts.updated,
        counts.skipped_irrelevant,
        counts.skipped_extraction_failed,
        counts.failed,
    );

    Ok(())
}
