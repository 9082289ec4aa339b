use anyhow::Context;
use bulk_mailer::adapters::sinks::TeeSink;
use bulk_mailer::config::cli::parse_recipient_arg;
use bulk_mailer::domain::ports::RecipientStore;
use bulk_mailer::utils::error::ErrorSeverity;
use bulk_mailer::utils::{logger, validation::Validate};
use bulk_mailer::{
    Campaign, ChannelSink, Cli, Command, DispatchEngine, DispatchJob, JsonFileStore, LogSink,
    MailerConfig, MailerError, ProgressEvent, SmtpTransport,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match MailerConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config.display(), e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.json_logs() {
        logger::init_json_logger(cli.verbose, config.log_level());
    } else {
        logger::init_cli_logger(cli.verbose, config.log_level());
    }
    tracing::debug!("CLI arguments: {:?}", cli);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = execute(cli.command, &config).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn execute(command: Command, config: &MailerConfig) -> Result<(), MailerError> {
    let store = JsonFileStore::open(&config.store.path).await?;

    match command {
        Command::Create {
            name,
            subject,
            body,
            body_file,
        } => {
            let body = match (body, body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => tokio::fs::read_to_string(&path).await?,
                (None, None) => {
                    return Err(MailerError::MissingConfigError {
                        field: "body".to_string(),
                    })
                }
            };
            let campaign = store.create_campaign(&name, &subject, &body).await?;
            println!("✅ Campaign '{}' created with id {}", campaign.name, campaign.id);
        }
        Command::Add {
            campaign,
            recipients,
        } => {
            let entries = recipients
                .iter()
                .map(|arg| parse_recipient_arg(arg))
                .collect::<Result<Vec<_>, _>>()?;
            let added = store.add_recipients(campaign, &entries).await?;
            store.recompute_aggregate(campaign).await?;
            println!("✅ Added {} recipients to campaign {}", added.len(), campaign);
        }
        Command::List => {
            for campaign in store.campaigns().await {
                let stats = store.recorded_aggregate(campaign.id).await.unwrap_or_default();
                println!(
                    "#{} {} [{}] created {}: {}",
                    campaign.id,
                    campaign.name,
                    campaign.subject,
                    campaign.created_at.format("%Y-%m-%d %H:%M"),
                    stats
                );
            }
        }
        Command::Stats { campaign } => {
            let stats = store.recompute_aggregate(campaign).await?;
            println!("📊 Campaign {}: {}", campaign, stats);
        }
        Command::Responded { recipient } => {
            store.mark_responded(recipient).await?;
            let row = store.recipient(recipient).await?;
            store.recompute_aggregate(row.campaign_id).await?;
            println!("✅ Recipient {} <{}> marked as responded", row.id, row.email);
        }
        Command::Send {
            campaign,
            retry_failed,
            dry_run,
        } => {
            let campaign = store.campaign(campaign).await?;
            let mut job = config.dispatch_job(&campaign)?;
            job.retry_failed |= retry_failed;

            if dry_run {
                return dry_run_report(&store, &campaign, &job, config).await;
            }
            send_campaign(store, job, config).await?;
        }
    }

    Ok(())
}

async fn send_campaign(
    store: JsonFileStore,
    job: DispatchJob,
    config: &MailerConfig,
) -> Result<(), MailerError> {
    let transport = SmtpTransport::new(config.smtp_settings()?)?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = DispatchEngine::new(store, transport, TeeSink(LogSink, ChannelSink::new(tx)));

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, finishing in-flight messages");
            cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::Status { stats, .. } = event {
                println!(
                    "📈 {}/{} done: {}",
                    stats.completed(),
                    stats.total,
                    stats
                );
            }
        }
    });

    let summary = engine.run(job).await?;
    drop(engine);
    if let Err(e) = printer.await.context("progress printer task") {
        tracing::warn!("{:#}", e);
    }

    println!("✅ {}", summary);
    if let Some(recorded) = summary.recorded {
        println!("📊 Recorded: {}", recorded);
    }
    Ok(())
}

async fn dry_run_report(
    store: &JsonFileStore,
    campaign: &Campaign,
    job: &DispatchJob,
    config: &MailerConfig,
) -> Result<(), MailerError> {
    let recipients = store.fetch_recipients(campaign.id).await?;
    let selected: Vec<_> = recipients
        .iter()
        .filter(|r| r.status.is_dispatchable(job.retry_failed))
        .collect();
    let invalid = selected
        .iter()
        .filter(|r| !bulk_mailer::core::address::is_valid_address(&r.email))
        .count();

    println!("🔍 Dry Run Analysis:");
    println!("  Campaign: #{} {} [{}]", campaign.id, campaign.name, campaign.subject);
    println!(
        "  SMTP: {}:{} (STARTTLS: {})",
        config.smtp.host, config.smtp.port, config.smtp.use_tls
    );
    println!("  Sender: {}", job.sender);
    println!(
        "  Recipients: {} selected of {} ({} would be marked invalid)",
        selected.len(),
        recipients.len(),
        invalid
    );
    println!(
        "  Pacing: {} workers, {}/s, {} retries, backoff unit {:?}",
        job.concurrency, job.rate_per_second, job.retry_attempts, job.backoff_unit
    );
    let attempts = selected.len() - invalid;
    println!(
        "  Minimum duration: {:.1}s",
        attempts.saturating_sub(1) as f64 / job.rate_per_second
    );
    Ok(())
}
