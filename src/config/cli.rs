use crate::domain::model::{CampaignId, RecipientId};
use crate::utils::error::{MailerError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bulk-mailer")]
#[command(about = "Send one campaign to a recipient list with pacing, retries and progress")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "mailer.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a campaign
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        subject: String,
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Add recipients given as `email` or `email,name`
    Add {
        #[arg(long)]
        campaign: CampaignId,
        #[arg(required = true)]
        recipients: Vec<String>,
    },
    /// List campaigns with their recorded counts
    List,
    /// Dispatch a campaign
    Send {
        #[arg(long)]
        campaign: CampaignId,
        /// Also resend recipients that failed in an earlier run
        #[arg(long)]
        retry_failed: bool,
        /// Show what would be sent without contacting the mail server
        #[arg(long)]
        dry_run: bool,
    },
    /// Recount and print a campaign's aggregates
    Stats {
        #[arg(long)]
        campaign: CampaignId,
    },
    /// Record that a recipient responded
    Responded {
        #[arg(long)]
        recipient: RecipientId,
    },
}

/// `email` 或 `email,name`
pub fn parse_recipient_arg(arg: &str) -> Result<(String, Option<String>)> {
    let (email, name) = match arg.split_once(',') {
        Some((email, name)) => (email.trim(), Some(name.trim())),
        None => (arg.trim(), None),
    };
    if email.is_empty() {
        return Err(MailerError::InvalidConfigValueError {
            field: "recipients".to_string(),
            value: arg.to_string(),
            reason: "Recipient email cannot be empty".to_string(),
        });
    }
    Ok((
        email.to_string(),
        name.filter(|n| !n.is_empty()).map(str::to_string),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_command() {
        let cli = Cli::parse_from([
            "bulk-mailer",
            "--config",
            "custom.toml",
            "send",
            "--campaign",
            "3",
            "--retry-failed",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Command::Send {
                campaign,
                retry_failed,
                dry_run,
            } => {
                assert_eq!(campaign, 3);
                assert!(retry_failed);
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_create_requires_a_body() {
        assert!(Cli::try_parse_from(["bulk-mailer", "create", "--name", "n", "--subject", "s"]).is_err());
        assert!(Cli::try_parse_from([
            "bulk-mailer", "create", "--name", "n", "--subject", "s", "--body", "b"
        ])
        .is_ok());
    }

    #[test]
    fn test_parse_recipient_arg() {
        assert_eq!(
            parse_recipient_arg("ann@example.com, Ann Lee").unwrap(),
            ("ann@example.com".to_string(), Some("Ann Lee".to_string()))
        );
        assert_eq!(
            parse_recipient_arg("bob@example.com").unwrap(),
            ("bob@example.com".to_string(), None)
        );
        assert_eq!(
            parse_recipient_arg("carl@example.com,").unwrap(),
            ("carl@example.com".to_string(), None)
        );
        assert!(parse_recipient_arg(" ,name").is_err());
    }
}
