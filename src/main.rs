use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use txt_campaign::config::AppConfig;
use txt_campaign::file_writer::write_messages;
use txt_campaign::logging::init_logging;
use txt_campaign::models::{CampaignUpdate, NewCampaign, OutputFormat};
use txt_campaign::service::CampaignService;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log instead of sending messages
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import contacts from a CSV file as a new batch
    Upload {
        /// Path to the CSV file
        file: PathBuf,

        /// Name recorded for the batch (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List all contacts, newest first
    Contacts,
    /// List upload batches
    Batches,
    /// Preview the first and last contacts of a batch row range
    Preview {
        /// Batch id, or "null" for contacts uploaded without a batch
        #[arg(short, long)]
        batch: String,

        /// First row (1-based)
        #[arg(short, long)]
        start: i64,

        /// Last row (inclusive)
        #[arg(short, long)]
        end: i64,
    },
    /// List the placeholders a batch offers
    Placeholders {
        /// Batch id, or "null" for contacts uploaded without a batch
        #[arg(short, long)]
        batch: String,
    },
    /// Delete an upload batch and its contacts
    DeleteBatch {
        /// Batch id
        batch: String,
    },
    /// Manage campaigns
    Campaign {
        #[command(subcommand)]
        action: CampaignCommands,
    },
    /// Activate a draft campaign and send its initial messages
    Send {
        /// Campaign id
        campaign_id: i64,

        /// Seconds to wait between messages
        #[arg(short, long)]
        delay: Option<u64>,
    },
    /// Send a stored follow-up to contacts that have not responded
    SendFollowup {
        /// Campaign id
        campaign_id: i64,

        /// Follow-up number (1-based)
        #[arg(short, long)]
        number: i64,

        /// Seconds to wait between messages
        #[arg(short, long)]
        delay: Option<u64>,
    },
    /// Show or export the messages of a campaign
    Messages {
        /// Campaign id
        campaign_id: i64,

        /// Output format (txt, csv or json)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delivery counts per follow-up
    FollowupStatus {
        /// Campaign id
        campaign_id: i64,
    },
    /// Mark a contact as responded
    Responded {
        /// Contact id
        contact_id: i64,
    },
    /// Remove a contact from all campaigns by phone number
    Remove {
        /// Phone number
        phone: String,
    },
    /// Recently removed contacts
    Removed,
    /// Delete all contacts, campaigns and messages
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum CampaignCommands {
    /// Create a draft campaign
    Create {
        #[arg(short, long)]
        name: String,

        /// Initial message template
        #[arg(short, long)]
        message: String,

        /// Follow-up template; repeat for each follow-up
        #[arg(short, long = "followup")]
        followups: Vec<String>,

        /// Number of follow-ups (defaults to the number of templates)
        #[arg(long)]
        followup_count: Option<u32>,

        /// Batch to target
        #[arg(short, long)]
        batch: Option<String>,

        /// First row of the targeted range
        #[arg(long)]
        start: Option<i64>,

        /// Last row of the targeted range
        #[arg(long)]
        end: Option<i64>,
    },
    /// List campaigns
    List,
    /// Edit a campaign
    Update {
        /// Campaign id
        campaign_id: i64,

        #[arg(short, long)]
        name: Option<String>,

        /// Initial message template
        #[arg(short, long)]
        message: Option<String>,

        /// Follow-up template; repeat for each follow-up
        #[arg(short, long = "followup")]
        followups: Vec<String>,

        /// Number of follow-ups
        #[arg(long)]
        followup_count: Option<u32>,
    },
    /// Delete a campaign and its messages
    Delete {
        /// Campaign id
        campaign_id: i64,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("Failed to write output")?;
    writeln!(stdout)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load_from(cli.config.as_deref())?;
    if cli.dry_run {
        config.delivery.mode = "dry_run".to_string();
    }

    // Initialize logging
    let log_file = config.logging.file_path.as_deref().map(Path::new);
    init_logging(Some(&config.get_log_level()), &config.logging.format, log_file)?;

    info!("Starting txt-campaign");
    debug!(database = %config.get_database_url(), delivery = %config.delivery.mode, "Configuration loaded");

    if matches!(cli.command, Commands::Config) {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}", config.to_yaml()?)?;
        return Ok(());
    }

    let service = CampaignService::from_config(config)?;

    // Process command
    match cli.command {
        Commands::Upload { file, name } => {
            let summary = match name {
                Some(name) => {
                    let reader = std::fs::File::open(&file)
                        .with_context(|| format!("Failed to open {}", file.display()))?;
                    service.upload_csv(reader, Some(&name))?
                }
                None => service.upload_csv_file(&file)?,
            };
            print_json(&summary)?;
        }
        Commands::Contacts => print_json(&service.list_contacts()?)?,
        Commands::Batches => print_json(&service.list_batches()?)?,
        Commands::Preview { batch, start, end } => print_json(&service.preview_range(&batch, start, end)?)?,
        Commands::Placeholders { batch } => print_json(&service.batch_placeholders(&batch)?)?,
        Commands::DeleteBatch { batch } => {
            let deleted = service.delete_batch(&batch)?;
            print_json(&serde_json::json!({ "batch_id": batch, "deleted_contacts": deleted }))?;
        }
        Commands::Campaign { action } => run_campaign_command(&service, action)?,
        Commands::Send { campaign_id, delay } => print_json(&service.send_campaign(campaign_id, delay).await?)?,
        Commands::SendFollowup {
            campaign_id,
            number,
            delay,
        } => print_json(&service.send_followup(campaign_id, number, delay).await?)?,
        Commands::Messages {
            campaign_id,
            format,
            output,
        } => {
            let format: OutputFormat = format.parse()?;
            match output {
                Some(path) => {
                    let count = service.export_messages(campaign_id, format, &path)?;
                    info!("Wrote {} messages to {}", count, path.display());
                }
                None => write_messages(&service.campaign_messages(campaign_id)?, format, io::stdout().lock())?,
            }
        }
        Commands::FollowupStatus { campaign_id } => print_json(&service.followup_status(campaign_id)?)?,
        Commands::Responded { contact_id } => {
            service.mark_responded(contact_id)?;
            print_json(&serde_json::json!({ "contact_id": contact_id, "responded": true }))?;
        }
        Commands::Remove { phone } => {
            let removed = service.remove_contact(&phone)?;
            print_json(&serde_json::json!({ "phone": phone, "removed": removed }))?;
        }
        Commands::Removed => print_json(&service.removed_contacts()?)?,
        Commands::Clear { yes } => {
            anyhow::ensure!(yes, "Refusing to clear all data without --yes");
            print_json(&service.clear_all_data()?)?;
        }
        Commands::Config => {}
    }

    log_run_metrics(&service);
    Ok(())
}

fn run_campaign_command(service: &CampaignService, action: CampaignCommands) -> Result<()> {
    match action {
        CampaignCommands::Create {
            name,
            message,
            followups,
            followup_count,
            batch,
            start,
            end,
        } => {
            let request = NewCampaign {
                name,
                message,
                followup_messages: followups,
                followup_count,
                contact_batch_id: batch,
                range_start: start,
                range_end: end,
            };
            print_json(&service.create_campaign(request)?)
        }
        CampaignCommands::List => print_json(&service.list_campaigns()?),
        CampaignCommands::Update {
            campaign_id,
            name,
            message,
            followups,
            followup_count,
        } => {
            let update = CampaignUpdate {
                name,
                message,
                followup_messages: (!followups.is_empty()).then_some(followups),
                followup_count,
            };
            print_json(&service.update_campaign(campaign_id, update)?)
        }
        CampaignCommands::Delete { campaign_id } => {
            service.delete_campaign(campaign_id)?;
            print_json(&serde_json::json!({ "campaign_id": campaign_id, "deleted": true }))
        }
    }
}

fn log_run_metrics(service: &CampaignService) {
    let snapshot = service.metrics().snapshot();
    debug!(?snapshot, "Run metrics");
}
