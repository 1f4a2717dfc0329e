//! Export of campaign messages.
//!
//! Messages (joined with their recipient) can be written as plain text, CSV
//! or a JSON array, either to a file or to any writer such as stdout.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use csv::Writer;

use crate::error::Result;
use crate::models::{CampaignMessageView, OutputFormat};

const TIME_FORMAT: &str = "%b %d, %Y %r";

fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format(TIME_FORMAT).to_string()).unwrap_or_default()
}

/// Write messages to a file in the specified format, creating parent
/// directories as needed.
pub fn write_messages_to_file(messages: &[CampaignMessageView], format: OutputFormat, file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    let file = File::create(file_path)?;
    write_messages(messages, format, BufWriter::new(file))
}

/// Write messages to `writer` in the specified format.
pub fn write_messages<W: Write>(messages: &[CampaignMessageView], format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Txt => write_txt(messages, writer),
        OutputFormat::Csv => write_csv(messages, writer),
        OutputFormat::Json => write_json(messages, writer),
    }
}

/// Format: `phone, message_type, status, sent time, text` with a blank line
/// between messages.
fn write_txt<W: Write>(messages: &[CampaignMessageView], mut writer: W) -> Result<()> {
    for view in messages {
        writeln!(
            writer,
            "{}, {}, {}, {}, {}",
            view.phone,
            view.message.message_type,
            view.message.status.as_str(),
            format_time(view.message.sent_time),
            view.message.message_text
        )?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_csv<W: Write>(messages: &[CampaignMessageView], writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record([
        "ID",
        "Phone",
        "First Name",
        "Company",
        "Type",
        "Status",
        "Scheduled",
        "Sent",
        "Message",
    ])?;

    for view in messages {
        let message = &view.message;
        writer.write_record([
            message.id.to_string().as_str(),
            view.phone.as_str(),
            view.first_name.as_deref().unwrap_or_default(),
            view.company.as_deref().unwrap_or_default(),
            message.message_type.to_string().as_str(),
            message.status.as_str(),
            format_time(message.scheduled_time).as_str(),
            format_time(message.sent_time).as_str(),
            message.message_text.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_json<W: Write>(messages: &[CampaignMessageView], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, messages)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignMessage, MessageStatus, MessageType};

    fn view(id: i64, text: &str) -> CampaignMessageView {
        CampaignMessageView {
            message: CampaignMessage {
                id,
                campaign_id: 1,
                contact_id: id,
                message_type: MessageType::Followup(1),
                status: MessageStatus::Stored,
                message_text: text.to_string(),
                scheduled_time: None,
                sent_time: None,
            },
            phone: format!("+1555000{id}"),
            first_name: Some("Ann".to_string()),
            company: None,
        }
    }

    #[test]
    fn test_txt_output_separates_messages() {
        let mut out = Vec::new();
        write_messages(&[view(1, "Hi"), view(2, "Yo")], OutputFormat::Txt, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "+15550001, followup_1, stored, , Hi\n\n+15550002, followup_1, stored, , Yo\n\n");
    }

    #[test]
    fn test_csv_output_quotes_commas() {
        let mut out = Vec::new();
        write_messages(&[view(1, "Hi, Ann")], OutputFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("ID,Phone,First Name,Company,Type,Status,Scheduled,Sent,Message\n"));
        assert!(text.contains("\"Hi, Ann\""));
    }

    #[test]
    fn test_json_output_is_flat() {
        let mut out = Vec::new();
        write_messages(&[view(1, "Hi")], OutputFormat::Json, &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed[0]["message_type"], "followup_1");
        assert_eq!(parsed[0]["phone"], "+15550001");
    }
}
