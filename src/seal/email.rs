//! Seal-and-email: a pre-filled `mailto:` link for submitting a sealed report.

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const DEFAULT_RECIPIENT: &str = "submissions@verum-foundation.org";

/// RFC 3986 unreserved characters stay readable
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl SubmissionEmail {
    pub fn new(
        recipient: &str,
        document_hash: &str,
        sent_at: DateTime<Utc>,
        evidence_names: &[String],
    ) -> Self {
        let files = if evidence_names.is_empty() {
            "N/A".to_string()
        } else {
            evidence_names.join(", ")
        };

        let body = format!(
            "Please find the sealed forensic report attached.\n\n\
             --- Sealing Metadata ---\n\
             Certified SHA-512 Hash: {}\n\
             Timestamp (UTC): {}\n\
             Case Files Analyzed: {}\n\
             ---\n\n\
             This report has been certified by Verum Omnis V5. Please do not modify the attached file to preserve the integrity of the hash.\n\n\
             Regards,\n\
             Verum Omnis User\n",
            document_hash,
            sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            files
        );

        Self {
            recipient: recipient.to_string(),
            subject: format!(
                "Verum Omnis Sealed Report Submission - Case ID {}",
                sent_at.timestamp_millis()
            ),
            body,
        }
    }

    pub fn mailto_uri(&self) -> String {
        format!(
            "mailto:{}?subject={}&body={}",
            self.recipient,
            utf8_percent_encode(&self.subject, COMPONENT),
            utf8_percent_encode(&self.body, COMPONENT)
        )
    }
}

/// Hand a URI to the platform opener (default mail client for `mailto:`)
pub fn open_uri(uri: &str) -> std::io::Result<()> {
    let command = if cfg!(target_os = "macos") {
        duct::cmd!("open", uri)
    } else if cfg!(target_os = "windows") {
        duct::cmd!("cmd", "/C", "start", "", uri)
    } else {
        duct::cmd!("xdg-open", uri)
    };
    command.stdout_null().stderr_null().start()?;
    Ok(())
}
