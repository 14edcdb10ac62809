//! CSV import/export helpers
//!
//! Contact rosters arrive as CSV with a phone column recognized
//! case-insensitively from a synonym set; name and email columns are
//! optional. Rows without a phone are skipped. Call exports stream back as
//! CSV with a stable header.

use dialflow_store::contacts::NewContact;
use dialflow_store::Call;
use tracing::debug;

const PHONE_SYNONYMS: &[&str] = &["phone", "phonenumber", "mobile", "telephone", "contactnumber"];
const NAME_SYNONYMS: &[&str] = &["name", "fullname", "contactname"];
const EMAIL_SYNONYMS: &[&str] = &["email", "emailaddress", "mail"];

/// Normalize a header for matching: lowercase, separators stripped.
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn find_column(headers: &csv::StringRecord, synonyms: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| synonyms.contains(&normalize_header(h).as_str()))
}

/// Parse a contact roster. Returns the parsed contacts and the number of
/// rows skipped for lacking a phone value.
pub fn parse_contacts_csv(bytes: &[u8]) -> Result<(Vec<NewContact>, usize), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let phone_col = find_column(&headers, PHONE_SYNONYMS);
    let name_col = find_column(&headers, NAME_SYNONYMS);
    let email_col = find_column(&headers, EMAIL_SYNONYMS);

    let mut contacts = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        let phone = phone_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let Some(phone) = phone else {
            skipped += 1;
            continue;
        };

        let mut contact = NewContact::with_phone(phone);
        contact.name = name_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        contact.email = email_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        contacts.push(contact);
    }

    debug!("Parsed {} contacts from CSV ({} skipped)", contacts.len(), skipped);
    Ok((contacts, skipped))
}

/// Render calls as a CSV document.
pub fn calls_to_csv(calls: &[Call]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "callSid",
        "conversationId",
        "campaignId",
        "to",
        "from",
        "status",
        "answeredBy",
        "terminatedBy",
        "terminationReason",
        "durationSecs",
        "attemptNumber",
        "startTime",
        "endTime",
    ])?;

    for call in calls {
        writer.write_record([
            call.call_sid.as_str(),
            call.conversation_id.as_deref().unwrap_or(""),
            call.campaign_id.as_deref().unwrap_or(""),
            call.to_number.as_str(),
            call.from_number.as_str(),
            call.status.as_str(),
            call.answered_by.map(|a| a.as_str()).unwrap_or(""),
            call.terminated_by.map(|t| t.as_str()).unwrap_or(""),
            call.termination_reason.as_deref().unwrap_or(""),
            &call.duration_secs.map(|d| d.to_string()).unwrap_or_default(),
            &call.attempt_number.to_string(),
            &call.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            &call.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    let bytes = writer.into_inner().expect("in-memory writer");
    Ok(String::from_utf8(bytes).expect("csv output is utf-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_column_synonyms() {
        for header in ["Phone", "phone_number", "MOBILE", "Contact Number", "Telephone"] {
            let csv = format!("{header},Name\n+15551110001,Ada\n");
            let (contacts, skipped) = parse_contacts_csv(csv.as_bytes()).unwrap();
            assert_eq!(contacts.len(), 1, "header {header} not recognized");
            assert_eq!(contacts[0].phone_number, "+15551110001");
            assert_eq!(skipped, 0);
        }
    }

    #[test]
    fn test_rows_without_phone_are_skipped() {
        let csv = "phone,name,email\n+15551110001,Ada,ada@example.com\n,NoPhone,\n+15551110002,,\n";
        let (contacts, skipped) = parse_contacts_csv(csv.as_bytes()).unwrap();
        assert_eq!(contacts.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(contacts[0].name.as_deref(), Some("Ada"));
        assert_eq!(contacts[0].email.as_deref(), Some("ada@example.com"));
        assert!(contacts[1].name.is_none());
    }

    #[test]
    fn test_no_phone_column_skips_everything() {
        let csv = "name,email\nAda,ada@example.com\n";
        let (contacts, skipped) = parse_contacts_csv(csv.as_bytes()).unwrap();
        assert!(contacts.is_empty());
        assert_eq!(skipped, 1);
    }
}
