//! Output formatting for the CLI
//!
//! Every print function takes the output format as an explicit value; there
//! is no process-wide output mode.

use chrono::Local;
use gaggle_core::models::{
    AccountInfo, CalendarInfo, EmailDetail, EmailSummary, EventDetail, EventSummary,
    ScheduledEmail,
};
use gaggle_core::schedule::DispatchReport;
use serde::Serialize;

/// How command output is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print data as formatted JSON
pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(output) => println!("{}", output),
        Err(e) => eprintln!("Error formatting JSON: {}", e),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print an error message to stderr
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }
    let head: String = s.chars().take(max_len - 3).collect();
    format!("{}...", head)
}

fn or_dash(s: &str) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

/// Render rows as aligned columns with a separator under the header
fn render_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_line.join("  ").trim_end());

    let separators: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", separators.join("  "));

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// Print a list of emails
pub fn print_email_list(emails: &[EmailSummary], format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&emails);
        return;
    }

    if emails.is_empty() {
        println!("No emails found.");
        return;
    }

    let rows: Vec<Vec<String>> = emails
        .iter()
        .map(|e| {
            vec![
                truncate(&e.id, 16),
                truncate(&e.from, 30),
                truncate(&e.subject, 40),
                e.date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                or_dash(e.account.as_deref().unwrap_or("")),
            ]
        })
        .collect();
    render_table(&["ID", "FROM", "SUBJECT", "DATE", "ACCOUNT"], &rows);
}

/// Print detailed email information
pub fn print_email_detail(email: &EmailDetail, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&email);
        return;
    }

    println!("{}", "─".repeat(80));
    println!("ID:      {}", email.id);
    if let Some(account) = &email.account {
        println!("Account: {}", account);
    }
    println!("From:    {}", email.from);
    println!("To:      {}", email.to.join(", "));
    if !email.cc.is_empty() {
        println!("CC:      {}", email.cc.join(", "));
    }
    println!("Subject: {}", email.subject);
    println!(
        "Date:    {}",
        email.date.with_timezone(&Local).format("%a, %d %b %Y %H:%M:%S %Z")
    );
    if !email.attachments.is_empty() {
        println!("Attachments: {}", email.attachments.join(", "));
    }
    println!("{}", "─".repeat(80));
    println!();
    println!("{}", email.body);
    println!();
}

/// Print a list of calendar events
pub fn print_event_list(events: &[EventSummary], format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&events);
        return;
    }

    if events.is_empty() {
        println!("No events found.");
        return;
    }

    let rows: Vec<Vec<String>> = events
        .iter()
        .map(|e| {
            let (start, end) = if e.all_day {
                (
                    e.start.format("%Y-%m-%d").to_string(),
                    "All day".to_string(),
                )
            } else {
                (
                    e.start.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                    e.end.with_timezone(&Local).format("%H:%M").to_string(),
                )
            };
            vec![
                truncate(&e.id, 16),
                truncate(&e.summary, 35),
                start,
                end,
                or_dash(&truncate(e.location.as_deref().unwrap_or(""), 20)),
                or_dash(e.account.as_deref().unwrap_or("")),
            ]
        })
        .collect();
    render_table(
        &["ID", "SUMMARY", "START", "END", "LOCATION", "ACCOUNT"],
        &rows,
    );
}

/// Print detailed calendar event information
pub fn print_event_detail(event: &EventDetail, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&event);
        return;
    }

    println!("{}", "─".repeat(80));
    println!("ID:       {}", event.id);
    if let Some(account) = &event.account {
        println!("Account:  {}", account);
    }
    println!("Summary:  {}", event.summary);

    if event.all_day {
        println!("Date:     {} (All day)", event.start.format("%a, %d %b %Y"));
    } else {
        println!(
            "Start:    {}",
            event.start.with_timezone(&Local).format("%a, %d %b %Y %H:%M")
        );
        println!(
            "End:      {}",
            event.end.with_timezone(&Local).format("%a, %d %b %Y %H:%M")
        );
    }

    if let Some(location) = &event.location {
        println!("Location: {}", location);
    }
    println!("Status:   {}", event.status);
    if let Some(organizer) = &event.organizer {
        println!("Organizer: {}", organizer);
    }
    if !event.attendees.is_empty() {
        println!("Attendees: {}", event.attendees.join(", "));
    }
    if let Some(link) = &event.html_link {
        println!("Link:     {}", link);
    }
    println!("{}", "─".repeat(80));
    if let Some(description) = &event.description {
        println!();
        println!("{}", description);
        println!();
    }
}

/// Print a list of scheduled emails
pub fn print_scheduled_list(emails: &[ScheduledEmail], format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&emails);
        return;
    }

    if emails.is_empty() {
        println!("No scheduled emails found.");
        return;
    }

    let rows: Vec<Vec<String>> = emails
        .iter()
        .map(|e| {
            let status = if e.sent {
                "✅ Sent"
            } else if e.error.is_some() {
                "❌ Error"
            } else {
                "⏳ Pending"
            };
            vec![
                truncate(&e.id, 8),
                truncate(&e.to.join(", "), 25),
                truncate(&e.subject, 30),
                e.scheduled_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
                status.to_string(),
                e.account.clone(),
            ]
        })
        .collect();
    render_table(
        &["ID", "TO", "SUBJECT", "SCHEDULED FOR", "STATUS", "ACCOUNT"],
        &rows,
    );
}

/// Print a list of calendars
pub fn print_calendar_list(account: &str, calendars: &[CalendarInfo], format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&calendars);
        return;
    }

    println!("Calendars for account '{}':\n", account);
    for calendar in calendars {
        let primary = if calendar.primary { " (primary)" } else { "" };
        println!("  ID: {}{}", calendar.id, primary);
        println!("  Name: {}", calendar.summary);
        if let Some(description) = &calendar.description {
            println!("  Description: {}", description);
        }
        println!();
    }
}

/// Print a list of accounts
pub fn print_account_list(accounts: &[AccountInfo], format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(&accounts);
        return;
    }

    if accounts.is_empty() {
        println!("No accounts configured.");
        println!("\nRun 'gaggle auth add <name>' to add an account.");
        return;
    }

    let rows: Vec<Vec<String>> = accounts
        .iter()
        .map(|a| {
            vec![
                a.name.clone(),
                if a.is_default { "✓" } else { "" }.to_string(),
                if a.has_token {
                    "✅ Authenticated"
                } else {
                    "❌ Not authenticated"
                }
                .to_string(),
                a.calendar_id.clone().unwrap_or_else(|| "primary".to_string()),
            ]
        })
        .collect();
    render_table(&["NAME", "DEFAULT", "AUTH STATUS", "CALENDAR"], &rows);
}

/// Print the result of a dispatch pass
pub fn print_dispatch_report(report: &DispatchReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        let results: Vec<serde_json::Value> = report
            .outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(message_id) => serde_json::json!({
                    "id": o.email.id,
                    "subject": o.email.subject,
                    "account": o.email.account,
                    "status": "sent",
                    "message_id": message_id,
                }),
                Err(error) => serde_json::json!({
                    "id": o.email.id,
                    "subject": o.email.subject,
                    "account": o.email.account,
                    "status": "error",
                    "error": error,
                }),
            })
            .collect();
        print_json(&serde_json::json!({
            "dry_run": report.dry_run,
            "found": report.due.len(),
            "sent": report.sent,
            "failed": report.failed,
            "results": results,
        }));
        return;
    }

    if report.is_noop() {
        print_info("No scheduled emails ready to send");
        return;
    }

    println!("Found {} email(s) ready to send\n", report.due.len());

    if report.dry_run {
        print_warning("Dry run mode - no emails will be sent");
        for email in &report.due {
            println!("  - {} (to: {})", email.subject, email.to.join(", "));
        }
        return;
    }

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(_) => print_success(&format!("Sent: {}", outcome.email.subject)),
            Err(error) => print_error(&format!("[{}] {}", outcome.email.subject, error)),
        }
    }
    println!("\nSummary: {} sent, {} failed", report.sent, report.failed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a rather long subject", 10), "a rathe...");
        assert_eq!(truncate("abcdef", 3), "abc");
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(""), "-");
        assert_eq!(or_dash("x"), "x");
    }
}
