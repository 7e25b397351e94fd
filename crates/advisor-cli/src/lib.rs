//! Helpers shared by the `advisor` binary.

use advisor_core::models::{Client, ReportResponse};
use anyhow::Context;
use serde::Serialize;

/// Truncate a string to `max_len` characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

pub fn client_rows(clients: &[Client]) -> Vec<String> {
    let mut rows = vec![format!("{:<36}  {:<32}  {:<16}  {}", "ID", "COMPANY", "INDUSTRY", "STATUS")];
    rows.extend(clients.iter().map(|c| {
        format!(
            "{:<36}  {:<32}  {:<16}  {}",
            c.id,
            truncate_string(&c.company_name, 32),
            truncate_string(c.industry.as_deref().unwrap_or("-"), 16),
            serde_json::to_value(c.status)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default()
        )
    }));
    rows
}

pub fn report_rows(reports: &[ReportResponse]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<36}  {:<40}  {:<10}  {:<10}  {}",
        "ID", "TITLE", "TYPE", "STATUS", "CREATED"
    )];
    rows.extend(reports.iter().map(|r| {
        format!(
            "{:<36}  {:<40}  {:<10}  {:<10}  {}",
            r.id,
            truncate_string(&r.title, 40),
            r.report_type.as_str(),
            r.status.to_string(),
            r.created_at.format("%Y-%m-%d %H:%M")
        )
    }));
    rows
}

/// Initialize tracing for the CLI. Logs go to stderr so JSON output stays clean.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("", 5), "");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("abc", 2), "...");
    }

    #[test]
    fn truncate_string_counts_characters() {
        assert_eq!(truncate_string("Société Générale", 10), "Société...");
    }
}
