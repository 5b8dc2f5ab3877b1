//! HTML bodies for operator mail.

use chrono::{DateTime, Utc};
use indoc::formatdoc;

/// Escape text for inclusion in HTML.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1234567` -> `1,234,567`.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// One-decimal number with thousands separators on the integer part.
pub fn format_decimal(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let tenths = (value.abs() * 10.0).round() as u64;
    let int = format_thousands(tenths / 10);
    match tenths % 10 {
        0 => format!("{sign}{int}"),
        frac => format!("{sign}{int}.{frac}"),
    }
}

/// Session details appended to every alert.
#[derive(Debug, Clone)]
pub struct AlertContext {
    pub now: DateTime<Utc>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

pub fn alert_html(title: &str, message: &str, ctx: &AlertContext) -> String {
    let last_success = ctx
        .last_success
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    formatdoc! {r#"
        <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
          <h2 style="color: #1DB954;">Listener Tracker</h2>
          <div style="background: #f5f5f5; padding: 20px; border-radius: 8px; margin: 20px 0;">
            <h3 style="margin-top: 0; color: #e74c3c;">{title}</h3>
            <p style="color: #333;">{message}</p>
          </div>
          <div style="color: #888; font-size: 12px;">
            <p>Time: {now}</p>
            <p>Last successful sample: {last_success}</p>
            <p>Consecutive errors: {errors}</p>
          </div>
          <hr style="border: none; border-top: 1px solid #ddd; margin: 20px 0;">
          <p style="color: #888; font-size: 11px;">Sent automatically by listentrack</p>
        </div>
    "#,
        title = escape_html(title),
        message = escape_html(message),
        now = ctx.now.to_rfc3339(),
        last_success = last_success,
        errors = ctx.consecutive_errors,
    }
}
