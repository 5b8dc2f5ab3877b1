//! HTML body for report mail.

use indoc::formatdoc;

use super::engine::{Comparison, Report};
use crate::notify::templates::{escape_html, format_decimal, format_thousands};

fn stat_box(label: &str, value: &str) -> String {
    formatdoc! {r#"
        <div style="flex: 1; background: #f5f5f5; padding: 15px; border-radius: 8px; text-align: center;">
          <div style="color: #888; font-size: 12px;">{label}</div>
          <div style="font-size: 20px; font-weight: bold;">{value}</div>
        </div>
    "#}
}

fn comparison_block(cmp: &Comparison, previous_label: &str) -> String {
    let (color, sign) = if cmp.avg_delta >= 0.0 {
        ("#1DB954", "+")
    } else {
        ("#e74c3c", "")
    };
    let pct = cmp
        .avg_delta_pct
        .map(|p| format!(" ({sign}{}%)", format_decimal(p)))
        .unwrap_or_default();
    formatdoc! {r#"
        <div style="margin: 20px 0;">
          <h3 style="margin-bottom: 8px;">Compared with {previous_label}</h3>
          <p style="color: {color}; font-size: 18px; margin: 0;">{sign}{delta}{pct}</p>
          <p style="color: #888; font-size: 12px;">Previous average: {previous_avg}</p>
        </div>
    "#,
        previous_label = escape_html(previous_label),
        delta = format_decimal(cmp.avg_delta),
        previous_avg = format_decimal(cmp.previous.avg_count),
    }
}

pub fn report_html(report: &Report) -> String {
    let stats = &report.stats;
    let boxes = [
        stat_box("Peak", &format_thousands(u64::from(stats.max_count))),
        stat_box("Minimum", &format_thousands(u64::from(stats.min_count))),
        stat_box("Predicted streams", &format_thousands(stats.predicted_streams)),
    ]
    .concat();
    let comparison = report
        .comparison
        .as_ref()
        .map(|cmp| comparison_block(cmp, &report.previous_period.label))
        .unwrap_or_default();

    formatdoc! {r#"
        <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
          <h2 style="color: #1DB954;">{title}</h2>
          <p style="color: #888;">{period}</p>
          <div style="background: #1DB954; color: #fff; padding: 20px; border-radius: 8px; text-align: center;">
            <div style="font-size: 14px;">Average listeners</div>
            <div style="font-size: 36px; font-weight: bold;">{avg}</div>
          </div>
          <div style="display: flex; gap: 10px; margin: 20px 0;">
        {boxes}  </div>
        {comparison}  <p style="color: #888; font-size: 12px;">Samples: {samples}</p>
          <hr style="border: none; border-top: 1px solid #ddd; margin: 20px 0;">
          <p style="color: #888; font-size: 11px;">Sent automatically by listentrack</p>
        </div>
    "#,
        title = escape_html(&report.title),
        period = escape_html(&report.period.label),
        avg = format_decimal(stats.avg_count),
        samples = format_thousands(stats.sample_count),
    }
}
