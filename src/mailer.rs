//! Email notifications over SMTP: drop alerts, staleness notices, and the
//! weekly summary. Body rendering is kept in pure functions so the HTML
//! can be tested without a transport.

use chrono::{Local, NaiveDateTime};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::alerts::{PriceDropEvent, StaleProduct, STALE_AFTER_HOURS};
use crate::config::EmailConfig;
use crate::Result;

/// One line of the weekly summary table.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub name: String,
    pub current: Option<f64>,
    pub last_week: Option<f64>,
}

pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Mailer { config }
    }

    pub fn send_drop_alerts(&self, alerts: &[PriceDropEvent]) -> Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }
        let subject = format!("🔔 Price Drop Alert — {} item(s) dropped!", alerts.len());
        self.send(&subject, drop_alert_html(alerts))
    }

    pub fn send_staleness_alert(&self, stale: &[StaleProduct], now: NaiveDateTime) -> Result<()> {
        if stale.is_empty() {
            return Ok(());
        }
        let subject = format!("⚠️ Price Tracker — Data Stale ({}h+)", STALE_AFTER_HOURS);
        self.send(&subject, staleness_html(stale, now))
    }

    pub fn send_weekly_summary(&self, rows: &[SummaryRow]) -> Result<()> {
        let subject = format!(
            "📊 Weekly Price Summary — {}",
            Local::now().format("%B %d, %Y")
        );
        self.send(&subject, weekly_summary_html(rows))
    }

    /// A canned drop event for `--test` runs.
    pub fn sample_event() -> PriceDropEvent {
        PriceDropEvent::new(
            "Test Product - TestStore",
            "https://example.com",
            399.00,
            349.00,
        )
    }

    fn send(&self, subject: &str, html: String) -> Result<()> {
        let email = Message::builder()
            .from(self.config.sender_email.parse()?)
            .to(self.config.recipient_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)?;

        let credentials = Credentials::new(
            self.config.sender_email.clone(),
            self.config.app_password.clone(),
        );
        let transport = SmtpTransport::relay(&self.config.smtp_host)?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .build();

        transport.send(&email)?;
        info!("[EMAIL] Sent: {}", subject);
        Ok(())
    }
}

fn checked_on() -> String {
    Local::now().format("%B %d, %Y at %I:%M %p").to_string()
}

pub fn drop_alert_html(alerts: &[PriceDropEvent]) -> String {
    let mut rows = String::new();
    for a in alerts {
        rows.push_str(&format!(
            "<tr>\
             <td style='padding:8px;border:1px solid #ddd'>{}</td>\
             <td style='padding:8px;border:1px solid #ddd;color:#888;text-decoration:line-through'>${:.2}</td>\
             <td style='padding:8px;border:1px solid #ddd;color:#2ecc71;font-weight:bold'>${:.2}</td>\
             <td style='padding:8px;border:1px solid #ddd;color:#e74c3c'>-${:.2} ({:.1}%)</td>\
             <td style='padding:8px;border:1px solid #ddd'><a href='{}'>View</a></td>\
             </tr>",
            a.name, a.old_price, a.new_price, a.drop, a.pct, a.url
        ));
    }
    format!(
        "<html><body style='font-family:Arial,sans-serif'>\
         <h2 style='color:#2c3e50'>💰 Price Drop Alert</h2>\
         <table style='border-collapse:collapse;width:100%'>\
         <thead><tr style='background:#2c3e50;color:white'>\
         <th style='padding:8px'>Product</th><th style='padding:8px'>Old</th>\
         <th style='padding:8px'>New</th><th style='padding:8px'>Savings</th><th style='padding:8px'>Link</th>\
         </tr></thead>\
         <tbody>{}</tbody>\
         </table>\
         <p style='color:#888;font-size:12px;margin-top:20px'>Checked on {}</p>\
         </body></html>",
        rows,
        checked_on()
    )
}

pub fn staleness_html(stale: &[StaleProduct], now: NaiveDateTime) -> String {
    let items: String = stale
        .iter()
        .map(|s| format!("<li style='padding:4px 0'>{}</li>", s.describe(now)))
        .collect();
    format!(
        "<html><body style='font-family:Arial,sans-serif'>\
         <h2 style='color:#e74c3c'>⚠️ Stale Price Data Detected</h2>\
         <p>The following products have not been updated in over \
         <strong>{} hours</strong>, which may indicate a scraper failure:</p>\
         <ul style='line-height:1.8'>{}</ul>\
         <p>Check the scheduler logs for errors.</p>\
         <p style='color:#888;font-size:12px;margin-top:20px'>Checked on {}</p>\
         </body></html>",
        STALE_AFTER_HOURS,
        items,
        checked_on()
    )
}

pub fn weekly_summary_html(rows: &[SummaryRow]) -> String {
    let mut body = String::new();
    for row in rows {
        let current = match row.current {
            Some(p) => format!("${:.2}", p),
            None => "<em>unavailable</em>".to_string(),
        };
        let change = match (row.current, row.last_week) {
            (None, _) => "—".to_string(),
            (_, None) => "<span style='color:#888'>No history</span>".to_string(),
            (Some(cur), Some(old)) if cur < old => {
                let d = old - cur;
                format!(
                    "<span style='color:#2ecc71'>▼ ${:.2} ({:.1}%)</span>",
                    d,
                    d / old * 100.0
                )
            }
            (Some(cur), Some(old)) if cur > old => {
                let d = cur - old;
                format!(
                    "<span style='color:#e74c3c'>▲ ${:.2} ({:.1}%)</span>",
                    d,
                    d / old * 100.0
                )
            }
            _ => "<span style='color:#888'>No change</span>".to_string(),
        };
        body.push_str(&format!(
            "<tr><td style='padding:8px;border:1px solid #ddd'>{}</td>\
             <td style='padding:8px;border:1px solid #ddd;font-weight:bold'>{}</td>\
             <td style='padding:8px;border:1px solid #ddd'>{}</td></tr>",
            row.name, current, change
        ));
    }
    format!(
        "<html><body style='font-family:Arial,sans-serif'>\
         <h2 style='color:#2c3e50'>📊 Weekly Price Summary</h2>\
         <table style='border-collapse:collapse;width:100%'>\
         <thead><tr style='background:#2c3e50;color:white'>\
         <th style='padding:8px;text-align:left'>Product</th>\
         <th style='padding:8px;text-align:left'>Current</th>\
         <th style='padding:8px;text-align:left'>vs Last Week</th>\
         </tr></thead>\
         <tbody>{}</tbody>\
         </table>\
         <p style='color:#888;font-size:12px;margin-top:20px'>{} · Tracker running normally ✅</p>\
         </body></html>",
        body,
        checked_on()
    )
}
