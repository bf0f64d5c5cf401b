//! The run loop: one linear pass over every configured retailer, with each
//! product's failure isolated from the rest of the batch.

use chrono::Local;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::alerts::{self, AlertLog, Outcome, PriceDropEvent};
use crate::config::{product_key, AppConfig};
use crate::extractor;
use crate::fetcher::Fetcher;
use crate::history::{PriceRow, PriceStore};
use crate::mailer::{Mailer, SummaryRow};
use crate::Result;

/// Fixed pause after each product regardless of outcome, to stay polite to
/// target servers and reduce blocking.
const INTER_REQUEST_DELAY: Duration = Duration::from_secs(2);

const SUMMARY_LOOKBACK_DAYS: i64 = 7;

pub struct Runner {
    config: AppConfig,
    fetcher: Fetcher,
    store: PriceStore,
    mailer: Mailer,
}

impl Runner {
    pub fn new(config: AppConfig) -> Result<Self> {
        let fetcher = Fetcher::new()?;
        let store = PriceStore::new(&config.storage.price_log);
        let mailer = Mailer::new(config.email.clone());
        Ok(Runner {
            config,
            fetcher,
            store,
            mailer,
        })
    }

    pub async fn run(&self, weekly: bool) -> Result<()> {
        self.store.ensure_schema()?;
        let started = Local::now().naive_local();
        let today = started.date();

        info!("Price Tracker — {}", started.format("%Y-%m-%d %H:%M:%S"));
        if weekly {
            info!("Mode: Weekly Summary");
        }

        let mut alerted = AlertLog::load(&self.config.storage.alerted_file)?;
        let mut alerts: Vec<PriceDropEvent> = Vec::new();
        let mut current_prices: HashMap<String, Option<f64>> = HashMap::new();

        for bucket in &self.config.buckets {
            info!("── {}", bucket.label);
            for retailer in &bucket.retailers {
                let name = product_key(&bucket.label, &retailer.name);
                info!("Checking {}...", retailer.name);
                let result = self
                    .check_product(&name, &retailer.url, &mut alerted, &mut alerts, &mut current_prices)
                    .await;
                if let Err(e) = result {
                    error!("[ERROR] Unexpected error processing {}: {}", name, e);
                }
                sleep(INTER_REQUEST_DELAY).await;
            }
        }

        if alerts.is_empty() {
            info!("No new alerts this run.");
        } else if let Err(e) = self.mailer.send_drop_alerts(&alerts) {
            error!("[EMAIL ERROR] {}", e);
        }

        if weekly {
            let rows = self.summary_rows(&current_prices)?;
            if let Err(e) = self.mailer.send_weekly_summary(&rows) {
                error!("[EMAIL ERROR] {}", e);
            }
        }

        alerted.save(&self.config.storage.alerted_file, today)?;

        // Liveness check on the scraper itself, not a price signal.
        let now = Local::now().naive_local();
        let stale = alerts::stale_products(&self.config.product_keys(), &self.store, now)?;
        if stale.is_empty() {
            info!(
                "[OK] All products have fresh data (within {}h)",
                alerts::STALE_AFTER_HOURS
            );
        } else {
            warn!(
                "[STALE] {} product(s) have data older than {}h — sending alert",
                stale.len(),
                alerts::STALE_AFTER_HOURS
            );
            if let Err(e) = self.mailer.send_staleness_alert(&stale, now) {
                error!("[EMAIL ERROR] {}", e);
            }
        }

        Ok(())
    }

    async fn check_product(
        &self,
        name: &str,
        url: &str,
        alerted: &mut AlertLog,
        alerts: &mut Vec<PriceDropEvent>,
        current_prices: &mut HashMap<String, Option<f64>>,
    ) -> Result<()> {
        let body = match self.fetcher.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                error!("[ERROR] {}: {}", name, e);
                current_prices.insert(name.to_string(), None);
                return Ok(());
            }
        };

        let extraction = extractor::extract(&body, url);
        let visible_price = if extraction.in_stock {
            extraction.price
        } else {
            None
        };
        current_prices.insert(name.to_string(), visible_price);

        let now = Local::now().naive_local();
        let previous = self.store.last_price(name)?;
        let outcome = alerts::evaluate(
            name,
            url,
            extraction.price,
            extraction.in_stock,
            previous,
            alerted,
            now.date(),
        );

        // Every reading with a price is logged, out-of-stock included, so
        // the trend line stays continuous.
        if let Some(price) = extraction.price {
            self.store.append(&PriceRow {
                timestamp: now,
                name: name.to_string(),
                price,
                url: url.to_string(),
                image: extraction.image.unwrap_or_default(),
                oos: !extraction.in_stock,
            })?;
        }

        match outcome {
            Outcome::Skipped => warn!("[WARN] {}: NO PRICE", name),
            Outcome::OutOfStock { price } => info!(
                "[OOS] {}: ${:.2} — item sold out / unavailable, no alert triggered",
                name, price
            ),
            Outcome::Baseline { price } => info!("[INFO] {}: Baseline ${:.2}", name, price),
            Outcome::Steady { price, previous } => {
                info!("[OK] {}: ${:.2} (was ${:.2})", name, price, previous);
            }
            Outcome::Drop { event, suppressed } => {
                info!(
                    "[DROP] {}: ${:.2} → ${:.2} (-${:.2}, -{:.1}%)",
                    name, event.old_price, event.new_price, event.drop, event.pct
                );
                if suppressed {
                    info!("[SKIP] Already alerted today for {}", name);
                } else {
                    alerts.push(event);
                }
            }
        }

        Ok(())
    }

    fn summary_rows(&self, current_prices: &HashMap<String, Option<f64>>) -> Result<Vec<SummaryRow>> {
        let cutoff = Local::now().naive_local() - chrono::Duration::days(SUMMARY_LOOKBACK_DAYS);
        let mut rows = Vec::new();
        for bucket in &self.config.buckets {
            for retailer in &bucket.retailers {
                let name = product_key(&bucket.label, &retailer.name);
                let current = current_prices.get(&name).copied().flatten();
                let last_week = self.store.price_at_or_before(&name, cutoff)?;
                rows.push(SummaryRow {
                    name,
                    current,
                    last_week,
                });
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bucket, EmailConfig, Retailer, StorageConfig};
    use tempfile::tempdir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRODUCT_PAGE: &str = r#"
        <html><head>
        <script type="application/ld+json">
        {"@type":"Product","offers":{"price":"129.00","availability":"https://schema.org/InStock"},
         "image":"//cdn.example.com/gadget.jpg"}
        </script>
        </head><body></body></html>
    "#;

    fn test_config(server_url: &str, dir: &std::path::Path) -> AppConfig {
        AppConfig {
            email: EmailConfig {
                smtp_host: "smtp.gmail.com".to_string(),
                smtp_port: 465,
                sender_email: "me@example.com".to_string(),
                app_password: "secret".to_string(),
                recipient_email: "you@example.com".to_string(),
            },
            storage: StorageConfig {
                price_log: dir.join("price_history.csv"),
                alerted_file: dir.join("last_alerted.json"),
            },
            buckets: vec![Bucket {
                label: "Gadget".to_string(),
                retailers: vec![Retailer {
                    name: "MockStore".to_string(),
                    url: server_url.to_string(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_run_logs_baseline_reading() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let runner = Runner::new(config).unwrap();

        // Baseline run: fresh data, no drops, so no email traffic.
        runner.run(false).await.unwrap();

        let store = PriceStore::new(dir.path().join("price_history.csv"));
        let rows = store.rows_for("Gadget - MockStore").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 129.0);
        assert_eq!(rows[0].image, "https://cdn.example.com/gadget.jpg");
        assert!(!rows[0].oos);

        assert!(dir.path().join("last_alerted.json").exists());
    }

    #[tokio::test]
    async fn test_run_survives_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let config = test_config(&server.uri(), dir.path());

        // Seed a fresh reading so the failed fetch leaves nothing stale.
        let store = PriceStore::new(dir.path().join("price_history.csv"));
        store.ensure_schema().unwrap();
        store
            .append(&PriceRow {
                timestamp: Local::now().naive_local(),
                name: "Gadget - MockStore".to_string(),
                price: 129.0,
                url: server.uri(),
                image: String::new(),
                oos: false,
            })
            .unwrap();

        let runner = Runner::new(config).unwrap();
        runner.run(false).await.unwrap();

        // No new reading was produced; the run still completed.
        assert_eq!(store.rows_for("Gadget - MockStore").unwrap().len(), 1);
    }
}
