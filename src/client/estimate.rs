//! Pre-submission cost estimate.
//!
//! ## Pricing
//!
//! The provider bills per page: **$1.00 per 1000 pages**. PDFs are parsed
//! locally (lopdf) for their page count; every supported image counts as one
//! page. The USD figure is converted to BRL with a live rate when the rate
//! endpoint answers, else with a fixed fallback.
//!
//! None of this blocks a submission. A PDF that will not parse produces an
//! [`EstimationError`] in the estimate and the file is still sent.

use crate::client::file_type::SupportedFileType;
use crate::error::EstimationError;
use crate::output::ChunkInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Provider price for 1000 pages, in USD.
pub const USD_PER_1000_PAGES: f64 = 1.00;

/// BRL per USD when the live rate is unavailable.
pub const FALLBACK_EXCHANGE_RATE: f64 = 5.5;

/// Currency the estimate converts to.
pub const LOCAL_CURRENCY: &str = "BRL";

/// Exchange-rate lookup timeout.
const RATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Count billable pages in `bytes`.
pub fn count_pages(bytes: &[u8], kind: SupportedFileType) -> Result<usize, EstimationError> {
    if !kind.is_pdf() {
        return Ok(1);
    }
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| EstimationError::PdfParse(e.to_string()))?;
    Ok(doc.get_pages().len())
}

/// USD cost for `pages`.
pub fn usd_cost(pages: usize) -> f64 {
    pages as f64 / 1000.0 * USD_PER_1000_PAGES
}

/// Where the exchange rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Live,
    Fallback,
}

/// Page count and price of one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub pages: usize,
    pub usd: f64,
    pub local_currency: f64,
    pub exchange_rate: f64,
    pub rate_source: RateSource,
}

impl CostEstimate {
    pub fn new(pages: usize, exchange_rate: f64, rate_source: RateSource) -> Self {
        let usd = usd_cost(pages);
        Self {
            pages,
            usd,
            local_currency: usd * exchange_rate,
            exchange_rate,
            rate_source,
        }
    }
}

/// Manual-transcription comparison shown next to the price. Display only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueComparison {
    pub manual_minutes: u64,
    pub manual_cost: f64,
    pub savings: f64,
}

impl ValueComparison {
    pub fn new(estimate: &CostEstimate, minutes_per_page: u32, hourly_rate: f64) -> Self {
        let manual_minutes = estimate.pages as u64 * u64::from(minutes_per_page);
        let manual_cost = manual_minutes as f64 / 60.0 * hourly_rate;
        Self {
            manual_minutes,
            manual_cost,
            savings: (manual_cost - estimate.local_currency).max(0.0),
        }
    }

    /// `"2h 05min"` style duration.
    pub fn manual_time_label(&self) -> String {
        let (h, m) = (self.manual_minutes / 60, self.manual_minutes % 60);
        if h == 0 {
            format!("{m}min")
        } else {
            format!("{h}h {m:02}min")
        }
    }
}

/// Everything the client knows about a file before sending it.
#[derive(Debug, Clone)]
pub struct FileEstimate {
    pub file_type: SupportedFileType,
    pub file_size: usize,
    pub cost: Result<CostEstimate, EstimationError>,
    pub value: Option<ValueComparison>,
    /// PDF above the large-file threshold.
    pub large_file_notice: bool,
}

impl FileEstimate {
    pub fn pages(&self) -> Option<usize> {
        self.cost.as_ref().ok().map(|c| c.pages)
    }

    /// Advisory descriptor attached to large PDFs. The file is still sent whole.
    pub fn chunk_info(&self) -> Option<ChunkInfo> {
        if !self.large_file_notice {
            return None;
        }
        let end_page = self.pages().unwrap_or(1).max(1) as u32;
        Some(ChunkInfo {
            is_chunked: true,
            chunk_number: 1,
            total_chunks: 1,
            start_page: 1,
            end_page,
        })
    }
}

/// `true` for PDFs strictly larger than `threshold_bytes`.
pub fn needs_large_file_notice(kind: SupportedFileType, size: usize, threshold_bytes: usize) -> bool {
    kind.is_pdf() && size > threshold_bytes
}

#[derive(Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

/// Fetch the USD→BRL rate from `url` (`{"rates": {"BRL": 5.1}}`).
///
/// Never fails: any transport, status or decoding problem yields `fallback`.
pub async fn fetch_exchange_rate(
    http: &reqwest::Client,
    url: &str,
    fallback: f64,
) -> (f64, RateSource) {
    let live = async {
        let resp = http.get(url).timeout(RATE_TIMEOUT).send().await.ok()?;
        if !resp.status().is_success() {
            debug!("Exchange rate endpoint answered {}", resp.status());
            return None;
        }
        let body: RatesResponse = resp.json().await.ok()?;
        body.rates
            .get(LOCAL_CURRENCY)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
    };

    match live.await {
        Some(rate) => (rate, RateSource::Live),
        None => {
            debug!("Using fallback exchange rate {}", fallback);
            (fallback, RateSource::Fallback)
        }
    }
}

/// `$0.00`, `$0.004`, `$1.25`: three decimals only for sub-cent amounts.
pub fn format_money(symbol: &str, value: f64) -> String {
    if value != 0.0 && value.abs() < 0.01 {
        format!("{symbol}{value:.3}")
    } else {
        format!("{symbol}{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object};

    fn pdf_with_pages(n: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..n)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => n as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn zero_pages_cost_nothing() {
        let pages = count_pages(&pdf_with_pages(0), SupportedFileType::Pdf).unwrap();
        assert_eq!(pages, 0);
        let est = CostEstimate::new(pages, 5.5, RateSource::Fallback);
        assert_eq!(est.usd, 0.0);
        assert_eq!(est.local_currency, 0.0);
        assert_eq!(format_money("$", est.usd), "$0.00");
    }

    #[test]
    fn thousand_pages_cost_one_dollar() {
        let pages = count_pages(&pdf_with_pages(1000), SupportedFileType::Pdf).unwrap();
        assert_eq!(pages, 1000);
        let est = CostEstimate::new(pages, 5.5, RateSource::Fallback);
        assert_eq!(est.usd, 1.0);
        assert_eq!(format_money("$", est.usd), "$1.00");
        assert!((est.local_currency - 5.5).abs() < 1e-9);
    }

    #[test]
    fn images_are_one_page() {
        assert_eq!(count_pages(b"not parsed", SupportedFileType::Png).unwrap(), 1);
        assert_eq!(count_pages(b"", SupportedFileType::Tiff).unwrap(), 1);
    }

    #[test]
    fn broken_pdf_is_estimation_error() {
        let err = count_pages(b"%PDF-1.4 garbage", SupportedFileType::Pdf).unwrap_err();
        assert!(matches!(err, EstimationError::PdfParse(_)));
    }

    #[test]
    fn value_comparison_five_minutes_per_page() {
        let est = CostEstimate::new(25, 5.0, RateSource::Live);
        let v = ValueComparison::new(&est, 5, 50.0);
        assert_eq!(v.manual_minutes, 125);
        assert!((v.manual_cost - 104.1666).abs() < 0.01);
        assert_eq!(v.manual_time_label(), "2h 05min");
        assert!(v.savings > 0.0);
    }

    #[test]
    fn large_file_notice_only_for_big_pdfs() {
        let threshold = 20 * 1024 * 1024;
        assert!(needs_large_file_notice(SupportedFileType::Pdf, threshold + 1, threshold));
        assert!(!needs_large_file_notice(SupportedFileType::Pdf, threshold, threshold));
        assert!(!needs_large_file_notice(SupportedFileType::Png, threshold * 2, threshold));
    }

    #[test]
    fn chunk_info_covers_every_page() {
        let estimate = FileEstimate {
            file_type: SupportedFileType::Pdf,
            file_size: 30 * 1024 * 1024,
            cost: Ok(CostEstimate::new(240, 5.5, RateSource::Fallback)),
            value: None,
            large_file_notice: true,
        };
        let info = estimate.chunk_info().unwrap();
        assert!(info.is_chunked);
        assert_eq!((info.chunk_number, info.total_chunks), (1, 1));
        assert_eq!((info.start_page, info.end_page), (1, 240));
    }

    #[tokio::test]
    async fn live_rate_is_used() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/latest/USD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"base":"USD","rates":{"BRL":5.12,"EUR":0.92}}"#)
            .create_async()
            .await;

        let url = format!("{}/latest/USD", server.url());
        let (rate, source) = fetch_exchange_rate(&reqwest::Client::new(), &url, 5.5).await;
        assert_eq!(source, RateSource::Live);
        assert!((rate - 5.12).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_falls_back_silently() {
        let mut server = mockito::Server::new_async().await;
        let _down = server
            .mock("GET", "/latest/USD")
            .with_status(503)
            .create_async()
            .await;

        let url = format!("{}/latest/USD", server.url());
        let (rate, source) = fetch_exchange_rate(&reqwest::Client::new(), &url, 5.5).await;
        assert_eq!((rate, source), (5.5, RateSource::Fallback));

        let (rate, source) =
            fetch_exchange_rate(&reqwest::Client::new(), "http://127.0.0.1:9/latest", 5.5).await;
        assert_eq!((rate, source), (5.5, RateSource::Fallback));
    }
}
