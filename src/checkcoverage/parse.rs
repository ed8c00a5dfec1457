use std::sync::LazyLock;

use compact_str::CompactString;
use regex::Regex;
use serde::Serialize;

pub const HEADERS: [&str; 5] = [
    "Serial Number",
    "Product Name",
    "Purchase Date",
    "Coverage Expiry",
    "Status",
];

const MISSING: &str = "NOT_FOUND";

static PRODUCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MacBook\s+[^)]*\s*\([^)]*\)").unwrap());
static PURCHASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+\s\d{4}").unwrap());
static EXPIRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Expires on\s*:\s*([^"]+)"#).unwrap());
static ECHOED_SERIAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{1,2}\d{10}").unwrap());

#[derive(Debug)]
pub enum Outcome {
    RateLimited,
    WrongCaptcha,
    InvalidSerial,
    UnverifiedPurchase,
    FullyCovered,
    Unavailable,
    Covered(Coverage),
    Unknown,
}

#[derive(Debug)]
pub struct Coverage {
    pub product_name: Option<String>,
    pub purchase_date: Option<String>,
    pub coverage_expiry: Option<String>,
}

pub fn classify(body: &str) -> Outcome {
    if body.contains("process your request.") {
        Outcome::RateLimited
    } else if body.contains("The code you entered does not match") {
        Outcome::WrongCaptcha
    } else if body.contains("Please enter a valid serial number.") {
        Outcome::InvalidSerial
    } else if body.contains("Sign in to update purchase date") {
        Outcome::UnverifiedPurchase
    } else if body.contains("Your coverage includes the following benefits")
        || body.contains("Coverage Expired")
    {
        Outcome::FullyCovered
    } else if body.contains("We cannot process your request at this time.") {
        Outcome::Unavailable
    } else if body.contains("Apple coverage for your product") {
        Outcome::Covered(extract(body))
    } else {
        Outcome::Unknown
    }
}

fn extract(body: &str) -> Coverage {
    if let Some(m) = ECHOED_SERIAL.find(body) {
        tracing::debug!(target: "parse", "echoed serial: {}", m.as_str());
    }

    Coverage {
        product_name: PRODUCT.find(body).map(|m| m.as_str().trim().to_owned()),
        purchase_date: PURCHASE.find(body).map(|m| m.as_str().trim().to_owned()),
        coverage_expiry: EXPIRY
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_owned()),
    }
}

#[derive(Debug, Serialize)]
pub struct Row {
    #[serde(rename = "Serial Number")]
    pub serial_number: CompactString,
    #[serde(rename = "Product Name")]
    pub product_name: String,
    #[serde(rename = "Purchase Date")]
    pub purchase_date: String,
    #[serde(rename = "Coverage Expiry")]
    pub coverage_expiry: String,
    #[serde(rename = "Status")]
    pub status: &'static str,
}

impl Row {
    fn placeholder(serial: &str, status: &'static str) -> Self {
        Self {
            serial_number: CompactString::new(serial),
            product_name: "N/A".to_owned(),
            purchase_date: "N/A".to_owned(),
            coverage_expiry: "N/A".to_owned(),
            status,
        }
    }

    pub fn from_outcome(serial: &str, outcome: Outcome) -> Option<Self> {
        Some(match outcome {
            Outcome::RateLimited | Outcome::WrongCaptcha => return None,
            Outcome::InvalidSerial => Self::placeholder(serial, "Invalid"),
            Outcome::UnverifiedPurchase => Self::placeholder(serial, "Cannot verify purchase date"),
            Outcome::FullyCovered => Self::placeholder(serial, "Fully valid"),
            Outcome::Unavailable => Self::placeholder(serial, "Cannot process request"),
            Outcome::Unknown => Self::placeholder(serial, "Unknown"),
            Outcome::Covered(coverage) => Self {
                serial_number: CompactString::new(serial),
                product_name: coverage.product_name.unwrap_or_else(|| MISSING.to_owned()),
                purchase_date: coverage.purchase_date.unwrap_or_else(|| MISSING.to_owned()),
                coverage_expiry: coverage
                    .coverage_expiry
                    .unwrap_or_else(|| MISSING.to_owned()),
                status: "VALID",
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COVERED: &str = r#"<div>Apple coverage for your product is shown below. MacBook Pro (13-inch, 2020) Purchased in June 2020. <span data-expiry="Expires on : August 24, 2026"></span> FK1234567890</div>"#;

    #[test]
    fn classify_markers() {
        assert!(matches!(
            classify("Sorry, but we are currently unable to process your request."),
            Outcome::RateLimited
        ));
        assert!(matches!(
            classify("The code you entered does not match the image."),
            Outcome::WrongCaptcha
        ));
        assert!(matches!(
            classify("Please enter a valid serial number."),
            Outcome::InvalidSerial
        ));
        assert!(matches!(
            classify("Sign in to update purchase date"),
            Outcome::UnverifiedPurchase
        ));
        assert!(matches!(
            classify("Your coverage includes the following benefits"),
            Outcome::FullyCovered
        ));
        assert!(matches!(classify("Coverage Expired"), Outcome::FullyCovered));
        assert!(matches!(
            classify("We cannot process your request at this time."),
            Outcome::Unavailable
        ));
        assert!(matches!(
            classify("<html>totally unexpected</html>"),
            Outcome::Unknown
        ));
    }

    #[test]
    fn unavailable_is_not_rate_limited() {
        // "process your request." only matches with the period right after
        // "request", which the unavailable answer does not have
        assert!(matches!(
            classify("We cannot process your request at this time. Please try again."),
            Outcome::Unavailable
        ));
    }

    #[test]
    fn rate_limit_takes_precedence_over_wrong_captcha() {
        let body = "unable to process your request. The code you entered does not match";
        assert!(matches!(classify(body), Outcome::RateLimited));
    }

    #[test]
    fn extracts_covered_fields() {
        let Outcome::Covered(c) = classify(COVERED) else {
            panic!("not covered");
        };
        assert_eq!(c.product_name.as_deref(), Some("MacBook Pro (13-inch, 2020)"));
        assert_eq!(c.purchase_date.as_deref(), Some("June 2020"));
        assert_eq!(c.coverage_expiry.as_deref(), Some("August 24, 2026"));
    }

    #[test]
    fn covered_row_substitutes_missing_fields() {
        let outcome = classify("Apple coverage for your product is shown below.");
        let row = Row::from_outcome("C02TEST", outcome).unwrap();
        assert_eq!(row.status, "VALID");
        assert_eq!(row.product_name, "NOT_FOUND");
        assert_eq!(row.purchase_date, "NOT_FOUND");
        assert_eq!(row.coverage_expiry, "NOT_FOUND");
    }

    #[test]
    fn retry_outcomes_have_no_row() {
        assert!(Row::from_outcome("X", Outcome::RateLimited).is_none());
        assert!(Row::from_outcome("X", Outcome::WrongCaptcha).is_none());
    }

    #[test]
    fn row_serializes_in_header_order() {
        let row = Row::from_outcome("SER123", Outcome::InvalidSerial).unwrap();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(&row).unwrap();
        let buf = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "SER123,N/A,N/A,N/A,Invalid\n");
    }
}
