//! Normalizes the free-text "business level" phrase into a case source.

use std::fmt;

/// Marker for a purchase lead from another dealer.
const BUY_MARKER: &str = "收";
/// Marker for a new-car dealership salesperson.
const DEALERSHIP_MARKER: &str = "業代";
const DIRECT_CUSTOMER_MARKER: &str = "直客";
const FINANCING_MARKER: &str = "融資";
const LEASING_MARKER: &str = "租賃";

/// Brands recognized when no list is configured.
pub const DEFAULT_BRAND_TOKENS: &[&str] = &[
    "toyota", "lexus", "honda", "nissan", "infiniti", "mazda", "mitsubishi", "subaru",
    "suzuki", "bmw", "benz", "mercedes", "audi", "volkswagen", "vw", "skoda", "porsche",
    "volvo", "ford", "hyundai", "kia", "tesla", "mini", "land rover", "jaguar", "peugeot",
    "luxgen", "豐田", "凌志", "本田", "日產", "馬自達", "三菱", "速霸陸", "鈴木", "賓士",
    "奧迪", "福斯", "保時捷", "富豪", "福特", "現代", "納智捷",
];

/// Where a sales lead came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseSource {
    Peer,
    NewCarSales,
    DirectCustomer,
    Financing,
    Leasing,
    /// No rule matched; the raw phrase is kept as written.
    Passthrough(String),
}

impl CaseSource {
    pub fn as_str(&self) -> &str {
        match self {
            CaseSource::Peer => "同行",
            CaseSource::NewCarSales => "新車業代",
            CaseSource::DirectCustomer => "直客",
            CaseSource::Financing => "融資",
            CaseSource::Leasing => "租賃",
            CaseSource::Passthrough(raw) => raw,
        }
    }
}

impl fmt::Display for CaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SourceTagClassifier {
    /// Lowercased brand tokens.
    brand_tokens: Vec<String>,
}

impl Default for SourceTagClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_BRAND_TOKENS.iter().copied())
    }
}

impl SourceTagClassifier {
    pub fn new<I, S>(brand_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let brand_tokens = brand_tokens
            .into_iter()
            .map(|token| token.as_ref().trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        Self { brand_tokens }
    }

    /// True when `text` mentions any recognized brand, ignoring case.
    pub fn mentions_brand(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.brand_tokens
            .iter()
            .any(|token| lowered.contains(token.as_str()))
    }

    /// Classify a level phrase; the first matching rule wins.
    pub fn classify(&self, level_phrase: &str, full_text: &str) -> CaseSource {
        if level_phrase.contains(BUY_MARKER) {
            CaseSource::Peer
        } else if level_phrase.contains(DEALERSHIP_MARKER) && self.mentions_brand(full_text) {
            CaseSource::NewCarSales
        } else if level_phrase.contains(DIRECT_CUSTOMER_MARKER) {
            CaseSource::DirectCustomer
        } else if level_phrase.contains(FINANCING_MARKER) {
            CaseSource::Financing
        } else if level_phrase.contains(LEASING_MARKER) {
            CaseSource::Leasing
        } else {
            CaseSource::Passthrough(level_phrase.to_string())
        }
    }
}
