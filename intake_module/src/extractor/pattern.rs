use regex::Regex;
use std::sync::LazyLock;

use crate::report::{ExtractedReport, ReportFields};
use crate::source_tag::SourceTagClassifier;

use super::{ExtractError, Extractor};

fn labeled_line(number: u8, label: &str) -> Regex {
    let pattern = format!(r"(?m)^[ \t]*{}[ \t]*[.．、][ \t]*{}[ \t]*[:：](.*)$", number, label);
    Regex::new(&pattern).expect("labeled line pattern is valid")
}

static YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| labeled_line(2, "年份"));
static COLOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| labeled_line(3, "顏色"));
static MILEAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| labeled_line(4, "里程"));
static LIST_PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| labeled_line(5, "新車價"));
static LEVEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| labeled_line(7, "業務等級"));

/// Deterministic extractor for the team's numbered report template:
///
/// ```text
/// CX-9 2WD-R
/// 2.年份: 2022.11
/// 3.顏色: 白
/// 4.里程：3.7萬
/// 5.新車價：169.9
/// 7.業務等級：格上第一次
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    classifier: SourceTagClassifier,
}

impl PatternExtractor {
    pub fn new(classifier: SourceTagClassifier) -> Self {
        Self { classifier }
    }
}

/// Value after the label, or empty when the line is absent.
fn capture(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim().to_string())
        .unwrap_or_default()
}

/// First whitespace-delimited token of the first line is the brand, the
/// remainder is the model.
fn split_heading(text: &str) -> (String, String) {
    let heading = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    match heading.split_once(char::is_whitespace) {
        Some((brand, model)) => (brand.to_string(), model.trim().to_string()),
        None => (heading.to_string(), String::new()),
    }
}

impl Extractor for PatternExtractor {
    fn extract(&self, text: &str, actor: &str) -> Result<Vec<ExtractedReport>, ExtractError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let (brand, model) = split_heading(text);
        let level = capture(&LEVEL_PATTERN, text);
        let fields = ReportFields {
            year: capture(&YEAR_PATTERN, text),
            brand,
            model,
            color: capture(&COLOR_PATTERN, text),
            mileage: capture(&MILEAGE_PATTERN, text),
            list_price: capture(&LIST_PRICE_PATTERN, text),
        };
        let case_source = self.classifier.classify(&level, text);

        Ok(vec![ExtractedReport::new_tracking(actor, case_source, fields)])
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{assemble_row, CASE_STATUS_TRACKING};
    use crate::source_tag::CaseSource;

    const SAMPLE: &str = "CX-9 2WD-R\n2.年份: 2022.11\n3.顏色: 白\n4.里程：3.7萬\n5.新車價：169.9\n7.業務等級：格上第一次";

    fn extract_one(text: &str) -> ExtractedReport {
        let mut reports = PatternExtractor::default()
            .extract(text, "阿蔣")
            .expect("pattern extraction never fails");
        assert_eq!(reports.len(), 1);
        reports.remove(0)
    }

    #[test]
    fn extracts_full_template() {
        let report = extract_one(SAMPLE);
        assert_eq!(report.brand, "CX-9");
        assert_eq!(report.model, "2WD-R");
        assert_eq!(report.year, "2022.11");
        assert_eq!(report.color, "白");
        assert_eq!(report.mileage, "3.7萬");
        assert_eq!(report.list_price, "169.9");
        assert_eq!(
            report.case_source,
            CaseSource::Passthrough("格上第一次".to_string())
        );
        assert_eq!(report.assigned_salesperson, "阿蔣");
        assert_eq!(report.case_status, CASE_STATUS_TRACKING);
        assert!(report.appraised_price.is_empty());
        assert!(report.offer_price.is_empty());
    }

    #[test]
    fn year_line_with_spaces_after_number() {
        assert_eq!(extract_one("Altis\n2. 年份: 2022.11").year, "2022.11");
    }

    #[test]
    fn missing_lines_become_empty_fields() {
        let report = extract_one("RAV4 Hybrid\n3.顏色: 黑");
        assert_eq!(report.year, "");
        assert_eq!(report.color, "黑");
        assert_eq!(report.mileage, "");
        assert_eq!(report.list_price, "");
        assert_eq!(report.case_source, CaseSource::Passthrough(String::new()));
        assert_eq!(assemble_row(&report, "2024/05/01").len(), 12);
    }

    #[test]
    fn single_word_heading_has_empty_model() {
        let report = extract_one("  \nPrius\n2.年份：2019");
        assert_eq!(report.brand, "Prius");
        assert_eq!(report.model, "");
        assert_eq!(report.year, "2019");
    }

    #[test]
    fn level_phrase_runs_through_classifier() {
        let report = extract_one("Toyota Altis\n7.業務等級：業代介紹");
        assert_eq!(report.case_source, CaseSource::NewCarSales);

        let report = extract_one("Altis\n7. 業務等級: 同行收車");
        assert_eq!(report.case_source, CaseSource::Peer);
    }

    #[test]
    fn crlf_line_endings_are_trimmed() {
        let report = extract_one("Golf GTI\r\n2.年份: 2020\r\n3.顏色: 紅\r\n");
        assert_eq!(report.year, "2020");
        assert_eq!(report.color, "紅");
    }

    #[test]
    fn blank_message_yields_nothing() {
        let reports = PatternExtractor::default()
            .extract("  \n ", "阿蔣")
            .expect("extract");
        assert!(reports.is_empty());
    }
}
