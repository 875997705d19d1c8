use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::llm::TextGenerator;
use crate::report::{ExtractedReport, ReportFields};
use crate::source_tag::SourceTagClassifier;

use super::{ExtractError, Extractor};

/// Field order the model is asked to produce, one value per position.
pub const DELEGATED_FIELDS: [&str; 7] = [
    "業務等級",
    "年份",
    "品牌",
    "車型",
    "顏色",
    "里程(萬公里)",
    "新車價(萬)",
];

const SYSTEM_PROMPT: &str = "你是二手車收購案件的資料整理助手。你只輸出資料，不輸出任何解釋、標題或多餘文字。";

/// Shape the model is asked to reply in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// One line, fields separated by tabs.
    #[default]
    TabDelimited,
    /// A JSON array of rows, each row an array of strings.
    JsonRows,
}

impl ResponseFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tab" | "tsv" | "tab_delimited" => Some(Self::TabDelimited),
            "json" | "json_rows" => Some(Self::JsonRows),
            _ => None,
        }
    }

    fn instructions(self) -> &'static str {
        match self {
            ResponseFormat::TabDelimited => {
                "請只輸出一行，欄位之間用 Tab 字元分隔，依照上面的欄位順序；沒有資料的欄位留空，但仍保留 Tab。"
            }
            ResponseFormat::JsonRows => {
                "請只輸出一個 JSON 陣列，陣列中的每個元素是一台車，為依照上面欄位順序排列的字串陣列；沒有資料的欄位請用空字串。"
            }
        }
    }
}

pub struct DelegatedExtractor {
    generator: Arc<dyn TextGenerator>,
    classifier: SourceTagClassifier,
    format: ResponseFormat,
}

impl DelegatedExtractor {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        classifier: SourceTagClassifier,
        format: ResponseFormat,
    ) -> Self {
        Self {
            generator,
            classifier,
            format,
        }
    }

    pub fn build_prompt(&self, text: &str) -> String {
        let fields = DELEGATED_FIELDS
            .iter()
            .enumerate()
            .map(|(index, name)| format!("{}. {}", index + 1, name))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "請從下面的 LINE 訊息中擷取二手車案件資料，欄位順序如下：\n{}\n\n{}\n\n訊息：\n\"\"\"\n{}\n\"\"\"",
            fields,
            self.format.instructions(),
            text.trim()
        )
    }

    fn to_report(&self, cells: Vec<String>, text: &str, actor: &str) -> Option<ExtractedReport> {
        let mut cells = cells.into_iter();
        let mut next = || cells.next().unwrap_or_default();
        let level = next();
        let fields = ReportFields {
            year: next(),
            brand: next(),
            model: next(),
            color: next(),
            mileage: next(),
            list_price: next(),
        };
        if level.is_empty() && fields.is_empty() {
            return None;
        }
        let case_source = self.classifier.classify(&level, text);
        Some(ExtractedReport::new_tracking(actor, case_source, fields))
    }
}

impl Extractor for DelegatedExtractor {
    fn extract(&self, text: &str, actor: &str) -> Result<Vec<ExtractedReport>, ExtractError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let reply = self
            .generator
            .generate(SYSTEM_PROMPT, &self.build_prompt(text))?;
        debug!(
            "{} extraction reply: {}",
            self.generator.provider(),
            reply.trim()
        );

        let rows = match self.format {
            ResponseFormat::TabDelimited => vec![parse_tab_line(&reply)?],
            ResponseFormat::JsonRows => parse_json_rows(&reply)?,
        };

        Ok(rows
            .into_iter()
            .filter_map(|cells| self.to_report(cells, text, actor))
            .collect())
    }

    fn name(&self) -> &'static str {
        "delegated"
    }
}

/// Trim line breaks and spaces but keep tabs, which may delimit empty cells.
fn trim_reply(text: &str) -> &str {
    text.trim_matches(|ch: char| ch == '\n' || ch == '\r' || ch == ' ')
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = trim_reply(reply);
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    trim_reply(trim_reply(body).strip_suffix("```").unwrap_or(body))
}

fn check_width(found: usize) -> Result<(), ExtractError> {
    if found > DELEGATED_FIELDS.len() {
        return Err(ExtractError::TooManyFields {
            expected: DELEGATED_FIELDS.len(),
            found,
        });
    }
    Ok(())
}

/// Parse the first non-empty line as tab-separated cells.
pub(crate) fn parse_tab_line(reply: &str) -> Result<Vec<String>, ExtractError> {
    let line = strip_code_fence(reply)
        .lines()
        .map(trim_reply)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ExtractError::Malformed("empty reply".to_string()))?;
    if !line.contains('\t') {
        return Err(ExtractError::Malformed(format!(
            "expected tab-separated fields, got {:?}",
            line
        )));
    }
    let cells: Vec<String> = line
        .split('\t')
        .map(|cell| cell.trim().to_string())
        .collect();
    check_width(cells.len())?;
    Ok(cells)
}

/// Parse a JSON array of rows of scalar cells.
pub(crate) fn parse_json_rows(reply: &str) -> Result<Vec<Vec<String>>, ExtractError> {
    let value: Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| ExtractError::Malformed(format!("invalid JSON: {}", e)))?;
    let Value::Array(rows) = value else {
        return Err(ExtractError::Malformed("top level is not an array".to_string()));
    };

    rows.into_iter()
        .map(|row| {
            let Value::Array(cells) = row else {
                return Err(ExtractError::Malformed("row is not an array".to_string()));
            };
            check_width(cells.len())?;
            cells
                .into_iter()
                .map(|cell| match cell {
                    Value::String(text) => Ok(text.trim().to_string()),
                    Value::Number(number) => Ok(number.to_string()),
                    Value::Null => Ok(String::new()),
                    other => Err(ExtractError::Malformed(format!(
                        "unexpected cell value {}",
                        other
                    ))),
                })
                .collect()
        })
        .collect()
}
