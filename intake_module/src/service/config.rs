use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sheets_module::google_auth::GoogleAuthConfig;
use sheets_module::sheets::DEFAULT_SHEETS_API_BASE_URL;
use tracing::info;

use crate::directory::{Directory, DirectoryError};
use crate::extractor::{DelegatedExtractor, Extractor, PatternExtractor, ResponseFormat};
use crate::line::DEFAULT_LINE_API_BASE_URL;
use crate::llm::{
    GeminiGenerator, LlmConfig, OpenAiGenerator, TextGenerator, DEFAULT_GEMINI_MODEL,
    DEFAULT_GEMINI_URL, DEFAULT_LLM_TIMEOUT, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL,
};
use crate::source_tag::SourceTagClassifier;

use super::BoxError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SHEET_NAME: &str = "工作表1";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Pattern,
    OpenAi,
    Gemini,
}

impl ExtractorKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pattern" | "regex" => Some(Self::Pattern),
            "openai" => Some(Self::OpenAi),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractorKind::Pattern => "pattern",
            ExtractorKind::OpenAi => "openai",
            ExtractorKind::Gemini => "gemini",
        }
    }
}

/// Which extractor to run and how to reach its backend.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
    /// Set for the delegated kinds only.
    pub llm: Option<LlmConfig>,
    pub response_format: ResponseFormat,
}

impl ExtractorConfig {
    pub fn pattern() -> Self {
        Self {
            kind: ExtractorKind::Pattern,
            llm: None,
            response_format: ResponseFormat::default(),
        }
    }

    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let openai_key = get("OPENAI_API_KEY");
        let gemini_key = get("GEMINI_API_KEY");
        let kind = match get("EXTRACTOR") {
            Some(value) => ExtractorKind::parse(&value)
                .ok_or_else(|| format!("unknown EXTRACTOR value: {}", value))?,
            None if openai_key.is_some() => ExtractorKind::OpenAi,
            None if gemini_key.is_some() => ExtractorKind::Gemini,
            None => ExtractorKind::Pattern,
        };

        let response_format = match get("LLM_RESPONSE_FORMAT") {
            Some(value) => ResponseFormat::parse(&value)
                .ok_or_else(|| format!("unknown LLM_RESPONSE_FORMAT value: {}", value))?,
            None => ResponseFormat::default(),
        };

        let timeout = get("LLM_TIMEOUT_SECS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LLM_TIMEOUT);

        let llm = match kind {
            ExtractorKind::Pattern => None,
            ExtractorKind::OpenAi => Some(LlmConfig {
                api_key: openai_key.ok_or("EXTRACTOR=openai requires OPENAI_API_KEY")?,
                api_url: get("OPENAI_API_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout,
            }),
            ExtractorKind::Gemini => Some(LlmConfig {
                api_key: gemini_key.ok_or("EXTRACTOR=gemini requires GEMINI_API_KEY")?,
                api_url: get("GEMINI_API_URL").unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
                model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                timeout,
            }),
        };

        Ok(Self {
            kind,
            llm,
            response_format,
        })
    }

    /// Build the extractor. Creates blocking HTTP clients, so call it off the
    /// async runtime.
    pub fn build(&self, classifier: SourceTagClassifier) -> Result<Arc<dyn Extractor>, BoxError> {
        let generator: Arc<dyn TextGenerator> = match (self.kind, &self.llm) {
            (ExtractorKind::Pattern, _) => {
                return Ok(Arc::new(PatternExtractor::new(classifier)));
            }
            (ExtractorKind::OpenAi, Some(llm)) => Arc::new(OpenAiGenerator::new(llm.clone())),
            (ExtractorKind::Gemini, Some(llm)) => Arc::new(GeminiGenerator::new(llm.clone())),
            (kind, None) => {
                return Err(format!("{} extractor has no LLM settings", kind.as_str()).into());
            }
        };
        Ok(Arc::new(DelegatedExtractor::new(
            generator,
            classifier,
            self.response_format,
        )))
    }
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub sheets_api_base: String,
    pub google_auth: GoogleAuthConfig,
    pub line_access_token: String,
    /// Webhook signatures are only checked when this is set.
    pub line_channel_secret: Option<String>,
    pub line_api_base: String,
    pub extractor: ExtractorConfig,
    pub directory_path: Option<PathBuf>,
    pub utc_offset_hours: i32,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();
        let google_auth = GoogleAuthConfig::from_env()?;
        Self::from_lookup(|key| env::var(key).ok(), google_auth)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        google_auth: GoogleAuthConfig,
    ) -> Result<Self, BoxError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| format!("invalid PORT: {}", value))?,
            None => DEFAULT_PORT,
        };
        let max_body_bytes = get("INTAKE_MAX_BODY_BYTES")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);
        let utc_offset_hours = match get("REPORT_UTC_OFFSET_HOURS") {
            Some(value) => value
                .parse::<i32>()
                .ok()
                .filter(|hours| (-23..=23).contains(hours))
                .ok_or_else(|| format!("invalid REPORT_UTC_OFFSET_HOURS: {}", value))?,
            None => DEFAULT_UTC_OFFSET_HOURS,
        };

        let spreadsheet_id = get("SPREADSHEET_ID").ok_or("SPREADSHEET_ID must be set")?;
        let line_access_token =
            get("LINE_CHANNEL_ACCESS_TOKEN").ok_or("LINE_CHANNEL_ACCESS_TOKEN must be set")?;
        if !google_auth.is_valid() {
            return Err("no Google credentials configured (GOOGLE_ACCESS_TOKEN, GOOGLE_CREDENTIALS, GOOGLE_SERVICE_ACCOUNT_JSON or GOOGLE_CLIENT_ID/SECRET/REFRESH_TOKEN)".into());
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            max_body_bytes,
            spreadsheet_id,
            sheet_name: get("SHEET_NAME").unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
            sheets_api_base: get("SHEETS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE_URL.to_string()),
            google_auth,
            line_access_token,
            line_channel_secret: get("LINE_CHANNEL_SECRET"),
            line_api_base: get("LINE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LINE_API_BASE_URL.to_string()),
            extractor: ExtractorConfig::from_lookup(&lookup)?,
            directory_path: get("INTAKE_DIRECTORY_PATH").map(PathBuf::from),
            utc_offset_hours,
        })
    }
}

/// Load the lookup tables, or start with empty ones when no file is given.
pub fn load_directory(path: Option<&Path>) -> Result<Directory, DirectoryError> {
    let Some(path) = path else {
        info!("no INTAKE_DIRECTORY_PATH set; every sender resolves to unknown");
        return Ok(Directory::default());
    };
    let directory = Directory::load(path)?;
    info!(
        "loaded directory {} ({} display names, pricing officer: {})",
        path.display(),
        directory.known_names(),
        directory.pricing_officer().unwrap_or("none")
    );
    Ok(directory)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn static_token() -> GoogleAuthConfig {
        GoogleAuthConfig {
            access_token: Some("ya29.test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn extractor_defaults_follow_available_keys() {
        let none = ExtractorConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(none.kind, ExtractorKind::Pattern);
        assert!(none.llm.is_none());

        let gemini =
            ExtractorConfig::from_lookup(lookup(&[("GEMINI_API_KEY", "g")])).expect("config");
        assert_eq!(gemini.kind, ExtractorKind::Gemini);
        assert_eq!(gemini.llm.expect("llm").model, DEFAULT_GEMINI_MODEL);

        let both = ExtractorConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "o"),
            ("GEMINI_API_KEY", "g"),
            ("LLM_TIMEOUT_SECS", "5"),
        ]))
        .expect("config");
        assert_eq!(both.kind, ExtractorKind::OpenAi);
        let llm = both.llm.expect("llm");
        assert_eq!(llm.api_key, "o");
        assert_eq!(llm.api_url, DEFAULT_OPENAI_URL);
        assert_eq!(llm.timeout, Duration::from_secs(5));
    }

    #[test]
    fn explicit_extractor_overrides_and_validates() {
        let pattern = ExtractorConfig::from_lookup(lookup(&[
            ("EXTRACTOR", "pattern"),
            ("OPENAI_API_KEY", "o"),
        ]))
        .expect("config");
        assert_eq!(pattern.kind, ExtractorKind::Pattern);

        assert!(ExtractorConfig::from_lookup(lookup(&[("EXTRACTOR", "openai")])).is_err());
        assert!(ExtractorConfig::from_lookup(lookup(&[("EXTRACTOR", "claude")])).is_err());

        let json = ExtractorConfig::from_lookup(lookup(&[
            ("EXTRACTOR", "Gemini"),
            ("GEMINI_API_KEY", "g"),
            ("LLM_MODEL", "gemini-2.0-flash"),
            ("LLM_RESPONSE_FORMAT", "json"),
        ]))
        .expect("config");
        assert_eq!(json.response_format, ResponseFormat::JsonRows);
        assert_eq!(json.llm.expect("llm").model, "gemini-2.0-flash");
    }

    #[test]
    fn intake_config_defaults() {
        let config = IntakeConfig::from_lookup(
            lookup(&[
                ("SPREADSHEET_ID", "sheet-1"),
                ("LINE_CHANNEL_ACCESS_TOKEN", "line-token"),
                ("LINE_CHANNEL_SECRET", "  "),
            ]),
            static_token(),
        )
        .expect("config");

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.sheet_name, DEFAULT_SHEET_NAME);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.utc_offset_hours, 8);
        assert_eq!(config.line_channel_secret, None);
        assert_eq!(config.line_api_base, DEFAULT_LINE_API_BASE_URL);
        assert_eq!(config.sheets_api_base, DEFAULT_SHEETS_API_BASE_URL);
        assert_eq!(config.extractor.kind, ExtractorKind::Pattern);
        assert!(config.directory_path.is_none());
    }

    #[test]
    fn intake_config_requires_targets_and_credentials() {
        let missing_sheet = IntakeConfig::from_lookup(
            lookup(&[("LINE_CHANNEL_ACCESS_TOKEN", "t")]),
            static_token(),
        );
        assert!(missing_sheet.is_err());

        let no_google = IntakeConfig::from_lookup(
            lookup(&[("SPREADSHEET_ID", "s"), ("LINE_CHANNEL_ACCESS_TOKEN", "t")]),
            GoogleAuthConfig::default(),
        );
        assert!(no_google.is_err());

        let bad_port = IntakeConfig::from_lookup(
            lookup(&[
                ("SPREADSHEET_ID", "s"),
                ("LINE_CHANNEL_ACCESS_TOKEN", "t"),
                ("PORT", "http"),
            ]),
            static_token(),
        );
        assert!(bad_port.is_err());

        let bad_offset = IntakeConfig::from_lookup(
            lookup(&[
                ("SPREADSHEET_ID", "s"),
                ("LINE_CHANNEL_ACCESS_TOKEN", "t"),
                ("REPORT_UTC_OFFSET_HOURS", "99"),
            ]),
            static_token(),
        );
        assert!(bad_offset.is_err());
    }

    #[test]
    fn pattern_config_builds_pattern_extractor() {
        let extractor = ExtractorConfig::pattern()
            .build(SourceTagClassifier::default())
            .expect("build");
        assert_eq!(extractor.name(), "pattern");
    }

    #[test]
    fn missing_directory_path_yields_empty_directory() {
        let directory = load_directory(None).expect("directory");
        assert_eq!(directory.known_names(), 0);
        assert_eq!(directory.pricing_officer(), None);
    }
}
