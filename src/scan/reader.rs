use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, SLIP_READER_API_VERSION, SLIP_READER_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{is_image_data_uri, normalize_odds, BetType, OddsSign, Sport};

const SUPPORTED_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const MAX_TOKENS: u32 = 1000;

const EXTRACTION_PROMPT: &str = r#"You are reading a sportsbook bet slip screenshot. Extract the following fields and respond ONLY with a JSON object, no markdown, no backticks, no explanation:

{
  "title": "The pick/team and spread or line, e.g. 'Duke -9.5' or 'Lakers ML'",
  "betType": "One of: SPREAD, MONEYLINE, OVER/UNDER, ALTERNATE SPREAD, PLAYER PROP, FIRST HALF SPREAD, FIRST HALF ML, GAME TOTAL",
  "odds": "The odds e.g. '-192' or '+150'",
  "matchup": "Away team @ Home team, e.g. 'Clemson @ Duke'",
  "time": "Game time if visible, e.g. '8:00PM ET', or 'TBD' if not shown",
  "sport": "One of: NCAAB, NBA, NFL, NCAAF, NHL, MLB, Soccer, UFC, Tennis",
  "description": "Any extra detail printed on the slip, such as a player name or parlay leg, or omit"
}

Omit any field you cannot read. Be precise. Use the exact team names shown."#;

/// A bet-slip screenshot ready to send upstream: bare base64 plus media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlipImage {
    pub data: String,
    pub media_type: String,
}

impl SlipImage {
    /// Accepts either a `data:` URI or bare base64 with an explicit media type.
    pub fn parse(image: &str, media_type: Option<&str>) -> Result<Self> {
        let image = image.trim();
        let (uri_type, data) = if image.starts_with("data:") {
            if !is_image_data_uri(image) {
                return Err(AppError::BadRequest("image is not a base64 image data URI".to_string()));
            }
            let rest = &image["data:".len()..];
            let (mt, data) = rest.split_once(";base64,").unwrap_or((rest, ""));
            (Some(mt), data)
        } else {
            (None, image)
        };

        let media_type = media_type
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or(uri_type)
            .ok_or_else(|| AppError::BadRequest("mediaType is required".to_string()))?
            .to_ascii_lowercase();
        if !SUPPORTED_MEDIA_TYPES.contains(&media_type.as_str()) {
            return Err(AppError::BadRequest(format!("unsupported mediaType '{media_type}'")));
        }

        if data.is_empty() {
            return Err(AppError::BadRequest("image is empty".to_string()));
        }
        if !data.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')) {
            return Err(AppError::BadRequest("image is not valid base64".to_string()));
        }

        Ok(Self { data: data.to_string(), media_type })
    }
}

/// Fields read off a slip. Any subset may be missing; nothing is guessed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipFields {
    #[serde(alias = "team", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matchup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SlipFields {
    /// Drops blanks and values outside the known enums; canonicalizes the rest.
    fn cleaned(self, default_sign: OddsSign) -> Self {
        let text = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            title: text(self.title),
            bet_type: text(self.bet_type)
                .and_then(|b| b.parse::<BetType>().ok())
                .map(|b| b.to_string()),
            odds: text(self.odds).and_then(|o| normalize_odds(&o, default_sign).ok()),
            matchup: text(self.matchup),
            time: text(self.time),
            sport: text(self.sport)
                .and_then(|s| s.parse::<Sport>().ok())
                .map(|s| s.to_string()),
            description: text(self.description),
        }
    }
}

/// Pulls the JSON object out of the model's reply text.
pub fn parse_model_text(text: &str, default_sign: OddsSign) -> Result<SlipFields> {
    let clean = text.replace("```json", "").replace("```", "");
    let clean = clean.trim();
    let start = clean.find('{');
    let end = clean.rfind('}');
    let object = match (start, end) {
        (Some(s), Some(e)) if s < e => &clean[s..=e],
        _ => return Err(AppError::Upstream("slip reader reply held no JSON object".to_string())),
    };
    let fields: SlipFields = serde_json::from_str(object)
        .map_err(|e| AppError::Upstream(format!("slip reader reply was not valid JSON: {e}")))?;
    Ok(fields.cleaned(default_sign))
}

/// External vision collaborator that reads bet slips.
#[async_trait]
pub trait SlipReader: Send + Sync {
    /// Errors when the reader cannot be used at all, before any input is read.
    fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, image: &SlipImage) -> Result<SlipFields>;
}

/// Slip reader backed by the Anthropic messages API.
pub struct AnthropicSlipReader {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    default_sign: OddsSign,
}

impl AnthropicSlipReader {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SLIP_READER_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: cfg.slip_reader_url.clone(),
            model: cfg.slip_reader_model.clone(),
            api_key: cfg.slip_reader_api_key.clone(),
            default_sign: cfg.feed.default_odds_sign,
        })
    }

    fn request_body(&self, image: &SlipImage) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.data,
                        },
                    },
                    { "type": "text", "text": EXTRACTION_PROMPT },
                ],
            }],
        })
    }
}

#[async_trait]
impl SlipReader for AnthropicSlipReader {
    fn ready(&self) -> Result<()> {
        match &self.api_key {
            Some(_) => Ok(()),
            None => Err(AppError::Config("ANTHROPIC_API_KEY not configured".to_string())),
        }
    }

    async fn read(&self, image: &SlipImage) -> Result<SlipFields> {
        self.ready()?;
        let api_key = self.api_key.as_deref().unwrap_or_default();

        let resp = self
            .client
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", SLIP_READER_API_VERSION)
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("slip reader unreachable: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("slip reader sent unreadable body: {e}")))?;

        if !status.is_success() {
            let detail = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("no detail");
            warn!(%status, detail, "slip reader rejected request");
            return Err(AppError::Upstream(format!("slip reader returned {status}: {detail}")));
        }

        let text: String = body
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        debug!(chars = text.len(), "slip reader replied");

        parse_model_text(&text, self.default_sign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_supplies_media_type() {
        let img = SlipImage::parse("data:image/png;base64,iVBORw0KGgo=", None).unwrap();
        assert_eq!(img.media_type, "image/png");
        assert_eq!(img.data, "iVBORw0KGgo=");
    }

    #[test]
    fn bare_base64_needs_media_type() {
        assert!(matches!(SlipImage::parse("iVBORw0KGgo=", None), Err(AppError::BadRequest(_))));
        let img = SlipImage::parse("iVBORw0KGgo=", Some("image/JPEG")).unwrap();
        assert_eq!(img.media_type, "image/jpeg");
    }

    #[test]
    fn malformed_images_are_rejected() {
        assert!(SlipImage::parse("", Some("image/png")).is_err());
        assert!(SlipImage::parse("not base64!", Some("image/png")).is_err());
        assert!(SlipImage::parse("iVBORw0KGgo=", Some("application/pdf")).is_err());
        assert!(SlipImage::parse("data:text/plain;base64,aGk=", None).is_err());
    }

    #[test]
    fn model_text_with_fences_is_parsed() {
        let text = "```json\n{\"team\": \"Duke -9.5\", \"betType\": \"spread\", \"odds\": \"110\", \"matchup\": \"Clemson @ Duke\", \"time\": \"8:00PM ET\", \"sport\": \"ncaab\"}\n```";
        let fields = parse_model_text(text, OddsSign::Minus).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Duke -9.5"));
        assert_eq!(fields.bet_type.as_deref(), Some("SPREAD"));
        assert_eq!(fields.odds.as_deref(), Some("-110"));
        assert_eq!(fields.sport.as_deref(), Some("NCAAB"));
        assert_eq!(fields.description, None);
    }

    #[test]
    fn unknown_enum_values_are_dropped_not_guessed() {
        let fields = parse_model_text(
            r#"{"title": "Over 220.5", "betType": "PARLAY", "sport": "Cricket", "odds": "n/a", "matchup": ""}"#,
            OddsSign::Plus,
        )
        .unwrap();
        assert_eq!(fields.title.as_deref(), Some("Over 220.5"));
        assert_eq!(fields.bet_type, None);
        assert_eq!(fields.sport, None);
        assert_eq!(fields.odds, None);
        assert_eq!(fields.matchup, None);
    }

    #[test]
    fn prose_without_json_is_an_upstream_error() {
        let err = parse_model_text("I can't read this image.", OddsSign::Minus).unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[test]
    fn reader_without_key_is_not_ready() {
        let reader = AnthropicSlipReader {
            client: reqwest::Client::new(),
            url: "http://127.0.0.1:9".to_string(),
            model: "m".to_string(),
            api_key: None,
            default_sign: OddsSign::Minus,
        };
        assert!(matches!(reader.ready(), Err(AppError::Config(_))));
    }

    #[test]
    fn request_body_carries_image_and_prompt() {
        let reader = AnthropicSlipReader {
            client: reqwest::Client::new(),
            url: "http://127.0.0.1:9".to_string(),
            model: "vision-model".to_string(),
            api_key: Some("k".to_string()),
            default_sign: OddsSign::Minus,
        };
        let img = SlipImage { data: "aGk=".to_string(), media_type: "image/png".to_string() };
        let body = reader.request_body(&img);
        assert_eq!(body["model"], "vision-model");
        assert_eq!(body["messages"][0]["content"][0]["source"]["data"], "aGk=");
        assert_eq!(body["messages"][0]["content"][1]["type"], "text");
    }
}
