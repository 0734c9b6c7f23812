//! Room analysis data types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Output language for generated text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Zh,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }

    pub fn is_english(&self) -> bool {
        matches!(self, Language::En)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = roomai_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => Ok(Language::Zh),
            "en" | "en-us" | "en-gb" => Ok(Language::En),
            other => Err(roomai_common::Error::InvalidInput(format!(
                "Unsupported language: {}",
                other
            ))),
        }
    }
}

/// Estimated room size in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomDimensions {
    pub width: f64,
    pub length: f64,
    pub height: f64,
}

impl Default for RoomDimensions {
    fn default() -> Self {
        Self {
            width: 4.0,
            length: 5.0,
            height: 2.8,
        }
    }
}

impl RoomDimensions {
    pub fn area(&self) -> f64 {
        self.width * self.length
    }
}

/// Vision analysis of a room photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAnalysis {
    pub room_type: String,
    pub dimensions: RoomDimensions,
    pub existing_furniture: Vec<String>,
    pub current_style: String,
    pub lighting: String,
    pub problems: Vec<String>,
    pub potential: String,
    pub confidence: f64,
}

impl Default for RoomAnalysis {
    fn default() -> Self {
        Self {
            room_type: "living".to_string(),
            dimensions: RoomDimensions::default(),
            existing_furniture: Vec::new(),
            current_style: "未识别".to_string(),
            lighting: "一般".to_string(),
            problems: Vec::new(),
            potential: "有改造空间".to_string(),
            confidence: 0.7,
        }
    }
}

impl RoomAnalysis {
    /// Build an analysis from loosely-typed model output
    ///
    /// Missing fields take their defaults. Numbers given as strings
    /// (`"4.5"`, `"4.5m"`) are accepted. Confidence is clamped to 0..=1.
    pub fn normalize(raw: &Value) -> Self {
        let defaults = Self::default();
        let dims = raw.get("dimensions");
        let dim = |key: &str, default: f64| {
            dims.and_then(|d| d.get(key))
                .and_then(lenient_f64)
                .filter(|v| *v > 0.0)
                .unwrap_or(default)
        };

        Self {
            room_type: raw
                .get("room_type")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.room_type),
            dimensions: RoomDimensions {
                width: dim("width", defaults.dimensions.width),
                length: dim("length", defaults.dimensions.length),
                height: dim("height", defaults.dimensions.height),
            },
            existing_furniture: string_list(raw.get("existing_furniture")),
            current_style: string_field(raw, "current_style").unwrap_or(defaults.current_style),
            lighting: string_field(raw, "lighting").unwrap_or(defaults.lighting),
            problems: string_list(raw.get("problems")),
            potential: string_field(raw, "potential").unwrap_or(defaults.potential),
            confidence: raw
                .get("confidence")
                .and_then(lenient_f64)
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(defaults.confidence),
        }
    }

    /// Canned analysis used by the demo endpoint and the demo vision fallback
    pub fn demo() -> Self {
        Self {
            room_type: "living".to_string(),
            dimensions: RoomDimensions {
                width: 5.5,
                length: 4.2,
                height: 2.8,
            },
            existing_furniture: ["沙发", "茶几", "电视柜", "书架"]
                .map(String::from)
                .to_vec(),
            current_style: "现代简约".to_string(),
            lighting: "自然光充足，东向窗户".to_string(),
            problems: ["空间利用不足", "色彩单调", "缺乏装饰元素"]
                .map(String::from)
                .to_vec(),
            potential: "可以通过添加绿植、艺术画和调整家具布局来提升空间感".to_string(),
            confidence: 0.92,
        }
    }
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let numeric: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            numeric.parse().ok()
        }
        _ => None,
    }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(Value::as_str)
                    .map(String::from),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Stored result of a completed analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAnalysisResult {
    pub id: Uuid,
    pub image_url: String,
    pub segmentation_url: Option<String>,
    #[serde(flatten)]
    pub analysis: RoomAnalysis,
}

/// Payload stored with an analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    /// Public URL of the stored upload
    pub image_url: String,
    /// Storage key of the stored upload
    pub image_key: String,
    pub content_type: String,
    #[serde(default)]
    pub language: Language,
}
