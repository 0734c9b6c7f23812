//! Design concept generation from curated per-style templates
//!
//! Concepts come from fixed templates; user input only reshapes the image
//! prompts and highlights:
//! - free-text needs (special needs, room description) are translated to
//!   English and replace the template prompts
//! - requirement tags append prompt fragments and highlights through
//!   [`REQUIREMENT_RULES`]

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::anthropic::{AnthropicClient, ContentBlock};
use super::ProviderError;
use crate::models::{DesignConcept, Language};

const TRANSLATION_MAX_TOKENS: u32 = 500;

/// Below this share of CJK characters text is treated as English already
const CJK_TRANSLATION_THRESHOLD: f64 = 0.3;

const BASE_CHANGE_KEYWORDS: &[&str] = &[
    "换墙",
    "换地板",
    "改墙",
    "改地",
    "木地板",
    "瓷砖",
    "大理石",
    "change wall",
    "change floor",
    "new floor",
    "new wall",
];

const PRESERVE_STRUCTURE_PREFIX: &str =
    "IMPORTANT: Keep the EXACT same room structure - same walls, same floor material, \
same ceiling, same windows position, same room shape. \
DO NOT change concrete to wood, DO NOT change wall material, \
DO NOT add windows or doors that don't exist. \
Only add or change furniture and items inside the room. ";

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptRequest {
    pub style: String,
    pub requirements: Vec<String>,
    pub special_needs: String,
    pub room_description: String,
    pub language: Language,
    pub count: usize,
}

#[async_trait]
pub trait ConceptGenerator: Send + Sync {
    async fn generate(&self, request: &ConceptRequest) -> Result<Vec<DesignConcept>, ProviderError>;
}

/// Turns free text into an English image prompt
#[async_trait]
pub trait Translator: Send + Sync {
    async fn to_english(&self, text: &str) -> Result<String, ProviderError>;
}

/// Share of characters in the CJK unified ideographs block
fn cjk_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let cjk = text
        .chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count();
    cjk as f64 / total as f64
}

/// Translate when the text is mostly Chinese; on failure keep the original
pub async fn translate_or_keep(translator: Option<&dyn Translator>, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() || cjk_ratio(text) < CJK_TRANSLATION_THRESHOLD {
        return text.to_string();
    }
    let Some(translator) = translator else {
        return text.to_string();
    };
    match translator.to_english(text).await {
        Ok(english) if !english.trim().is_empty() => {
            debug!(original = text, translated = %english, "Translated requirement");
            english.trim().to_string()
        }
        Ok(_) => text.to_string(),
        Err(e) => {
            warn!(error = %e, "Translation failed, using original text");
            text.to_string()
        }
    }
}

pub struct ClaudeTranslator {
    client: Arc<AnthropicClient>,
    model: String,
}

impl ClaudeTranslator {
    pub fn new(client: Arc<AnthropicClient>, model: String) -> Self {
        Self { client, model }
    }

    fn prompt(text: &str) -> String {
        format!(
            r#"Convert this Chinese room design request into an English image generation prompt.

Chinese: {text}

Requirements:
1. Describe the ROOM TYPE clearly (e.g., "modern office", "gaming room", "living room", "bedroom")
2. Describe what ITEMS to put inside (e.g., "multiple computers and monitors", "gaming PC setup", "desktop computers")
3. Be SPECIFIC and VISUAL - describe what the image should look like
4. If user says "只要X" (only X), emphasize "ONLY [X], nothing else"
5. If user says "不要Y" (no Y), say "without any [Y]"
6. If user asks for "很多电脑" (many computers), translate to "multiple computers", "many desktop computers", "multiple PC setups"

Key translations:
- 电脑 = computer / PC / desktop computer (NOT farm tools!)
- 很多电脑 = many computers / multiple computers / multiple PC setups
- 计算机 = computer / computing device
- 笔记本 = laptop
- 台式机 = desktop computer
- 显示器 = monitor / display
- 游戏电脑 = gaming PC / gaming computer
- 办公电脑 = office computer / workstation
- 仓库 = warehouse/storage room with concrete walls and floor
- 水泥 = concrete/cement
- 封闭 = enclosed, no windows

Output a clear English prompt describing the room and its contents. NO explanations, just the prompt."#
        )
    }
}

#[async_trait]
impl Translator for ClaudeTranslator {
    async fn to_english(&self, text: &str) -> Result<String, ProviderError> {
        self.client
            .message(
                &self.model,
                TRANSLATION_MAX_TOKENS,
                vec![ContentBlock::text(Self::prompt(text))],
            )
            .await
    }
}

struct TemplateText {
    name: &'static str,
    description: &'static str,
    highlights: [&'static str; 3],
}

struct ConceptTemplate {
    zh: TemplateText,
    en: TemplateText,
    prompt: &'static str,
    confidence: f64,
}

impl ConceptTemplate {
    fn to_concept(&self, language: Language) -> DesignConcept {
        let text = if language.is_english() { &self.en } else { &self.zh };
        DesignConcept {
            name: text.name.to_string(),
            description: text.description.to_string(),
            highlights: text.highlights.iter().map(|h| h.to_string()).collect(),
            prompt: self.prompt.to_string(),
            confidence: self.confidence,
        }
    }
}

const MODERN: [ConceptTemplate; 3] = [
    ConceptTemplate {
        zh: TemplateText {
            name: "都市极简",
            description: "极简线条与中性色调，打造都市精英的高效生活空间",
            highlights: ["简约大气", "功能至上", "质感选材"],
        },
        en: TemplateText {
            name: "Urban Minimalist",
            description: "Clean lines and neutral tones create an efficient living space for urban professionals",
            highlights: ["Minimalist Design", "Functional Focus", "Premium Materials"],
        },
        prompt: "ultra modern minimalist interior, clean geometric lines, monochromatic palette, high-end finishes",
        confidence: 0.95,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "现代温馨",
            description: "现代设计融入温暖元素，平衡美学与舒适度",
            highlights: ["温暖氛围", "舒适面料", "人性化设计"],
        },
        en: TemplateText {
            name: "Modern Warmth",
            description: "Modern design infused with warm elements, balancing aesthetics and comfort",
            highlights: ["Warm Atmosphere", "Comfortable Textiles", "Human-centered Design"],
        },
        prompt: "modern warm interior design, soft textures, warm lighting, comfortable furniture",
        confidence: 0.92,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "艺术现代",
            description: "将现代空间打造成艺术画廊，展现独特品味",
            highlights: ["艺术元素", "个性展示", "视觉焦点"],
        },
        en: TemplateText {
            name: "Artistic Modern",
            description: "Transform your space into an art gallery showcasing unique taste",
            highlights: ["Artistic Elements", "Personal Expression", "Visual Focal Points"],
        },
        prompt: "modern artistic interior, gallery-like space, statement art pieces, designer furniture",
        confidence: 0.88,
    },
];

const NORDIC: [ConceptTemplate; 3] = [
    ConceptTemplate {
        zh: TemplateText {
            name: "北欧阳光",
            description: "明亮通透的北欧风格，让自然光成为主角",
            highlights: ["自然采光", "白色基调", "原木质感"],
        },
        en: TemplateText {
            name: "Nordic Sunlight",
            description: "Bright and airy Scandinavian style, letting natural light take center stage",
            highlights: ["Natural Light", "White Base", "Wood Textures"],
        },
        prompt: "bright scandinavian interior, white walls, large windows, natural wood floors, hygge atmosphere",
        confidence: 0.94,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "北欧森林",
            description: "将森林的宁静带入室内，打造自然栖息地",
            highlights: ["自然元素", "绿植装饰", "有机材质"],
        },
        en: TemplateText {
            name: "Nordic Forest",
            description: "Bring the tranquility of the forest indoors, creating a natural habitat",
            highlights: ["Natural Elements", "Plant Decor", "Organic Materials"],
        },
        prompt: "nordic forest interior, indoor plants, natural materials, wooden furniture, green accents",
        confidence: 0.91,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "北欧舒适",
            description: "Hygge风格的终极体现，温暖舒适的小窝",
            highlights: ["温暖织物", "蜡烛氛围", "舒适角落"],
        },
        en: TemplateText {
            name: "Nordic Cozy",
            description: "The ultimate expression of Hygge style, a warm and cozy retreat",
            highlights: ["Warm Textiles", "Candle Ambiance", "Cozy Corners"],
        },
        prompt: "hygge scandinavian interior, cozy textiles, candles, reading nook, warm blankets",
        confidence: 0.93,
    },
];

const JAPANESE: [ConceptTemplate; 3] = [
    ConceptTemplate {
        zh: TemplateText {
            name: "禅意空间",
            description: "日式禅宗美学，营造冥想般的宁静氛围",
            highlights: ["极简主义", "禅意布置", "自然素材"],
        },
        en: TemplateText {
            name: "Zen Space",
            description: "Japanese Zen aesthetics creating a meditation-like peaceful atmosphere",
            highlights: ["Minimalism", "Zen Arrangement", "Natural Materials"],
        },
        prompt: "japanese zen interior, minimal furniture, tatami elements, shoji screens, rock garden view",
        confidence: 0.92,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "和风现代",
            description: "传统日式与现代设计的完美融合",
            highlights: ["传统元素", "现代功能", "和谐统一"],
        },
        en: TemplateText {
            name: "Modern Japanese",
            description: "Perfect fusion of traditional Japanese and modern design",
            highlights: ["Traditional Elements", "Modern Function", "Harmonious Unity"],
        },
        prompt: "modern japanese interior, contemporary furniture with traditional elements, paper lanterns, bonsai",
        confidence: 0.90,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "木之温度",
            description: "以木材为主角，感受自然的温度",
            highlights: ["原木家具", "自然质感", "温润氛围"],
        },
        en: TemplateText {
            name: "Wood Warmth",
            description: "Wood takes center stage, feeling the warmth of nature",
            highlights: ["Natural Wood", "Organic Texture", "Warm Ambiance"],
        },
        prompt: "japanese wood interior, natural wood throughout, warm tones, minimalist design, natural light",
        confidence: 0.89,
    },
];

const INDUSTRIAL: [ConceptTemplate; 3] = [
    ConceptTemplate {
        zh: TemplateText {
            name: "工业经典",
            description: "裸露砖墙与金属管道，重现工业时代的粗犷美",
            highlights: ["裸露材质", "金属元素", "复古工业"],
        },
        en: TemplateText {
            name: "Industrial Classic",
            description: "Exposed brick and metal pipes recreate the raw beauty of the industrial era",
            highlights: ["Exposed Materials", "Metal Elements", "Vintage Industrial"],
        },
        prompt: "classic industrial interior, exposed brick walls, metal pipes, concrete floors, vintage lighting",
        confidence: 0.93,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "工业温暖",
            description: "工业风格中注入温暖元素，刚柔并济",
            highlights: ["皮质家具", "暖色点缀", "混搭风格"],
        },
        en: TemplateText {
            name: "Industrial Warmth",
            description: "Industrial style infused with warm elements, balancing strength and softness",
            highlights: ["Leather Furniture", "Warm Accents", "Mixed Styles"],
        },
        prompt: "warm industrial interior, leather furniture, warm wood accents, soft lighting, cozy textiles",
        confidence: 0.90,
    },
    ConceptTemplate {
        zh: TemplateText {
            name: "都市LOFT",
            description: "开放式LOFT空间，自由不羁的都市生活",
            highlights: ["开放空间", "高挑天花", "功能分区"],
        },
        en: TemplateText {
            name: "Urban Loft",
            description: "Open loft space for free-spirited urban living",
            highlights: ["Open Space", "High Ceilings", "Functional Zones"],
        },
        prompt: "urban loft interior, open floor plan, high ceilings, industrial elements, modern furniture",
        confidence: 0.91,
    },
];

const STYLE_NAMES: &[(&str, &str)] = &[
    ("现代简约", "modern"),
    ("北欧风格", "nordic"),
    ("日式禅风", "japanese"),
    ("工业风格", "industrial"),
    ("波西米亚", "bohemian"),
    ("中古世纪", "midcentury"),
    ("海岸风格", "coastal"),
    ("田园农舍", "farmhouse"),
];

/// Canonical style key for a user-facing style name
pub fn normalize_style(style: &str) -> String {
    let style = style.trim();
    if let Some((_, key)) = STYLE_NAMES.iter().find(|(name, _)| *name == style) {
        return key.to_string();
    }
    style
        .to_lowercase()
        .replace(' ', "")
        .replace("简约", "modern")
        .replace("北欧", "nordic")
        .replace("日式", "japanese")
        .replace("工业", "industrial")
}

/// Templates for a style key; styles without curated templates use modern
fn templates_for(style_key: &str) -> &'static [ConceptTemplate; 3] {
    match style_key {
        "nordic" => &NORDIC,
        "japanese" => &JAPANESE,
        "industrial" => &INDUSTRIAL,
        _ => &MODERN,
    }
}

/// Requirement tag keywords mapped to prompt and highlight additions
struct RequirementRule {
    any_of: &'static [&'static str],
    /// Extra condition; empty means none
    also_any_of: &'static [&'static str],
    /// (zh, en)
    highlight: Option<(&'static str, &'static str)>,
    prompt: &'static str,
}

impl RequirementRule {
    fn matches(&self, requirement: &str) -> bool {
        self.any_of.iter().any(|k| requirement.contains(k))
            && (self.also_any_of.is_empty()
                || self.also_any_of.iter().any(|k| requirement.contains(k)))
    }
}

const REQUIREMENT_RULES: &[RequirementRule] = &[
    RequirementRule {
        any_of: &["workspace", "work", "办公", "工作"],
        also_any_of: &[],
        highlight: Some(("办公区域", "Workspace")),
        prompt: ", dedicated workspace area with desk and ergonomic chair",
    },
    RequirementRule {
        any_of: &["plants", "绿植", "植物"],
        also_any_of: &[],
        highlight: Some(("绿植装饰", "Plant Decor")),
        prompt: ", abundant indoor plants, large potted plants, hanging greenery",
    },
    RequirementRule {
        any_of: &["storage", "收纳", "储物"],
        also_any_of: &[],
        highlight: Some(("智能收纳", "Smart Storage")),
        prompt: ", smart storage solutions, built-in shelving",
    },
    RequirementRule {
        any_of: &["reading", "阅读", "书"],
        also_any_of: &[],
        highlight: Some(("阅读角落", "Reading Nook")),
        prompt: ", cozy reading nook with bookshelf and comfortable armchair",
    },
    RequirementRule {
        any_of: &["sofa", "沙发"],
        also_any_of: &[],
        highlight: None,
        prompt: ", prominent comfortable sofa as centerpiece",
    },
    RequirementRule {
        any_of: &["tv", "电视"],
        also_any_of: &[],
        highlight: None,
        prompt: ", modern TV console and entertainment area",
    },
    RequirementRule {
        any_of: &["coffee", "茶几"],
        also_any_of: &[],
        highlight: None,
        prompt: ", stylish coffee table",
    },
    RequirementRule {
        any_of: &["lamp", "灯"],
        also_any_of: &[],
        highlight: None,
        prompt: ", elegant floor lamps and ambient lighting",
    },
    RequirementRule {
        any_of: &["rug", "地毯"],
        also_any_of: &[],
        highlight: None,
        prompt: ", large area rug adding warmth",
    },
    RequirementRule {
        any_of: &["art", "画", "艺术"],
        also_any_of: &[],
        highlight: None,
        prompt: ", beautiful wall art and decorative pieces",
    },
    RequirementRule {
        any_of: &["computer", "pc", "电脑", "计算机"],
        also_any_of: &[],
        highlight: Some(("电脑设备", "Computer Setup")),
        prompt: ", desktop computers, computer monitors, modern PC setup",
    },
    RequirementRule {
        any_of: &["很多"],
        also_any_of: &["电脑", "计算机"],
        highlight: None,
        prompt: ", multiple desktop computers, many PC workstations, multiple monitors setup",
    },
];

fn wants_base_change(request: &ConceptRequest) -> bool {
    let text = format!("{}{}", request.special_needs, request.room_description).to_lowercase();
    BASE_CHANGE_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Template-backed generator with optional translation of free text
pub struct TemplateConceptGenerator {
    translator: Option<Arc<dyn Translator>>,
}

impl TemplateConceptGenerator {
    pub fn new(translator: Option<Arc<dyn Translator>>) -> Self {
        Self { translator }
    }

    /// English prompt built from the free-text needs, `None` when there are none
    async fn custom_prompt(&self, request: &ConceptRequest) -> Option<String> {
        let translator = self.translator.as_deref();
        let mut parts = Vec::new();
        for text in [&request.room_description, &request.special_needs] {
            if !text.trim().is_empty() {
                parts.push(translate_or_keep(translator, text).await);
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[async_trait]
impl ConceptGenerator for TemplateConceptGenerator {
    async fn generate(
        &self,
        request: &ConceptRequest,
    ) -> Result<Vec<DesignConcept>, ProviderError> {
        let style_key = normalize_style(&request.style);
        let language = request.language;
        let mut concepts: Vec<DesignConcept> = templates_for(&style_key)
            .iter()
            .map(|t| t.to_concept(language))
            .collect();

        if let Some(user_prompt) = self.custom_prompt(request).await {
            let base_change = wants_base_change(request);
            info!(
                style = %style_key,
                base_change,
                "Overriding concept prompts with user requirements"
            );

            let custom_highlights: [&str; 2] = if language.is_english() {
                ["Custom Space", "Original Structure"]
            } else {
                ["用户定制空间", "保留原始基底"]
            };
            for concept in &mut concepts {
                concept.prompt = if base_change {
                    format!(
                        "{}, interior design photograph, professional photography, realistic, detailed, high quality, 8k",
                        user_prompt
                    )
                } else {
                    format!(
                        "{}{}, interior photograph, realistic lighting, photorealistic, 8k",
                        PRESERVE_STRUCTURE_PREFIX, user_prompt
                    )
                };
                concept.highlights = custom_highlights
                    .iter()
                    .map(|h| h.to_string())
                    .chain(concept.highlights.iter().take(2).cloned())
                    .collect();
            }
        }

        for concept in &mut concepts {
            for requirement in &request.requirements {
                let requirement = requirement.to_lowercase();
                for rule in REQUIREMENT_RULES.iter().filter(|r| r.matches(&requirement)) {
                    if let Some((zh, en)) = rule.highlight {
                        concept
                            .highlights
                            .push(if language.is_english() { en } else { zh }.to_string());
                    }
                    concept.prompt.push_str(rule.prompt);
                }
            }
        }

        concepts.truncate(request.count);
        debug!(style = %style_key, count = concepts.len(), "Generated concepts");
        Ok(concepts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn request(style: &str) -> ConceptRequest {
        ConceptRequest {
            style: style.to_string(),
            requirements: Vec::new(),
            special_needs: String::new(),
            room_description: String::new(),
            language: Language::Zh,
            count: 3,
        }
    }

    #[derive(Default)]
    struct RecordingTranslator {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Translator for RecordingTranslator {
        async fn to_english(&self, text: &str) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(format!("EN({})", text.chars().count()))
        }
    }

    struct BrokenTranslator;

    #[async_trait]
    impl Translator for BrokenTranslator {
        async fn to_english(&self, _text: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Timeout)
        }
    }

    #[test]
    fn style_names_normalize() {
        assert_eq!(normalize_style("北欧风格"), "nordic");
        assert_eq!(normalize_style("Japanese"), "japanese");
        assert_eq!(normalize_style("日式"), "japanese");
        assert_eq!(normalize_style(" Industrial "), "industrial");
        assert_eq!(normalize_style("波西米亚"), "bohemian");
        assert_eq!(normalize_style("Mid Century"), "midcentury");
    }

    #[tokio::test]
    async fn templates_by_style_and_language() {
        let generator = TemplateConceptGenerator::new(None);

        let zh = generator.generate(&request("nordic")).await.unwrap();
        assert_eq!(zh.len(), 3);
        assert_eq!(zh[0].name, "北欧阳光");
        assert_eq!(zh[0].confidence, 0.94);

        let mut en_request = request("日式禅风");
        en_request.language = Language::En;
        let en = generator.generate(&en_request).await.unwrap();
        assert_eq!(en[0].name, "Zen Space");

        let unknown = generator.generate(&request("coastal")).await.unwrap();
        assert_eq!(unknown[0].name, "都市极简");
    }

    #[tokio::test]
    async fn count_truncates() {
        let generator = TemplateConceptGenerator::new(None);
        let mut req = request("modern");
        req.count = 2;
        assert_eq!(generator.generate(&req).await.unwrap().len(), 2);
        req.count = 0;
        assert!(generator.generate(&req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requirement_keywords_extend_prompts() {
        let generator = TemplateConceptGenerator::new(None);
        let mut req = request("modern");
        req.language = Language::En;
        req.requirements = vec!["plants".to_string(), "很多电脑".to_string()];

        let concepts = generator.generate(&req).await.unwrap();
        let first = &concepts[0];
        assert!(first.prompt.contains("abundant indoor plants"));
        assert!(first.prompt.contains("modern PC setup"));
        assert!(first.prompt.contains("multiple monitors setup"));
        assert!(first.highlights.contains(&"Plant Decor".to_string()));
        assert!(first.highlights.contains(&"Computer Setup".to_string()));
        assert_eq!(first.highlights.len(), 5);
    }

    #[tokio::test]
    async fn custom_needs_preserve_structure_by_default() {
        let translator = Arc::new(RecordingTranslator::default());
        let generator = TemplateConceptGenerator::new(Some(translator.clone()));
        let mut req = request("modern");
        req.room_description = "水泥墙的封闭仓库".to_string();
        req.special_needs = "a big sofa".to_string();

        let concepts = generator.generate(&req).await.unwrap();
        let prompt = &concepts[0].prompt;
        assert!(prompt.starts_with("IMPORTANT: Keep the EXACT same room structure"));
        assert!(prompt.contains("EN(8), a big sofa, interior photograph"));
        assert_eq!(
            concepts[0].highlights,
            vec!["用户定制空间", "保留原始基底", "简约大气", "功能至上"]
        );
        // English input is not sent for translation
        assert_eq!(translator.seen.lock().unwrap().as_slice(), ["水泥墙的封闭仓库"]);
    }

    #[tokio::test]
    async fn base_change_allows_full_transformation() {
        let generator = TemplateConceptGenerator::new(None);
        let mut req = request("nordic");
        req.special_needs = "please change floor to oak".to_string();

        let concepts = generator.generate(&req).await.unwrap();
        assert_eq!(
            concepts[0].prompt,
            "please change floor to oak, interior design photograph, professional photography, realistic, detailed, high quality, 8k"
        );
    }

    #[tokio::test]
    async fn failed_translation_keeps_text() {
        assert_eq!(
            translate_or_keep(Some(&BrokenTranslator), "很多电脑").await,
            "很多电脑"
        );
        assert_eq!(translate_or_keep(None, "很多电脑").await, "很多电脑");
        assert_eq!(
            translate_or_keep(Some(&BrokenTranslator), "mostly english 电").await,
            "mostly english 电"
        );
    }
}
