//! Design generation data types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::Language;

const DEFAULT_STYLE: &str = "modern";
const DEFAULT_BUDGET: f64 = 10_000.0;

/// Style as sent by clients: a plain name or a `{ "id": ... }` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleChoice {
    Name(String),
    Object {
        #[serde(default)]
        id: Option<String>,
    },
}

impl Default for StyleChoice {
    fn default() -> Self {
        StyleChoice::Name(DEFAULT_STYLE.to_string())
    }
}

impl StyleChoice {
    /// Style identifier, `modern` when blank
    pub fn id(&self) -> &str {
        let raw = match self {
            StyleChoice::Name(name) => name.as_str(),
            StyleChoice::Object { id } => id.as_deref().unwrap_or(DEFAULT_STYLE),
        };
        if raw.trim().is_empty() {
            DEFAULT_STYLE
        } else {
            raw.trim()
        }
    }
}

/// User preferences for a redesign; unknown fields are ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignPreferences {
    pub style: StyleChoice,
    pub budget: f64,
    pub budget_range: Option<Vec<f64>>,
    pub keep_furniture: Vec<String>,
    pub requirements: Vec<String>,
    pub color_preference: Vec<String>,
    /// Specific furniture/decoration requests, free text
    pub special_needs: String,
    pub room_description: String,
    pub additional_notes: String,
}

impl Default for DesignPreferences {
    fn default() -> Self {
        Self {
            style: StyleChoice::default(),
            budget: DEFAULT_BUDGET,
            budget_range: None,
            keep_furniture: Vec::new(),
            requirements: Vec::new(),
            color_preference: Vec::new(),
            special_needs: String::new(),
            room_description: String::new(),
            additional_notes: String::new(),
        }
    }
}

impl DesignPreferences {
    /// All free-text requirements merged into one instruction
    pub fn combined_requirements(&self) -> String {
        let mut combined = String::new();
        if !self.room_description.trim().is_empty() {
            combined.push_str(&format!("Room condition: {}. ", self.room_description.trim()));
        }
        combined.push_str(self.special_needs.trim());
        if !self.additional_notes.trim().is_empty() {
            combined.push_str(&format!(
                " Additional requirements: {}",
                self.additional_notes.trim()
            ));
        }
        combined.trim().to_string()
    }

    /// Tags plus special needs, used for product keyword detection
    pub fn user_needs(&self) -> String {
        let mut needs = self.requirements.join(" ");
        if !self.special_needs.trim().is_empty() {
            needs.push(' ');
            needs.push_str(self.special_needs.trim());
        }
        needs.trim().to_string()
    }
}

/// Payload stored with a design job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignInput {
    /// Analysis job this design builds on (absent for free-standing requests)
    pub analysis_id: Option<Uuid>,
    pub preferences: DesignPreferences,
    #[serde(default)]
    pub language: Language,
}

/// Textual design idea produced by the concepts stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignConcept {
    pub name: String,
    pub description: String,
    pub highlights: Vec<String>,
    /// Image generation prompt
    pub prompt: String,
    pub confidence: f64,
}

/// Shopping link for a furniture item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurnitureLink {
    pub name: String,
    pub url: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurnitureItem {
    pub id: String,
    pub name: String,
    pub name_en: Option<String>,
    pub category: String,
    pub price: f64,
    pub image: String,
    pub links: Vec<FurnitureLink>,
    pub dimensions: String,
    pub brand: String,
}

/// One finished proposal of a design job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignProposal {
    /// `<job id>-<n>`, n starting at 1
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub style: String,
    pub confidence: f64,
    /// `None` when product matching was skipped
    pub furniture: Option<Vec<FurnitureItem>>,
    pub total_cost: f64,
    pub highlights: Vec<String>,
}

impl FurnitureItem {
    /// Canned catalog entries for the furniture demo endpoint
    pub fn demo_items() -> Vec<Self> {
        let item = |id: &str, name: &str, name_en: &str, category: &str, price: f64| {
            FurnitureItem {
                id: id.to_string(),
                name: name.to_string(),
                name_en: Some(name_en.to_string()),
                category: category.to_string(),
                price,
                image: String::new(),
                links: Vec::new(),
                dimensions: String::new(),
                brand: String::new(),
            }
        };

        let mut sofa = item("demo-f1", "北欧布艺沙发", "Nordic Fabric Sofa", "sofa", 3200.0);
        sofa.image = "https://example.com/sofa.jpg".to_string();
        sofa.dimensions = "220x85x80cm".to_string();
        sofa.brand = "IKEA".to_string();
        sofa.links = vec![FurnitureLink {
            name: "IKEA".to_string(),
            url: "https://www.ikea.cn/cn/zh/".to_string(),
            icon: "🏠".to_string(),
        }];

        let mut table = item("demo-f2", "原木茶几", "Solid Wood Coffee Table", "table", 1200.0);
        table.image = "https://example.com/table.jpg".to_string();
        table.dimensions = "120x60x45cm".to_string();
        table.brand = "源氏木语".to_string();

        let mut lamp = item(
            "demo-f3",
            "日式纸灯笼吊灯",
            "Japanese Paper Lantern",
            "lighting",
            520.0,
        );
        lamp.image = "https://example.com/lamp.jpg".to_string();
        lamp.dimensions = "D45cm".to_string();
        lamp.brand = "Noguchi".to_string();

        vec![sofa, table, lamp]
    }
}

impl DesignProposal {
    pub fn proposal_id(job_id: Uuid, index: usize) -> String {
        format!("{}-{}", job_id, index + 1)
    }

    /// Attach a product list and recompute the total
    pub fn with_furniture(mut self, furniture: Option<Vec<FurnitureItem>>) -> Self {
        self.total_cost = furniture
            .as_ref()
            .map(|items| items.iter().map(|f| f.price).sum())
            .unwrap_or(0.0);
        self.furniture = furniture;
        self
    }

    /// Canned proposals for the demo endpoint
    pub fn demo() -> Vec<Self> {
        let link = |name: &str, url: &str, icon: &str| FurnitureLink {
            name: name.to_string(),
            url: url.to_string(),
            icon: icon.to_string(),
        };

        vec![
            DesignProposal {
                id: "demo-design-1".to_string(),
                name: "都市雅韵".to_string(),
                description: "融合现代简约与北欧温暖，打造都市人的理想居所".to_string(),
                image_url: "https://images.unsplash.com/photo-1586023492125-27b2c045efd7?w=1200&q=80"
                    .to_string(),
                style: "现代简约 + 北欧".to_string(),
                confidence: 0.95,
                furniture: Some(vec![
                    FurnitureItem {
                        id: "f1".to_string(),
                        name: "北欧布艺沙发".to_string(),
                        name_en: Some("Nordic Fabric Sofa".to_string()),
                        category: "沙发".to_string(),
                        price: 3200.0,
                        image: String::new(),
                        links: vec![
                            link("Amazon", "https://www.amazon.ca/s?k=nordic+fabric+sofa", "🛒"),
                            link("IKEA", "https://www.ikea.com/ca/en/search/?q=sofa", "🏠"),
                        ],
                        dimensions: "220x85x80cm".to_string(),
                        brand: "IKEA".to_string(),
                    },
                    FurnitureItem {
                        id: "f2".to_string(),
                        name: "原木茶几".to_string(),
                        name_en: Some("Solid Wood Coffee Table".to_string()),
                        category: "茶几".to_string(),
                        price: 1200.0,
                        image: String::new(),
                        links: vec![
                            link("Amazon", "https://www.amazon.ca/s?k=wood+coffee+table", "🛒"),
                            link(
                                "Wayfair",
                                "https://www.wayfair.ca/keyword.html?keyword=coffee+table",
                                "🛋️",
                            ),
                        ],
                        dimensions: "120x60x45cm".to_string(),
                        brand: "源氏木语".to_string(),
                    },
                ]),
                total_cost: 8500.0,
                highlights: ["开放式布局", "自然光优化", "多功能储物"]
                    .map(String::from)
                    .to_vec(),
            },
            DesignProposal {
                id: "demo-design-2".to_string(),
                name: "禅意栖居".to_string(),
                description: "极简日式美学，营造宁静致远的生活空间".to_string(),
                image_url: "https://images.unsplash.com/photo-1583847268964-b28dc8f51f92?w=1200&q=80"
                    .to_string(),
                style: "日式禅风".to_string(),
                confidence: 0.92,
                furniture: Some(vec![FurnitureItem {
                    id: "f3".to_string(),
                    name: "榻榻米沙发".to_string(),
                    name_en: Some("Tatami Sofa".to_string()),
                    category: "沙发".to_string(),
                    price: 2800.0,
                    image: String::new(),
                    links: vec![
                        link("Amazon", "https://www.amazon.ca/s?k=tatami+sofa", "🛒"),
                        link("MUJI", "https://muji.ca/search?q=sofa", "🎍"),
                    ],
                    dimensions: "200x90x35cm".to_string(),
                    brand: "木智工坊".to_string(),
                }]),
                total_cost: 7200.0,
                highlights: ["极简设计", "自然材质", "禅意氛围"].map(String::from).to_vec(),
            },
        ]
    }
}
