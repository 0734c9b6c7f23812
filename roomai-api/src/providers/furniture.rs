//! Furniture and product matching
//!
//! Claude acts as the product search engine; when it is unavailable or its
//! answer cannot be parsed a small curated catalog is used instead. Every
//! item carries search links for the shopping platforms of the configured
//! region.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::anthropic::{AnthropicClient, ContentBlock};
use super::{extract_json, ProviderError};
use crate::models::{FurnitureItem, FurnitureLink, Language};

const SEARCH_MAX_TOKENS: u32 = 2000;

struct Platform {
    name: &'static str,
    /// Search URL, the encoded query is appended
    search_url: &'static str,
    icon: &'static str,
}

const CA_PLATFORMS: &[Platform] = &[
    Platform {
        name: "Amazon Canada",
        search_url: "https://www.amazon.ca/s?k=",
        icon: "🛒",
    },
    Platform {
        name: "Best Buy Canada",
        search_url: "https://www.bestbuy.ca/en-ca/search?search=",
        icon: "💻",
    },
    Platform {
        name: "IKEA Canada",
        search_url: "https://www.ikea.com/ca/en/search/?q=",
        icon: "🏠",
    },
    Platform {
        name: "Wayfair Canada",
        search_url: "https://www.wayfair.ca/keyword.html?keyword=",
        icon: "🛋️",
    },
    Platform {
        name: "Structube",
        search_url: "https://www.structube.com/en_ca/search?q=",
        icon: "🪑",
    },
];

const US_PLATFORMS: &[Platform] = &[
    Platform {
        name: "Amazon US",
        search_url: "https://www.amazon.com/s?k=",
        icon: "🛒",
    },
    Platform {
        name: "Best Buy US",
        search_url: "https://www.bestbuy.com/site/searchpage.jsp?st=",
        icon: "💻",
    },
    Platform {
        name: "IKEA US",
        search_url: "https://www.ikea.com/us/en/search/?q=",
        icon: "🏠",
    },
    Platform {
        name: "Wayfair US",
        search_url: "https://www.wayfair.com/keyword.html?keyword=",
        icon: "🛋️",
    },
    Platform {
        name: "Target",
        search_url: "https://www.target.com/s?searchTerm=",
        icon: "🎯",
    },
];

const CN_PLATFORMS: &[Platform] = &[
    Platform {
        name: "淘宝",
        search_url: "https://s.taobao.com/search?q=",
        icon: "🛍️",
    },
    Platform {
        name: "天猫",
        search_url: "https://list.tmall.com/search_product.htm?q=",
        icon: "🐱",
    },
    Platform {
        name: "京东",
        search_url: "https://search.jd.com/Search?keyword=",
        icon: "📦",
    },
    Platform {
        name: "宜家中国",
        search_url: "https://www.ikea.cn/cn/zh/search/?q=",
        icon: "🏠",
    },
];

/// Shopping region: decides platforms and currency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Region {
    #[default]
    Ca,
    Us,
    Cn,
}

impl Region {
    /// Region code, unknown values fall back to Canada
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "US" => Region::Us,
            "CN" => Region::Cn,
            "CA" => Region::Ca,
            other => {
                warn!(region = other, "Unknown region, using CA");
                Region::Ca
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Ca => "CA",
            Region::Us => "US",
            Region::Cn => "CN",
        }
    }

    pub fn currency(&self) -> &'static str {
        match self {
            Region::Ca => "CAD",
            Region::Us => "USD",
            Region::Cn => "CNY",
        }
    }

    pub fn currency_symbol(&self) -> &'static str {
        match self {
            Region::Ca | Region::Us => "$",
            Region::Cn => "¥",
        }
    }

    fn platforms(&self) -> &'static [Platform] {
        match self {
            Region::Ca => CA_PLATFORMS,
            Region::Us => US_PLATFORMS,
            Region::Cn => CN_PLATFORMS,
        }
    }

    /// One search link per platform of the region
    pub fn search_links(&self, query: &str) -> Vec<FurnitureLink> {
        let encoded = urlencoding::encode(query.trim());
        self.platforms()
            .iter()
            .map(|p| FurnitureLink {
                name: p.name.to_string(),
                url: format!("{}{}", p.search_url, encoded),
                icon: p.icon.to_string(),
            })
            .collect()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FurnitureRequest {
    pub style: String,
    pub room_type: String,
    pub budget: f64,
    /// Requirement tags and special needs as one string
    pub user_needs: String,
    /// Items the user keeps; matching products are dropped
    pub exclude: Vec<String>,
    pub language: Language,
}

#[async_trait]
pub trait FurnitureMatcher: Send + Sync {
    async fn match_furniture(
        &self,
        request: &FurnitureRequest,
    ) -> Result<Vec<FurnitureItem>, ProviderError>;
}

/// External product recommendation source
#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(
        &self,
        request: &FurnitureRequest,
        region: Region,
    ) -> Result<Vec<FurnitureItem>, ProviderError>;
}

fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..8])
}

fn string_field(product: &Value, key: &str) -> Option<String> {
    product
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn price_field(product: &Value) -> f64 {
    match product.get("price") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s
            .trim()
            .trim_start_matches(['$', '¥'])
            .replace(',', "")
            .parse()
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Product recommendations from Claude
pub struct ClaudeProductSearch {
    client: Arc<AnthropicClient>,
    model: String,
}

impl ClaudeProductSearch {
    pub fn new(client: Arc<AnthropicClient>, model: String) -> Self {
        Self { client, model }
    }

    fn prompt(request: &FurnitureRequest, region: Region) -> String {
        let currency = region.currency();
        let budget = request.budget;
        let needs = if request.user_needs.trim().is_empty() {
            "No specific requests"
        } else {
            request.user_needs.trim()
        };
        format!(
            r#"You are a professional interior designer and shopping assistant. Based on the following requirements, recommend specific products.

**Room Style**: {style}
**Room Type**: {room_type}
**Budget**: {budget} {currency}
**User's Specific Requests**: {needs}
**Region**: {region} (use local pricing and stores)

⚠️ CRITICAL INSTRUCTIONS - YOU MUST FOLLOW EXACTLY:

1. **ONLY recommend products that the user specifically asked for.**
   - If user said "只要电脑" or "很多电脑" (only computers / many computers), recommend ONLY computers, monitors, and PC-related equipment
   - If user said "不要家具" (no furniture), do NOT include any furniture
   - If user said "华硕显示器" (ASUS monitor), include ASUS monitors

2. **Parse the user's request carefully:**
   - "电脑" or "计算机" = computer / PC / desktop computer
   - "很多电脑" = many computers / multiple computers / multiple PC setups
   - "笔记本" = laptop
   - "显示器" = monitor / display screen
   - "厨具" = kitchen utensils
   - "家具" = furniture (sofas, tables, chairs)

3. **If user specified NO other items, recommend ONLY what they asked for**
   - Do not add "helpful suggestions"
   - Do not add decorations or accessories unless asked

4. **Prices must be realistic for {region} market in {currency}**

5. **Total cost should be within the budget of {budget} {currency}**

For each product, provide name, brand, category, estimated price in {currency}, dimensions and search keywords.

Respond in JSON format only:
{{
  "products": [
    {{
      "name": "Product Name",
      "name_en": "English Name",
      "brand": "Brand Name",
      "category": "furniture|electronics|decor|lighting",
      "price": 299.99,
      "dimensions": "100x50x75cm",
      "search_keywords": "brand model type"
    }}
  ],
  "total_cost": 1234.56,
  "notes": "Brief note about the selection"
}}"#,
            style = request.style,
            room_type = request.room_type,
        )
    }

    fn to_item(product: &Value, region: Region) -> FurnitureItem {
        let name = string_field(product, "name").unwrap_or_else(|| "Unknown".to_string());
        let query = string_field(product, "search_keywords").unwrap_or_else(|| name.clone());
        FurnitureItem {
            id: short_id("claude"),
            name_en: Some(string_field(product, "name_en").unwrap_or_else(|| name.clone())),
            brand: string_field(product, "brand").unwrap_or_else(|| "Various".to_string()),
            category: string_field(product, "category").unwrap_or_else(|| "furniture".to_string()),
            price: price_field(product),
            dimensions: string_field(product, "dimensions")
                .unwrap_or_else(|| "See product page".to_string()),
            image: String::new(),
            links: region.search_links(&query),
            name,
        }
    }
}

#[async_trait]
impl ProductSearch for ClaudeProductSearch {
    async fn search(
        &self,
        request: &FurnitureRequest,
        region: Region,
    ) -> Result<Vec<FurnitureItem>, ProviderError> {
        let text = self
            .client
            .message(
                &self.model,
                SEARCH_MAX_TOKENS,
                vec![ContentBlock::text(Self::prompt(request, region))],
            )
            .await?;
        let data = extract_json(&text)?;
        let products = data
            .get("products")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::Parse("Response has no products list".to_string()))?;

        let items: Vec<FurnitureItem> = products
            .iter()
            .filter(|p| p.is_object())
            .map(|p| Self::to_item(p, region))
            .collect();
        info!(count = items.len(), region = %region, "Claude recommended products");
        Ok(items)
    }
}

struct CatalogEntry {
    name: &'static str,
    name_en: &'static str,
    brand: &'static str,
    category: &'static str,
    price: f64,
    dimensions: &'static str,
    search: &'static str,
}

impl CatalogEntry {
    fn to_item(&self, region: Region) -> FurnitureItem {
        FurnitureItem {
            id: short_id("fb"),
            name: self.name.to_string(),
            name_en: Some(self.name_en.to_string()),
            category: self.category.to_string(),
            price: self.price,
            image: String::new(),
            links: region.search_links(self.search),
            dimensions: self.dimensions.to_string(),
            brand: self.brand.to_string(),
        }
    }
}

/// Extras added when any keyword appears in the user's needs
const KEYWORD_EXTRAS: &[(&[&str], &[CatalogEntry])] = &[
    (
        &["asus", "华硕", "msi", "gaming", "游戏", "电竞"],
        &[
            CatalogEntry {
                name: "ASUS ROG 27寸电竞显示器",
                name_en: "ASUS ROG 27\" Gaming Monitor",
                brand: "ASUS",
                category: "electronics",
                price: 449.99,
                dimensions: "61.4 x 42.8 x 21.1 cm",
                search: "ASUS ROG gaming monitor 27",
            },
            CatalogEntry {
                name: "电竞机械键盘 RGB",
                name_en: "Mechanical Gaming Keyboard RGB",
                brand: "ASUS/Razer",
                category: "electronics",
                price: 149.99,
                dimensions: "44 x 14 x 4 cm",
                search: "mechanical gaming keyboard RGB",
            },
        ],
    ),
    (
        &["apple", "苹果", "mac", "imac"],
        &[CatalogEntry {
            name: "Apple Studio Display 27寸",
            name_en: "Apple Studio Display 27\"",
            brand: "Apple",
            category: "electronics",
            price: 1999.99,
            dimensions: "62.3 x 47.8 x 16.8 cm",
            search: "Apple Studio Display",
        }],
    ),
];

const fn furniture(
    name: &'static str,
    name_en: &'static str,
    brand: &'static str,
    price: f64,
    dimensions: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        name,
        name_en,
        brand,
        category: "furniture",
        price,
        dimensions,
        search: name_en,
    }
}

const MODERN_FURNITURE: &[CatalogEntry] = &[
    furniture("现代简约沙发", "Modern Minimalist Sofa", "Various", 899.99, "220x90x85cm"),
    furniture("大理石茶几", "Marble Coffee Table", "Various", 349.99, "120x60x45cm"),
    furniture("落地灯", "Floor Lamp", "Various", 129.99, "Height 160cm"),
];

const NORDIC_FURNITURE: &[CatalogEntry] = &[
    furniture("北欧布艺沙发", "Nordic Fabric Sofa", "IKEA", 799.99, "200x85x80cm"),
    furniture("原木茶几", "Solid Wood Coffee Table", "IKEA", 249.99, "110x55x40cm"),
    furniture("羊毛地毯", "Wool Area Rug", "Various", 299.99, "200x300cm"),
];

const JAPANESE_FURNITURE: &[CatalogEntry] = &[
    furniture("榻榻米沙发", "Tatami Style Sofa", "MUJI", 699.99, "180x80x35cm"),
    furniture("日式矮桌", "Japanese Low Table", "MUJI", 199.99, "100x60x35cm"),
    furniture("纸灯笼", "Paper Lantern Light", "Various", 79.99, "Ø45cm"),
];

fn style_furniture(style: &str) -> &'static [CatalogEntry] {
    let lower = style.to_lowercase();
    if lower.contains("现代") || lower.contains("modern") {
        MODERN_FURNITURE
    } else if lower.contains("北欧") || lower.contains("nordic") {
        NORDIC_FURNITURE
    } else if lower.contains("日式") || lower.contains("japanese") {
        JAPANESE_FURNITURE
    } else {
        MODERN_FURNITURE
    }
}

/// Curated products: keyword extras followed by the style's furniture set
pub fn fallback_products(style: &str, user_needs: &str, region: Region) -> Vec<FurnitureItem> {
    let needs = user_needs.to_lowercase();
    KEYWORD_EXTRAS
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| needs.contains(k)))
        .flat_map(|(_, entries)| entries.iter())
        .chain(style_furniture(style).iter())
        .map(|entry| entry.to_item(region))
        .collect()
}

/// Search-backed matcher with the curated catalog as fallback
pub struct CatalogFurnitureMatcher {
    search: Option<Arc<dyn ProductSearch>>,
    region: Region,
}

impl CatalogFurnitureMatcher {
    pub fn new(search: Option<Arc<dyn ProductSearch>>, region: Region) -> Self {
        Self { search, region }
    }

    pub fn region(&self) -> Region {
        self.region
    }
}

#[async_trait]
impl FurnitureMatcher for CatalogFurnitureMatcher {
    async fn match_furniture(
        &self,
        request: &FurnitureRequest,
    ) -> Result<Vec<FurnitureItem>, ProviderError> {
        let products = match &self.search {
            Some(search) => match search.search(request, self.region).await {
                Ok(products) => products,
                Err(e) => {
                    warn!(error = %e, "Product search failed, using fallback catalog");
                    fallback_products(&request.style, &request.user_needs, self.region)
                }
            },
            None => fallback_products(&request.style, &request.user_needs, self.region),
        };

        let exclude: Vec<String> = request
            .exclude
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let mut products: Vec<FurnitureItem> = products
            .into_iter()
            .filter(|p| {
                let name = p.name.to_lowercase();
                !exclude.iter().any(|e| name.contains(e.as_str()))
            })
            .collect();

        if request.language.is_english() {
            for product in &mut products {
                if let Some(english) = product.name_en.take().filter(|n| !n.is_empty()) {
                    product.name_en = Some(std::mem::replace(&mut product.name, english));
                }
            }
        }

        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::serve;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    fn request(style: &str, needs: &str) -> FurnitureRequest {
        FurnitureRequest {
            style: style.to_string(),
            room_type: "living".to_string(),
            budget: 5000.0,
            user_needs: needs.to_string(),
            exclude: Vec::new(),
            language: Language::Zh,
        }
    }

    struct Unavailable;

    #[async_trait]
    impl ProductSearch for Unavailable {
        async fn search(
            &self,
            _: &FurnitureRequest,
            _: Region,
        ) -> Result<Vec<FurnitureItem>, ProviderError> {
            Err(ProviderError::Network("offline".to_string()))
        }
    }

    #[test]
    fn region_parsing_and_currency() {
        assert_eq!(Region::parse("us"), Region::Us);
        assert_eq!(Region::parse("CN"), Region::Cn);
        assert_eq!(Region::parse("mars"), Region::Ca);
        assert_eq!(Region::Cn.currency(), "CNY");
        assert_eq!(Region::Cn.currency_symbol(), "¥");
        assert_eq!(Region::Us.to_string(), "US");
    }

    #[test]
    fn search_links_encode_query() {
        let links = Region::Us.search_links("Floor Lamp");
        assert_eq!(links.len(), 5);
        assert_eq!(links[0].url, "https://www.amazon.com/s?k=Floor%20Lamp");
        assert_eq!(links[4].name, "Target");

        let cn = Region::Cn.search_links("沙发");
        assert_eq!(cn.len(), 4);
        assert_eq!(cn[2].url, "https://search.jd.com/Search?keyword=%E6%B2%99%E5%8F%91");
    }

    #[test]
    fn fallback_adds_keyword_extras_before_style_set() {
        let products = fallback_products("日式禅风", "想要 ASUS 电竞 和 iMac", Region::Ca);
        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ASUS ROG 27寸电竞显示器",
                "电竞机械键盘 RGB",
                "Apple Studio Display 27寸",
                "榻榻米沙发",
                "日式矮桌",
                "纸灯笼"
            ]
        );
        assert!(products.iter().all(|p| p.id.starts_with("fb-") && p.id.len() == 11));

        let plain = fallback_products("bohemian", "", Region::Ca);
        assert_eq!(plain[0].name, "现代简约沙发");
    }

    #[tokio::test]
    async fn exclusions_and_english_names() {
        let matcher = CatalogFurnitureMatcher::new(Some(Arc::new(Unavailable)), Region::Ca);
        let mut req = request("nordic", "");
        req.exclude = vec!["沙发".to_string()];
        req.language = Language::En;

        let products = matcher.match_furniture(&req).await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Solid Wood Coffee Table");
        assert_eq!(products[0].name_en.as_deref(), Some("原木茶几"));
    }

    #[tokio::test]
    async fn claude_products_get_defaults_and_links() {
        let router = Router::new().route(
            "/v1/messages",
            post(|Json(body): Json<Value>| async move {
                let prompt = body["messages"][0]["content"][0]["text"]
                    .as_str()
                    .unwrap()
                    .to_string();
                assert!(prompt.contains("**Budget**: 5000 CNY"));
                let reply = json!({
                    "products": [
                        {
                            "name": "华硕显示器",
                            "name_en": "ASUS Monitor",
                            "brand": "ASUS",
                            "category": "electronics",
                            "price": "2,499",
                            "search_keywords": "ASUS ProArt"
                        },
                        {"name": "Desk"}
                    ]
                });
                let text = format!("```json\n{}\n```", reply);
                Json(json!({"content": [{"type": "text", "text": text}]}))
            }),
        );
        let base = serve(router).await;
        let client = Arc::new(AnthropicClient::new(&base, "k", 600).unwrap());
        let search = ClaudeProductSearch::new(client, "claude-test".to_string());

        let items = search.search(&request("modern", "显示器"), Region::Cn).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price, 2499.0);
        assert_eq!(items[0].links[0].url, "https://s.taobao.com/search?q=ASUS%20ProArt");
        assert!(items[0].id.starts_with("claude-"));

        assert_eq!(items[1].brand, "Various");
        assert_eq!(items[1].category, "furniture");
        assert_eq!(items[1].dimensions, "See product page");
        assert_eq!(items[1].name_en.as_deref(), Some("Desk"));
        assert_eq!(items[1].price, 0.0);
    }
}
