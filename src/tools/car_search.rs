//! Car listing search tool
//!
//! Queries a used-car listing API and simplifies the results. When the live
//! search is unreachable or answers with something unusable, a fixed set of
//! demonstration listings is returned instead, labelled as such.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::CarSearchConfig;
use crate::core::{Result, ToolDeclaration, ToolOutcome};
use crate::tools::registry::Tool;

const LISTING_BASE_URL: &str = "https://www.iautos.fr/annonce/";
const DEMO_NOTE: &str = "Note: Live search failed or is restricted. Showing demonstration data.";

/// Tool that searches cars for sale
#[derive(Debug, Clone)]
pub struct CarSearchTool {
    client: reqwest::Client,
    endpoint: String,
    page_size: u32,
}

/// A listing reduced to what the model needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarListing {
    pub id: String,
    pub title: String,
    pub price: String,
    pub year: String,
    pub mileage: String,
    pub fuel: String,
    pub gearbox: String,
    pub location: String,
    pub image_url: String,
    pub link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RawListing>,
    total_items: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListing {
    id: Option<Value>,
    title: Option<String>,
    price: Option<Value>,
    attributes: Option<RawAttributes>,
    localisation: Option<RawLocalisation>,
    main_image_url: Option<String>,
    seo_slug: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttributes {
    attr_car_year: Option<Value>,
    attr_car_mileage: Option<Value>,
    attr_car_energy: Option<Value>,
    attr_car_gearbox: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocalisation {
    city: Option<String>,
    postcode: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriceOrder {
    Asc,
    Desc,
}

impl PriceOrder {
    fn as_str(&self) -> &'static str {
        match self {
            PriceOrder::Asc => "asc",
            PriceOrder::Desc => "desc",
        }
    }
}

impl CarSearchTool {
    /// Create a tool talking to `endpoint`
    pub fn new(endpoint: impl Into<String>, page_size: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            page_size,
        })
    }

    /// Create from the `[car_search]` config section
    pub fn from_config(config: &CarSearchConfig) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.page_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn live_search(&self, query: &str, order: PriceOrder) -> std::result::Result<Value, String> {
        let body = json!({
            "page": 1,
            "limit": self.page_size,
            "search": query,
            "subcategory": "sell",
            "order": {
                "price": order.as_str(),
                "createdAt": "desc"
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("listing API returned {}", status));
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(|e| format!("undecodable listing response: {}", e))?;

        let cars: Vec<CarListing> = data.items.into_iter().map(simplify).collect();
        let count = data.total_items.unwrap_or(cars.len() as u64);
        Ok(json!({ "count": count, "cars": cars }))
    }
}

#[async_trait]
impl Tool for CarSearchTool {
    fn declaration(&self) -> ToolDeclaration {
        declaration()
    }

    async fn execute(&self, arguments: &Value) -> ToolOutcome {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| "Missing required argument 'query'".to_string())?;

        let order = match arguments.get("sortByPrice").and_then(|v| v.as_str()) {
            None | Some("asc") => PriceOrder::Asc,
            Some("desc") => PriceOrder::Desc,
            Some(other) => {
                return Err(format!(
                    "Invalid sortByPrice '{}': expected 'asc' or 'desc'",
                    other
                ))
            }
        };

        match self.live_search(query, order).await {
            Ok(result) => {
                tracing::debug!(query, "live car search succeeded");
                Ok(result)
            }
            Err(reason) => {
                tracing::warn!(query, %reason, "live car search failed, using demonstration data");
                Ok(demo_result())
            }
        }
    }
}

/// Declaration advertised to agents that may search listings
pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        "search_cars",
        "Search for cars for sale in France. Returns a list of vehicles with details like price, mileage, and images.",
        json!({
            "type": "OBJECT",
            "properties": {
                "query": {
                    "type": "STRING",
                    "description": "The brand, model, or keywords to search for (e.g., \"Renault Clio\", \"BMW X5\")."
                },
                "sortByPrice": {
                    "type": "STRING",
                    "enum": ["asc", "desc"],
                    "description": "Optional: Sort order for price."
                }
            },
            "required": ["query"]
        }),
    )
}

fn simplify(item: RawListing) -> CarListing {
    let attributes = item.attributes.unwrap_or_default();
    let localisation = item.localisation.unwrap_or_default();

    CarListing {
        id: display(item.id.as_ref()),
        title: item.title.unwrap_or_default(),
        price: format!("{} €", display(item.price.as_ref())),
        year: display(attributes.attr_car_year.as_ref()),
        mileage: format!("{} km", display(attributes.attr_car_mileage.as_ref())),
        fuel: display(attributes.attr_car_energy.as_ref()),
        gearbox: display(attributes.attr_car_gearbox.as_ref()),
        location: format!(
            "{} ({})",
            localisation.city.unwrap_or_default(),
            display(localisation.postcode.as_ref())
        ),
        image_url: item.main_image_url.unwrap_or_default(),
        link: format!("{}{}", LISTING_BASE_URL, item.seo_slug.unwrap_or_default()),
    }
}

/// Render a loosely-typed API field as text
fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn demo_result() -> Value {
    let cars = demo_listings();
    json!({
        "result": "Successfully retrieved car listings (Demo Data).",
        "data": {
            "count": cars.len(),
            "cars": cars,
            "note": DEMO_NOTE
        }
    })
}

/// Fixed listings served when the live search is unavailable
pub fn demo_listings() -> Vec<CarListing> {
    let car = |id: &str,
               title: &str,
               price: &str,
               year: &str,
               mileage: &str,
               fuel: &str,
               gearbox: &str,
               location: &str,
               image_url: &str,
               link: &str| CarListing {
        id: id.to_string(),
        title: title.to_string(),
        price: price.to_string(),
        year: year.to_string(),
        mileage: mileage.to_string(),
        fuel: fuel.to_string(),
        gearbox: gearbox.to_string(),
        location: location.to_string(),
        image_url: image_url.to_string(),
        link: link.to_string(),
    };

    vec![
        car(
            "mock-1",
            "Renault Clio V 1.0 TCe 100ch Intens",
            "16,990 €",
            "2021",
            "35,400 km",
            "Essence",
            "Manuelle",
            "Paris (75)",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/5/5d/2019_Renault_Clio_Iconic_TCe_100.jpg/1200px-2019_Renault_Clio_Iconic_TCe_100.jpg",
            "https://www.renault.fr",
        ),
        car(
            "mock-2",
            "Peugeot 208 II 1.2 PureTech 100ch Allure",
            "17,500 €",
            "2022",
            "22,100 km",
            "Essence",
            "Manuelle",
            "Lyon (69)",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/f/f1/Peugeot_208_II_IMG_3566.jpg/1200px-Peugeot_208_II_IMG_3566.jpg",
            "https://www.peugeot.fr",
        ),
        car(
            "mock-3",
            "Tesla Model 3 Standard Plus",
            "34,900 €",
            "2021",
            "45,000 km",
            "Électrique",
            "Automatique",
            "Bordeaux (33)",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/9/91/2019_Tesla_Model_3_Performance_AWD_Front.jpg/1200px-2019_Tesla_Model_3_Performance_AWD_Front.jpg",
            "https://www.tesla.com",
        ),
        car(
            "mock-4",
            "BMW Serie 1 118i 140ch M Sport",
            "28,900 €",
            "2023",
            "12,500 km",
            "Essence",
            "Automatique",
            "Nice (06)",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/4/43/BMW_F40_IMG_2977.jpg/1200px-BMW_F40_IMG_2977.jpg",
            "https://www.bmw.fr",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_tool() -> CarSearchTool {
        // port 9 (discard) refuses connections on loopback
        CarSearchTool::new("http://127.0.0.1:9/api/v1/cars/search", 12, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_simplify_listing() {
        let data: SearchResponse = serde_json::from_value(json!({
            "totalItems": 1,
            "items": [{
                "id": 42,
                "title": "Renault Clio",
                "price": 12000,
                "attributes": {
                    "attr_car_year": "2019",
                    "attr_car_mileage": 50000,
                    "attr_car_energy": "Diesel",
                    "attr_car_gearbox": "Manuelle"
                },
                "localisation": { "city": "Lille", "postcode": "59000" },
                "mainImageUrl": "https://img.example/clio.jpg",
                "seoSlug": "renault-clio-42"
            }]
        }))
        .unwrap();

        let listing = simplify(data.items.into_iter().next().unwrap());
        assert_eq!(listing.id, "42");
        assert_eq!(listing.price, "12000 €");
        assert_eq!(listing.mileage, "50000 km");
        assert_eq!(listing.location, "Lille (59000)");
        assert_eq!(listing.link, "https://www.iautos.fr/annonce/renault-clio-42");
    }

    #[test]
    fn test_listing_serializes_camel_case() {
        let value = serde_json::to_value(&demo_listings()[0]).unwrap();
        assert!(value.get("imageUrl").is_some());
        assert!(value.get("image_url").is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_demo_data() {
        let outcome = unreachable_tool()
            .execute(&json!({"query": "Renault Clio"}))
            .await
            .unwrap();

        assert_eq!(outcome["data"]["count"], 4);
        assert_eq!(outcome["data"]["cars"][0]["id"], "mock-1");
        assert_eq!(outcome["data"]["note"], DEMO_NOTE);
    }

    #[tokio::test]
    async fn test_rejects_bad_arguments() {
        let tool = unreachable_tool();
        assert!(tool.execute(&json!({})).await.is_err());
        assert!(tool.execute(&json!({"query": "  "})).await.is_err());
        assert!(tool
            .execute(&json!({"query": "BMW", "sortByPrice": "sideways"}))
            .await
            .is_err());
    }
}
