use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    Tushare,
    Akshare,
    Baostock,
    Yfinance,
    Finnhub,
    AlphaVantage,
    Custom,
}

impl DataSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tushare => "tushare",
            Self::Akshare => "akshare",
            Self::Baostock => "baostock",
            Self::Yfinance => "yfinance",
            Self::Finnhub => "finnhub",
            Self::AlphaVantage => "alpha_vantage",
            Self::Custom => "custom",
        }
    }

    /// Endpoint probed when a config does not name its own. Library-backed
    /// sources (akshare, baostock) and custom sources have none.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::Tushare => Some("https://api.tushare.pro"),
            Self::Yfinance => Some("https://query1.finance.yahoo.com"),
            Self::Finnhub => Some("https://finnhub.io/api/v1"),
            Self::AlphaVantage => Some("https://www.alphavantage.co"),
            Self::Akshare | Self::Baostock | Self::Custom => None,
        }
    }
}

impl std::str::FromStr for DataSourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tushare" => Ok(Self::Tushare),
            "akshare" => Ok(Self::Akshare),
            "baostock" => Ok(Self::Baostock),
            "yfinance" => Ok(Self::Yfinance),
            "finnhub" => Ok(Self::Finnhub),
            "alpha_vantage" => Ok(Self::AlphaVantage),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Unknown data source type: {}", s)),
        }
    }
}

impl std::fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum MarketCategory {
    AShares,
    HkStocks,
    UsStocks,
    Futures,
    Funds,
    Crypto,
}

/// Row of `data_source_configs`. Secrets stay sealed until a service opens them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DataSourceRecord {
    pub name: String,
    pub source_type: String,
    pub api_key_encrypted: Option<String>,
    pub api_secret_encrypted: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<i64>,
    pub rate_limit: Option<i64>,
    pub enabled: bool,
    pub priority: i64,
    pub config_params: String,
    pub market_categories: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DataSourceRecord {
    pub fn source_type(&self) -> Option<DataSourceType> {
        self.source_type.parse().ok()
    }

    pub fn config_params_json(&self) -> Map<String, JsonValue> {
        serde_json::from_str(&self.config_params).unwrap_or_default()
    }

    pub fn market_categories_list(&self) -> Vec<MarketCategory> {
        serde_json::from_str(&self.market_categories).unwrap_or_default()
    }

    /// Untagged sources serve every market.
    pub fn serves_market(&self, market: MarketCategory) -> bool {
        let markets = self.market_categories_list();
        markets.is_empty() || markets.contains(&market)
    }

    /// The record's non-secret fields in the shape accepted by `add`.
    pub fn to_draft(&self) -> DataSourceDraft {
        DataSourceDraft {
            name: Some(self.name.clone()),
            source_type: self.source_type(),
            api_key: None,
            api_secret: None,
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
            rate_limit: self.rate_limit,
            enabled: self.enabled,
            priority: self.priority,
            config_params: self.config_params_json(),
            market_categories: self.market_categories_list(),
            description: self.description.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A complete data source definition as submitted for creation. Updates are
/// merged into one of these and validated again before anything is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct DataSourceDraft {
    #[validate(
        required(message = "name is required"),
        length(min = 1, max = 100, message = "name must be 1-100 characters"),
        custom(function = "not_a_route_segment")
    )]
    #[schema(example = "tushare")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[validate(required(message = "type is required"))]
    pub source_type: Option<DataSourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[validate(url(message = "endpoint must be a valid URL"))]
    pub endpoint: Option<String>,
    #[validate(range(min = 1, message = "timeout must be greater than 0"))]
    #[schema(example = 30)]
    pub timeout: Option<i64>,
    #[validate(range(min = 1, message = "rate_limit must be greater than 0"))]
    #[schema(example = 100)]
    pub rate_limit: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config_params: Map<String, JsonValue>,
    #[serde(default)]
    pub market_categories: Vec<MarketCategory>,
    pub description: Option<String>,
}

impl DataSourceDraft {
    /// Trims text fields, drops blank optionals and dedupes market tags.
    pub fn normalize(&mut self) {
        self.name = self.name.take().map(|n| n.trim().to_string());
        self.endpoint = non_blank(self.endpoint.take());
        self.api_key = non_blank(self.api_key.take());
        self.api_secret = non_blank(self.api_secret.take());
        self.description = non_blank(self.description.take());
        self.market_categories.sort();
        self.market_categories.dedup();
    }

    pub fn apply(&mut self, patch: DataSourcePatch) {
        if let Some(source_type) = patch.source_type {
            self.source_type = Some(source_type);
        }
        if patch.api_key.is_some() {
            self.api_key = patch.api_key;
        }
        if patch.api_secret.is_some() {
            self.api_secret = patch.api_secret;
        }
        if patch.endpoint.is_some() {
            self.endpoint = patch.endpoint;
        }
        if patch.timeout.is_some() {
            self.timeout = patch.timeout;
        }
        if patch.rate_limit.is_some() {
            self.rate_limit = patch.rate_limit;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(params) = patch.config_params {
            self.config_params = params;
        }
        if let Some(markets) = patch.market_categories {
            self.market_categories = markets;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
    }
}

/// Path segments the data source routes claim for themselves; a source
/// with one of these names could never be addressed by name.
pub const RESERVED_DATA_SOURCE_NAMES: [&str; 2] = ["set-default", "resolve"];

fn not_a_route_segment(name: &str) -> Result<(), ValidationError> {
    if RESERVED_DATA_SOURCE_NAMES.contains(&name) {
        return Err(ValidationError::new("reserved")
            .with_message(Cow::from(format!("'{}' is a reserved name", name))));
    }
    Ok(())
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Partial update; absent fields (and blank secrets) leave the stored value as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DataSourcePatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<DataSourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub config_params: Option<Map<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_categories: Option<Vec<MarketCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct DataSourceResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub has_api_key: bool,
    pub has_api_secret: bool,
    pub endpoint: Option<String>,
    pub timeout: Option<i64>,
    pub rate_limit: Option<i64>,
    pub enabled: bool,
    pub priority: i64,
    #[schema(value_type = Object)]
    pub config_params: Map<String, JsonValue>,
    pub market_categories: Vec<MarketCategory>,
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataSourceCreated {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetDefaultDataSourceRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResolveDataSourcesQuery {
    pub market: Option<MarketCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> DataSourceDraft {
        DataSourceDraft {
            name: Some("tushare".into()),
            source_type: Some(DataSourceType::Tushare),
            timeout: Some(30),
            rate_limit: Some(100),
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn complete_draft_is_valid() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn missing_name_is_reported_against_name() {
        let mut d = draft();
        d.name = None;
        let errors = d.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn route_segments_are_reserved_names() {
        for reserved in RESERVED_DATA_SOURCE_NAMES {
            let mut d = draft();
            d.name = Some(reserved.into());
            let errors = d.validate().unwrap_err();
            assert!(errors.field_errors().contains_key("name"));
        }

        let mut d = draft();
        d.name = Some("resolver".into());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn non_positive_limits_are_rejected() {
        let mut d = draft();
        d.timeout = Some(0);
        d.rate_limit = Some(-5);
        let errors = d.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("timeout"));
        assert!(fields.contains_key("rate_limit"));
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut d = draft();
        d.apply(DataSourcePatch {
            priority: Some(3),
            ..Default::default()
        });
        assert_eq!(d.priority, 3);
        assert_eq!(d.timeout, Some(30));
        assert_eq!(d.name.as_deref(), Some("tushare"));
    }

    #[test]
    fn type_uses_snake_case_on_the_wire() {
        let parsed: DataSourceDraft =
            serde_json::from_str(r#"{"name":"av","type":"alpha_vantage"}"#).unwrap();
        assert_eq!(parsed.source_type, Some(DataSourceType::AlphaVantage));
        assert!(parsed.enabled);
        assert_eq!("alpha_vantage".parse::<DataSourceType>(), Ok(DataSourceType::AlphaVantage));
    }

    #[test]
    fn normalize_dedupes_markets_and_drops_blank_secrets() {
        let mut d = draft();
        d.api_key = Some("   ".into());
        d.market_categories = vec![MarketCategory::UsStocks, MarketCategory::AShares, MarketCategory::UsStocks];
        d.normalize();
        assert_eq!(d.api_key, None);
        assert_eq!(d.market_categories, vec![MarketCategory::AShares, MarketCategory::UsStocks]);
    }
}
