use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;

use crate::domain::models::MarketCategory;
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
struct MarketQuery {
    market: Option<String>,
}

/// `?market=` on the resolve endpoint. Blank means every market.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketFilter(pub Option<MarketCategory>);

impl<S> FromRequestParts<S> for MarketFilter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<MarketQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(format!("Invalid query parameters: {}", e)))?;

        let market = match query.market.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                serde_json::from_value(serde_json::Value::String(raw.to_string()))
                    .map_err(|_| AppError::Validation(format!("Unknown market category: {}", raw)))?,
            ),
        };

        Ok(MarketFilter(market))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderQuery {
    provider: Option<String>,
}

/// Optional `?provider=` restricting the active LLM lookup.
#[derive(Debug, Clone, Default)]
pub struct ProviderFilter(pub Option<String>);

impl<S> FromRequestParts<S> for ProviderFilter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<ProviderQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Validation(format!("Invalid query parameters: {}", e)))?;

        Ok(ProviderFilter(
            query
                .provider
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty()),
        ))
    }
}
