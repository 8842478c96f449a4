use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::data_source::non_blank;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Mongodb,
    Redis,
    Mysql,
    Postgresql,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mongodb => "mongodb",
            Self::Redis => "redis",
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
        }
    }

    pub fn default_port(&self) -> i64 {
        match self {
            Self::Mongodb => 27017,
            Self::Redis => 6379,
            Self::Mysql => 3306,
            Self::Postgresql => 5432,
        }
    }
}

impl std::str::FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Self::Mongodb),
            "redis" => Ok(Self::Redis),
            "mysql" => Ok(Self::Mysql),
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            _ => Err(format!("Unknown database type: {}", s)),
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DatabaseConfigRecord {
    pub name: String,
    pub database_type: String,
    pub host: String,
    pub port: i64,
    pub username: Option<String>,
    pub password_encrypted: Option<String>,
    pub database_name: Option<String>,
    pub connection_params: String,
    pub pool_size: i64,
    pub max_overflow: i64,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DatabaseConfigRecord {
    pub fn kind(&self) -> Option<DatabaseKind> {
        self.database_type.parse().ok()
    }

    pub fn connection_params_json(&self) -> Map<String, JsonValue> {
        serde_json::from_str(&self.connection_params).unwrap_or_default()
    }

    pub fn to_draft(&self) -> DatabaseConfigDraft {
        DatabaseConfigDraft {
            name: Some(self.name.clone()),
            kind: self.kind(),
            host: Some(self.host.clone()),
            port: Some(self.port),
            username: self.username.clone(),
            password: None,
            database: self.database_name.clone(),
            connection_params: self.connection_params_json(),
            pool_size: Some(self.pool_size),
            max_overflow: Some(self.max_overflow),
            enabled: self.enabled,
            description: self.description.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

pub const DEFAULT_POOL_SIZE: i64 = 10;
pub const DEFAULT_MAX_OVERFLOW: i64 = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct DatabaseConfigDraft {
    #[validate(
        required(message = "name is required"),
        length(min = 1, max = 100, message = "name must be 1-100 characters")
    )]
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[validate(required(message = "type is required"))]
    pub kind: Option<DatabaseKind>,
    #[validate(
        required(message = "host is required"),
        length(min = 1, max = 255, message = "host must be 1-255 characters")
    )]
    #[schema(example = "localhost")]
    pub host: Option<String>,
    #[validate(
        required(message = "port is required"),
        range(min = 1, max = 65535, message = "port must be between 1 and 65535")
    )]
    #[schema(example = 27017)]
    pub port: Option<i64>,
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub database: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub connection_params: Map<String, JsonValue>,
    #[validate(range(min = 1, message = "pool_size must be greater than 0"))]
    pub pool_size: Option<i64>,
    #[validate(range(min = 1, message = "max_overflow must be greater than 0"))]
    pub max_overflow: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub description: Option<String>,
}

impl DatabaseConfigDraft {
    /// Trims text, drops blank optionals and fills the port from the
    /// database type when it was left out.
    pub fn normalize(&mut self) {
        self.name = self.name.take().map(|n| n.trim().to_string());
        self.host = self.host.take().map(|h| h.trim().to_string());
        self.username = non_blank(self.username.take());
        self.password = non_blank(self.password.take());
        self.database = non_blank(self.database.take());
        self.description = non_blank(self.description.take());
        if self.port.is_none() {
            self.port = self.kind.map(|k| k.default_port());
        }
    }

    pub fn apply(&mut self, patch: DatabaseConfigPatch) {
        if let Some(kind) = patch.kind {
            self.kind = Some(kind);
        }
        if patch.host.is_some() {
            self.host = patch.host;
        }
        if patch.port.is_some() {
            self.port = patch.port;
        }
        if patch.username.is_some() {
            self.username = patch.username;
        }
        if patch.password.is_some() {
            self.password = patch.password;
        }
        if patch.database.is_some() {
            self.database = patch.database;
        }
        if let Some(params) = patch.connection_params {
            self.connection_params = params;
        }
        if patch.pool_size.is_some() {
            self.pool_size = patch.pool_size;
        }
        if patch.max_overflow.is_some() {
            self.max_overflow = patch.max_overflow;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DatabaseConfigPatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DatabaseKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub connection_params: Option<Map<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_overflow: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct DatabaseConfigResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub database_type: String,
    pub host: String,
    pub port: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub has_password: bool,
    pub database: Option<String>,
    #[schema(value_type = Object)]
    pub connection_params: Map<String, JsonValue>,
    pub pool_size: i64,
    pub max_overflow: i64,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabaseConfigCreated {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_from_type() {
        let mut draft = DatabaseConfigDraft {
            name: Some("cache".into()),
            kind: Some(DatabaseKind::Redis),
            host: Some(" redis.internal ".into()),
            ..Default::default()
        };
        draft.normalize();
        assert_eq!(draft.port, Some(6379));
        assert_eq!(draft.host.as_deref(), Some("redis.internal"));
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn host_and_port_are_required() {
        let mut draft = DatabaseConfigDraft {
            name: Some("primary".into()),
            kind: Some(DatabaseKind::Mongodb),
            host: Some("".into()),
            port: Some(0),
            ..Default::default()
        };
        draft.normalize();
        let errors = draft.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("host"));
        assert!(fields.contains_key("port"));
    }

    #[test]
    fn accepts_postgres_alias() {
        assert_eq!("postgres".parse::<DatabaseKind>(), Ok(DatabaseKind::Postgresql));
        assert!("oracle".parse::<DatabaseKind>().is_err());
    }
}
