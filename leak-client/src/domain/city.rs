use serde::Deserialize;

/// State recorded for a city when the roster leaves it blank.
pub const DEFAULT_STATE: &str = "MAINE";

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct City {
    pub city_id: i64,
    pub city: String,
    pub county: Option<String>,
    pub state: String,
    pub utility_provider: Option<String>,
}

/// A city row as it appears in the reference roster, before it has an id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCity {
    pub city: String,
    pub county: Option<String>,
    pub state: Option<String>,
    pub utility_provider: Option<String>,
}
