use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UtilityProvider {
    pub provider_id: i64,
    pub company_name: String,
    pub mailing_address: Option<String>,
    pub phone_number: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewUtilityProvider {
    pub company_name: String,
    pub mailing_address: Option<String>,
    pub phone_number: Option<String>,
    pub region: Option<String>,
}
