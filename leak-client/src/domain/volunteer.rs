use serde::Deserialize;

/// A survey volunteer. Measurements are attributed by `initials`; the pair
/// (`initials`, `city`) is unique.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Volunteer {
    pub volunteer_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub initials: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewVolunteer {
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub initials: String,
}
