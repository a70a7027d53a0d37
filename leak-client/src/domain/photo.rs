#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Photo {
    pub photo_id: String,
    pub photo: Vec<u8>,
}
