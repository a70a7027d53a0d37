use super::Store;
use crate::error::StoreError;

/// Table DDL in dependency order. Every statement is `IF NOT EXISTS`, so
/// applying the list to an initialized database is a no-op.
const SCHEMA: &[(&str, &str)] = &[
    (
        "utility_providers",
        r#"
        CREATE TABLE IF NOT EXISTS utility_providers (
            provider_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            company_name    TEXT NOT NULL UNIQUE,
            mailing_address TEXT,
            phone_number    TEXT,
            region          TEXT
        )
        "#,
    ),
    (
        "cities",
        r#"
        CREATE TABLE IF NOT EXISTS cities (
            city_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            city             TEXT NOT NULL UNIQUE,
            county           TEXT,
            state            TEXT NOT NULL DEFAULT 'MAINE',
            utility_provider TEXT REFERENCES utility_providers (company_name)
        )
        "#,
    ),
    (
        "photos",
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            photo_id TEXT PRIMARY KEY NOT NULL,
            photo    BLOB NOT NULL
        )
        "#,
    ),
    (
        "volunteers",
        r#"
        CREATE TABLE IF NOT EXISTS volunteers (
            volunteer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name   TEXT NOT NULL,
            last_name    TEXT NOT NULL,
            city         TEXT NOT NULL REFERENCES cities (city),
            initials     TEXT NOT NULL,
            UNIQUE (initials, city)
        )
        "#,
    ),
    (
        "measurements",
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            measurement_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            city                TEXT NOT NULL REFERENCES cities (city),
            methane_level       REAL NOT NULL,
            leak                BOOLEAN NOT NULL,
            infrastructure_type TEXT,
            photo_id            TEXT REFERENCES photos (photo_id),
            latitude            REAL NOT NULL,
            longitude           REAL NOT NULL,
            volunteer           TEXT NOT NULL,
            timestamp           TEXT NOT NULL UNIQUE
        )
        "#,
    ),
    (
        "measurements",
        "CREATE INDEX IF NOT EXISTS idx_measurements_city_ts ON measurements (city, timestamp)",
    ),
];

impl Store {
    /// Create every table and index. Safe to call on an existing database.
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        let _guard = self.write_guard().await;
        for (table, ddl) in SCHEMA {
            sqlx::query(*ddl).execute(&self.pool).await?;
            tracing::debug!(table = *table, "schema statement applied");
        }
        tracing::info!(statements = SCHEMA.len(), "database schema ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::NewUtilityProvider;
    use crate::Store;

    #[tokio::test]
    async fn create_schema_is_idempotent_and_keeps_rows() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        store
            .upsert_provider(&NewUtilityProvider {
                company_name: "Bangor Gas".to_string(),
                mailing_address: None,
                phone_number: None,
                region: Some("Penobscot".to_string()),
            })
            .await
            .unwrap();

        store.create_schema().await.unwrap();

        let providers = store.providers().await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].company_name, "Bangor Gas");
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("survey.db");

        let store = Store::open(&path).await.unwrap();
        store.create_schema().await.unwrap();
        store
            .upsert_provider(&NewUtilityProvider {
                company_name: "Summit Natural Gas".to_string(),
                mailing_address: None,
                phone_number: None,
                region: None,
            })
            .await
            .unwrap();
        store.close().await;

        let reopened = Store::open(&path).await.unwrap();
        reopened.create_schema().await.unwrap();
        assert_eq!(reopened.providers().await.unwrap().len(), 1);
    }
}
