use super::{key_exists, Store};
use crate::{
    domain::{City, NewCity, NewUtilityProvider, NewVolunteer, UtilityProvider, Volunteer, DEFAULT_STATE},
    error::{classify, IntegrityKind, StoreError},
};

impl Store {
    /// Insert a provider. Providers are immutable once loaded, so an existing
    /// `company_name` is left as it is.
    pub async fn upsert_provider(&self, provider: &NewUtilityProvider) -> Result<(), StoreError> {
        let _guard = self.write_guard().await;
        sqlx::query(
            r#"
            INSERT INTO utility_providers (company_name, mailing_address, phone_number, region)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (company_name) DO NOTHING
            "#,
        )
        .bind(&provider.company_name)
        .bind(&provider.mailing_address)
        .bind(&provider.phone_number)
        .bind(&provider.region)
        .execute(&self.pool)
        .await
        .map_err(classify("utility_providers"))?;
        Ok(())
    }

    /// Insert or update a city keyed by name. The referenced provider must
    /// already exist.
    pub async fn upsert_city(&self, city: &NewCity) -> Result<(), StoreError> {
        let _guard = self.write_guard().await;
        let mut tx = self.pool.begin().await?;

        if let Some(provider) = &city.utility_provider {
            let sql = "SELECT 1 FROM utility_providers WHERE company_name = ?";
            if !key_exists(&mut *tx, sql, provider).await? {
                return Err(StoreError::integrity(
                    "cities",
                    IntegrityKind::ForeignKey,
                    format!("utility provider '{provider}' does not exist (city '{}')", city.city),
                ));
            }
        }

        let state = city.state.as_deref().unwrap_or(DEFAULT_STATE);
        sqlx::query(
            r#"
            INSERT INTO cities (city, county, state, utility_provider)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (city) DO UPDATE SET
                county = excluded.county,
                state = excluded.state,
                utility_provider = excluded.utility_provider
            "#,
        )
        .bind(&city.city)
        .bind(&city.county)
        .bind(state)
        .bind(&city.utility_provider)
        .execute(&mut *tx)
        .await
        .map_err(classify("cities"))?;

        tx.commit().await?;
        Ok(())
    }

    /// Insert or update a volunteer keyed by (initials, city).
    pub async fn upsert_volunteer(&self, volunteer: &NewVolunteer) -> Result<(), StoreError> {
        let _guard = self.write_guard().await;
        let mut tx = self.pool.begin().await?;

        if !key_exists(&mut *tx, "SELECT 1 FROM cities WHERE city = ?", &volunteer.city).await? {
            return Err(StoreError::integrity(
                "volunteers",
                IntegrityKind::ForeignKey,
                format!(
                    "city '{}' does not exist (volunteer '{}')",
                    volunteer.city, volunteer.initials
                ),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO volunteers (first_name, last_name, city, initials)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (initials, city) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name
            "#,
        )
        .bind(&volunteer.first_name)
        .bind(&volunteer.last_name)
        .bind(&volunteer.city)
        .bind(&volunteer.initials)
        .execute(&mut *tx)
        .await
        .map_err(classify("volunteers"))?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn providers(&self) -> Result<Vec<UtilityProvider>, StoreError> {
        let rows = sqlx::query_as::<_, UtilityProvider>(
            r#"
            SELECT provider_id, company_name, mailing_address, phone_number, region
            FROM utility_providers
            ORDER BY company_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn cities(&self) -> Result<Vec<City>, StoreError> {
        let rows = sqlx::query_as::<_, City>(
            "SELECT city_id, city, county, state, utility_provider FROM cities ORDER BY city",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn volunteers(&self) -> Result<Vec<Volunteer>, StoreError> {
        let rows = sqlx::query_as::<_, Volunteer>(
            r#"
            SELECT volunteer_id, first_name, last_name, city, initials
            FROM volunteers
            ORDER BY initials, city
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> NewUtilityProvider {
        NewUtilityProvider {
            company_name: name.to_string(),
            mailing_address: Some("1 Main St".to_string()),
            phone_number: None,
            region: None,
        }
    }

    fn city(name: &str, provider: Option<&str>) -> NewCity {
        NewCity {
            city: name.to_string(),
            county: Some("Penobscot".to_string()),
            state: None,
            utility_provider: provider.map(str::to_string),
        }
    }

    async fn store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn city_defaults_state_and_updates_in_place() {
        let store = store().await;
        store.upsert_provider(&provider("Bangor Gas")).await.unwrap();
        store.upsert_city(&city("Bangor", Some("Bangor Gas"))).await.unwrap();

        let mut renamed_county = city("Bangor", Some("Bangor Gas"));
        renamed_county.county = Some("Hancock".to_string());
        store.upsert_city(&renamed_county).await.unwrap();

        let cities = store.cities().await.unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].state, DEFAULT_STATE);
        assert_eq!(cities[0].county.as_deref(), Some("Hancock"));
    }

    #[tokio::test]
    async fn city_with_unknown_provider_is_an_integrity_violation() {
        let store = store().await;
        let err = store.upsert_city(&city("Orono", Some("Nobody Gas"))).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::IntegrityViolation {
                table: "cities",
                kind: IntegrityKind::ForeignKey,
                ..
            }
        ));
        assert!(store.cities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_upsert_leaves_existing_row_untouched() {
        let store = store().await;
        store.upsert_provider(&provider("Maine Natural Gas")).await.unwrap();
        let mut changed = provider("Maine Natural Gas");
        changed.mailing_address = Some("elsewhere".to_string());
        store.upsert_provider(&changed).await.unwrap();

        let providers = store.providers().await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].mailing_address.as_deref(), Some("1 Main St"));
    }

    #[tokio::test]
    async fn volunteer_requires_city_and_is_unique_per_city() {
        let store = store().await;
        let jd = NewVolunteer {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            city: "Bangor".to_string(),
            initials: "JD".to_string(),
        };
        let err = store.upsert_volunteer(&jd).await.unwrap_err();
        assert!(err.is_integrity_violation());

        store.upsert_city(&city("Bangor", None)).await.unwrap();
        store.upsert_volunteer(&jd).await.unwrap();
        store.upsert_volunteer(&jd).await.unwrap();
        assert_eq!(store.volunteers().await.unwrap().len(), 1);
    }
}
