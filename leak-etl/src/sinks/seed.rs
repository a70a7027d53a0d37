//! Seeding the reference tables from the roster CSVs.

use std::{fmt, future::Future, path::PathBuf};

use leak_client::{
    domain::{NewCity, NewUtilityProvider, NewVolunteer},
    Store, StoreError,
};
use serde::de::DeserializeOwned;

use crate::sources::reference_csv::{read_reference_csv, ReferenceCsvError};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ReferencePaths {
    pub cities: PathBuf,
    pub utilities: PathBuf,
    pub volunteers: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Csv(#[from] ReferenceCsvError),
    #[error("seed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSeedCount {
    pub upserted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub providers: TableSeedCount,
    pub cities: TableSeedCount,
    pub volunteers: TableSeedCount,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "providers: {}/{} failed, cities: {}/{} failed, volunteers: {}/{} failed",
            self.providers.upserted,
            self.providers.failed,
            self.cities.upserted,
            self.cities.failed,
            self.volunteers.upserted,
            self.volunteers.failed
        )
    }
}

/// Upsert each record, counting constraint failures instead of aborting.
async fn seed_table<T, F, Fut>(
    table: &'static str,
    path: &std::path::Path,
    mut upsert: F,
) -> Result<TableSeedCount, SeedError>
where
    T: DeserializeOwned,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let parsed = read_reference_csv::<T>(path)?;
    let mut count = TableSeedCount {
        upserted: 0,
        failed: parsed.malformed.len(),
    };

    for record in parsed.records {
        match upsert(record).await {
            Ok(()) => count.upserted += 1,
            Err(e) if e.is_integrity_violation() => {
                tracing::warn!(table, error = %e, "skipping reference record");
                count.failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(table, upserted = count.upserted, failed = count.failed, "seeded reference table");
    Ok(count)
}

/// Load providers, then cities, then volunteers so that every foreign key
/// points at a row seeded before it.
pub async fn load_reference_data(store: &Store, paths: &ReferencePaths) -> Result<SeedReport, SeedError> {
    let providers = seed_table("utility_providers", &paths.utilities, |p: NewUtilityProvider| async move {
        store.upsert_provider(&p).await
    })
    .await?;

    let cities = seed_table("cities", &paths.cities, |c: NewCity| async move {
        store.upsert_city(&c).await
    })
    .await?;

    let volunteers = seed_table("volunteers", &paths.volunteers, |mut v: NewVolunteer| {
        v.initials = v.initials.trim().to_uppercase();
        async move { store.upsert_volunteer(&v).await }
    })
    .await?;

    Ok(SeedReport {
        providers,
        cities,
        volunteers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_rosters(dir: &std::path::Path) -> ReferencePaths {
        let paths = ReferencePaths {
            cities: dir.join("cities.csv"),
            utilities: dir.join("utilities.csv"),
            volunteers: dir.join("volunteers.csv"),
        };
        fs::write(
            &paths.utilities,
            "company_name,mailing_address,phone_number,region\nBangor Gas,498 Maine Ave,207-555-0100,Central\n",
        )
        .unwrap();
        fs::write(
            &paths.cities,
            "city,county,state,utility_provider\nBangor,Penobscot,,Bangor Gas\nOrono,Penobscot,MAINE,Nowhere Gas\n",
        )
        .unwrap();
        fs::write(
            &paths.volunteers,
            "first_name,last_name,city,initials\nJane,Doe,Bangor,jd\nSam,Roe,Orono,SR\n",
        )
        .unwrap();
        paths
    }

    #[tokio::test]
    async fn seeds_in_dependency_order_and_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_rosters(dir.path());
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();

        let report = load_reference_data(&store, &paths).await.unwrap();

        assert_eq!(report.providers, TableSeedCount { upserted: 1, failed: 0 });
        // Orono names an unknown provider, so its volunteer has no city either.
        assert_eq!(report.cities, TableSeedCount { upserted: 1, failed: 1 });
        assert_eq!(report.volunteers, TableSeedCount { upserted: 1, failed: 1 });

        let cities = store.cities().await.unwrap();
        assert_eq!(cities[0].state, "MAINE");
        assert_eq!(store.volunteers().await.unwrap()[0].initials, "JD");
    }

    #[tokio::test]
    async fn reseeding_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_rosters(dir.path());
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();

        load_reference_data(&store, &paths).await.unwrap();
        load_reference_data(&store, &paths).await.unwrap();

        assert_eq!(store.providers().await.unwrap().len(), 1);
        assert_eq!(store.cities().await.unwrap().len(), 1);
        assert_eq!(store.volunteers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_roster_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_rosters(dir.path());
        paths.cities = dir.path().join("nope.csv");
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();

        let err = load_reference_data(&store, &paths).await.unwrap_err();
        assert!(matches!(err, SeedError::Csv(_)));
    }
}
