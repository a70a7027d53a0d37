use sqlx::SqliteConnection;

use super::{key_exists, Store};
use crate::{
    domain::{timestamp, Measurement, NewMeasurement, Photo},
    error::{classify, IntegrityKind, StoreError},
};

/// Result of an insert that is skipped when the timestamp is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { measurement_id: i64 },
    Duplicate,
}

#[derive(sqlx::FromRow)]
struct MeasurementRow {
    measurement_id: i64,
    city: String,
    methane_level: f64,
    leak: bool,
    infrastructure_type: Option<String>,
    photo_id: Option<String>,
    latitude: f64,
    longitude: f64,
    volunteer: String,
    timestamp: String,
}

impl TryFrom<MeasurementRow> for Measurement {
    type Error = StoreError;

    fn try_from(row: MeasurementRow) -> Result<Self, Self::Error> {
        let ts = timestamp::from_storage(&row.timestamp).map_err(|e| StoreError::Corrupt {
            table: "measurements",
            column: "timestamp",
            detail: format!("'{}': {e}", row.timestamp),
        })?;
        Ok(Measurement {
            measurement_id: row.measurement_id,
            city: row.city,
            methane_level: row.methane_level,
            leak: row.leak,
            infrastructure_type: row.infrastructure_type,
            photo_id: row.photo_id,
            latitude: row.latitude,
            longitude: row.longitude,
            volunteer: row.volunteer,
            timestamp: ts,
        })
    }
}

const MEASUREMENT_COLUMNS: &str = r#"
    measurement_id,
    city,
    methane_level,
    leak,
    infrastructure_type,
    photo_id,
    latitude,
    longitude,
    volunteer,
    timestamp
"#;

async fn insert_photo_in(conn: &mut SqliteConnection, photo: &Photo) -> Result<(), StoreError> {
    if key_exists(conn, "SELECT 1 FROM photos WHERE photo_id = ?", &photo.photo_id).await? {
        return Err(StoreError::integrity(
            "photos",
            IntegrityKind::Unique,
            format!("photo '{}' already exists", photo.photo_id),
        ));
    }
    sqlx::query("INSERT INTO photos (photo_id, photo) VALUES (?, ?)")
        .bind(&photo.photo_id)
        .bind(&photo.photo)
        .execute(&mut *conn)
        .await
        .map_err(classify("photos"))?;
    Ok(())
}

async fn insert_measurement_in(
    conn: &mut SqliteConnection,
    m: &NewMeasurement,
) -> Result<i64, StoreError> {
    if !key_exists(conn, "SELECT 1 FROM cities WHERE city = ?", &m.city).await? {
        return Err(StoreError::integrity(
            "measurements",
            IntegrityKind::ForeignKey,
            format!("city '{}' does not exist", m.city),
        ));
    }
    if let Some(photo_id) = &m.photo_id {
        if !key_exists(conn, "SELECT 1 FROM photos WHERE photo_id = ?", photo_id).await? {
            return Err(StoreError::integrity(
                "measurements",
                IntegrityKind::ForeignKey,
                format!("photo '{photo_id}' does not exist"),
            ));
        }
    }

    let ts = timestamp::to_storage(m.timestamp);
    if key_exists(conn, "SELECT 1 FROM measurements WHERE timestamp = ?", &ts).await? {
        return Err(StoreError::integrity(
            "measurements",
            IntegrityKind::Unique,
            format!("a measurement at {ts} already exists"),
        ));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO measurements (
            city, methane_level, leak, infrastructure_type, photo_id,
            latitude, longitude, volunteer, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&m.city)
    .bind(m.methane_level)
    .bind(m.leak)
    .bind(&m.infrastructure_type)
    .bind(&m.photo_id)
    .bind(m.latitude)
    .bind(m.longitude)
    .bind(&m.volunteer)
    .bind(&ts)
    .execute(&mut *conn)
    .await
    .map_err(classify("measurements"))?;

    Ok(result.last_insert_rowid())
}

impl Store {
    pub async fn insert_photo(&self, photo: &Photo) -> Result<(), StoreError> {
        let _guard = self.write_guard().await;
        let mut conn = self.pool.acquire().await?;
        insert_photo_in(&mut *conn, photo).await
    }

    /// Insert a measurement whose photo (if any) is already stored.
    pub async fn insert_measurement(&self, m: &NewMeasurement) -> Result<i64, StoreError> {
        self.insert_measurement_with_photo(m, None).await
    }

    /// Insert `photo` and `m` in one transaction: either both rows are
    /// committed or neither is.
    pub async fn insert_measurement_with_photo(
        &self,
        m: &NewMeasurement,
        photo: Option<&Photo>,
    ) -> Result<i64, StoreError> {
        let _guard = self.write_guard().await;
        let mut tx = self.pool.begin().await?;
        if let Some(photo) = photo {
            insert_photo_in(&mut *tx, photo).await?;
        }
        let id = insert_measurement_in(&mut *tx, m).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Like [`Store::insert_measurement_with_photo`], but a measurement whose
    /// timestamp is already stored is reported as a duplicate instead of an
    /// error. The existence check and the insert share one critical section.
    pub async fn insert_measurement_if_absent(
        &self,
        m: &NewMeasurement,
        photo: Option<&Photo>,
    ) -> Result<InsertOutcome, StoreError> {
        let _guard = self.write_guard().await;
        let mut tx = self.pool.begin().await?;

        let ts = timestamp::to_storage(m.timestamp);
        if key_exists(&mut *tx, "SELECT 1 FROM measurements WHERE timestamp = ?", &ts).await? {
            return Ok(InsertOutcome::Duplicate);
        }

        if let Some(photo) = photo {
            insert_photo_in(&mut *tx, photo).await?;
        }
        let measurement_id = insert_measurement_in(&mut *tx, m).await?;
        tx.commit().await?;
        Ok(InsertOutcome::Inserted { measurement_id })
    }

    pub async fn measurement_exists(&self, ts: time::PrimitiveDateTime) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let sql = "SELECT 1 FROM measurements WHERE timestamp = ?";
        key_exists(&mut *conn, sql, &timestamp::to_storage(ts)).await
    }

    pub async fn measurement_count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurements")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All measurements for one city in timestamp order.
    pub async fn measurements_for_city(&self, city: &str) -> Result<Vec<Measurement>, StoreError> {
        let sql = format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE city = ? ORDER BY timestamp, measurement_id"
        );
        let rows = sqlx::query_as::<_, MeasurementRow>(&sql)
            .bind(city)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Measurement::try_from).collect()
    }

    /// Distinct city names that have at least one measurement.
    pub async fn measurement_cities(&self) -> Result<Vec<String>, StoreError> {
        let cities: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT city FROM measurements ORDER BY city")
                .fetch_all(&self.pool)
                .await?;
        Ok(cities)
    }

    pub async fn photo(&self, photo_id: &str) -> Result<Option<Photo>, StoreError> {
        let photo = sqlx::query_as::<_, Photo>("SELECT photo_id, photo FROM photos WHERE photo_id = ?")
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(photo)
    }
}
