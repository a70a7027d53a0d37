use std::{sync::Arc, time::SystemTime};

use leak_client::{domain::Photo, InsertOutcome, Store, StoreError};

use crate::{
    photos::{PhotoFetchError, PhotoFetcher},
    pipeline::{Envelope, PipelineError, Sink},
    transform::CandidateMeasurement,
};

#[derive(thiserror::Error, Debug)]
pub enum LoadFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Photo(#[from] PhotoFetchError),
}

#[derive(Debug)]
pub struct FailedRecord {
    pub row_number: usize,
    pub timestamp: time::PrimitiveDateTime,
    pub error: LoadFailure,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub failed: Vec<FailedRecord>,
}

/// Loads candidates one record at a time: skip if the timestamp is stored,
/// otherwise fetch the photo and commit photo and measurement together.
pub struct StoreSink {
    store: Store,
    photos: Arc<dyn PhotoFetcher>,
}

impl StoreSink {
    pub fn new(store: Store, photos: Arc<dyn PhotoFetcher>) -> Self {
        Self { store, photos }
    }

    async fn load_one(&self, candidate: &CandidateMeasurement) -> Result<InsertOutcome, LoadFailure> {
        let m = &candidate.measurement;

        // Cheap pre-check so duplicates never trigger a photo download. The
        // authoritative check runs again inside the insert's critical section.
        if self.store.measurement_exists(m.timestamp).await? {
            return Ok(InsertOutcome::Duplicate);
        }

        let photo = match (&candidate.photo_url, &m.photo_id) {
            (Some(url), Some(photo_id)) => self.photos.fetch(url).await?.map(|bytes| Photo {
                photo_id: photo_id.clone(),
                photo: bytes,
            }),
            _ => None,
        };

        let mut measurement = m.clone();
        if photo.is_none() {
            measurement.photo_id = None;
        }

        Ok(self
            .store
            .insert_measurement_if_absent(&measurement, photo.as_ref())
            .await?)
    }
}

#[async_trait::async_trait]
impl Sink for StoreSink {
    async fn load(
        &self,
        records: Vec<Envelope<CandidateMeasurement>>,
    ) -> Result<LoadReport, PipelineError> {
        let mut report = LoadReport::default();

        for env in records {
            match self.load_one(&env.payload).await {
                Ok(InsertOutcome::Inserted { measurement_id }) => {
                    report.inserted += 1;
                    metrics::counter!("measurements_inserted_total").increment(1);
                    if let Ok(dur) = SystemTime::now().duration_since(env.received_at) {
                        metrics::histogram!("load_latency_seconds").record(dur.as_secs_f64());
                    }
                    tracing::debug!(row = env.row_number, measurement_id, "inserted measurement");
                }
                Ok(InsertOutcome::Duplicate) => {
                    report.skipped_duplicate += 1;
                    metrics::counter!("measurements_skipped_duplicate_total").increment(1);
                    tracing::debug!(row = env.row_number, "measurement already stored, skipping");
                }
                // Anything but a constraint failure means the store itself is unusable.
                Err(LoadFailure::Store(e)) if !e.is_integrity_violation() => {
                    tracing::error!(error = %e, row = env.row_number, "store failed during load, giving up");
                    return Err(PipelineError::Store(e));
                }
                Err(error) => {
                    metrics::counter!("measurements_failed_total").increment(1);
                    tracing::warn!(error = %error, row = env.row_number, "failed to load measurement");
                    report.failed.push(FailedRecord {
                        row_number: env.row_number,
                        timestamp: env.payload.measurement.timestamp,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            inserted = report.inserted,
            skipped = report.skipped_duplicate,
            failed = report.failed.len(),
            "load finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photos::NoPhotoFetcher;
    use leak_client::domain::{NewCity, NewMeasurement};
    use time::macros::datetime;

    struct FixedPhoto(Vec<u8>);

    #[async_trait::async_trait]
    impl PhotoFetcher for FixedPhoto {
        async fn fetch(&self, _link: &str) -> Result<Option<Vec<u8>>, PhotoFetchError> {
            Ok(Some(self.0.clone()))
        }
    }

    struct BrokenPhoto;

    #[async_trait::async_trait]
    impl PhotoFetcher for BrokenPhoto {
        async fn fetch(&self, link: &str) -> Result<Option<Vec<u8>>, PhotoFetchError> {
            Err(PhotoFetchError::InvalidLink(link.to_string()))
        }
    }

    async fn store() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.create_schema().await.unwrap();
        store
            .upsert_city(&NewCity {
                city: "Bangor".to_string(),
                county: None,
                state: None,
                utility_provider: None,
            })
            .await
            .unwrap();
        store
    }

    fn candidate(
        row_number: usize,
        city: &str,
        ts: time::PrimitiveDateTime,
        photo: Option<&str>,
    ) -> Envelope<CandidateMeasurement> {
        Envelope {
            payload: CandidateMeasurement {
                measurement: NewMeasurement {
                    city: city.to_string(),
                    methane_level: 5.2,
                    leak: true,
                    infrastructure_type: None,
                    photo_id: photo.map(|_| format!("photo-{row_number}")),
                    latitude: 44.8,
                    longitude: -68.77,
                    volunteer: "JD".to_string(),
                    timestamp: ts,
                },
                photo_url: photo.map(str::to_string),
            },
            row_number,
            received_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn second_load_of_same_records_inserts_nothing() {
        let store = store().await;
        let sink = StoreSink::new(store.clone(), Arc::new(NoPhotoFetcher));
        let batch = || {
            vec![
                candidate(1, "Bangor", datetime!(2024-07-01 10:00:00), None),
                candidate(2, "Bangor", datetime!(2024-07-01 10:05:00), None),
            ]
        };

        let first = sink.load(batch()).await.unwrap();
        assert_eq!((first.inserted, first.skipped_duplicate), (2, 0));

        let second = sink.load(batch()).await.unwrap();
        assert_eq!((second.inserted, second.skipped_duplicate), (0, 2));
        assert_eq!(store.measurement_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn integrity_failure_is_recorded_and_the_batch_continues() {
        let store = store().await;
        let sink = StoreSink::new(store.clone(), Arc::new(NoPhotoFetcher));

        let report = sink
            .load(vec![
                candidate(1, "Gotham", datetime!(2024-07-01 10:00:00), None),
                candidate(2, "Bangor", datetime!(2024-07-01 10:05:00), None),
            ])
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].row_number, 1);
        assert!(matches!(
            &report.failed[0].error,
            LoadFailure::Store(e) if e.is_integrity_violation()
        ));
    }

    #[tokio::test]
    async fn photo_is_stored_with_its_measurement() {
        let store = store().await;
        let sink = StoreSink::new(store.clone(), Arc::new(FixedPhoto(vec![0xFF, 0xD8, 0xFF])));

        let report = sink
            .load(vec![candidate(1, "Bangor", datetime!(2024-07-01 10:00:00), Some("https://example.org/p.jpg"))])
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);

        let stored = store.measurements_for_city("Bangor").await.unwrap();
        assert_eq!(stored[0].photo_id.as_deref(), Some("photo-1"));
        let photo = store.photo("photo-1").await.unwrap().unwrap();
        assert_eq!(photo.photo, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn disabled_photos_drop_the_photo_reference() {
        let store = store().await;
        let sink = StoreSink::new(store.clone(), Arc::new(NoPhotoFetcher));

        sink.load(vec![candidate(1, "Bangor", datetime!(2024-07-01 10:00:00), Some("https://example.org/p.jpg"))])
            .await
            .unwrap();

        let stored = store.measurements_for_city("Bangor").await.unwrap();
        assert_eq!(stored[0].photo_id, None);
    }

    #[tokio::test]
    async fn photo_fetch_failure_leaves_no_measurement() {
        let store = store().await;
        let sink = StoreSink::new(store.clone(), Arc::new(BrokenPhoto));

        let report = sink
            .load(vec![candidate(1, "Bangor", datetime!(2024-07-01 10:00:00), Some("https://example.org/p.jpg"))])
            .await
            .unwrap();

        assert_eq!(report.inserted, 0);
        assert!(matches!(report.failed[0].error, LoadFailure::Photo(_)));
        assert_eq!(store.measurement_count().await.unwrap(), 0);
    }
}
