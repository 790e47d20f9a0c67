use crate::types::{PaymentRecord, PaymentSummary, Summary, TimeWindow};
use crate::{PaymentStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, PaymentRecord>,
    // Time-ordered index for windowed scans. The id breaks ties between
    // payments accepted in the same instant.
    by_time: BTreeSet<(DateTime<Utc>, Uuid)>,
    totals: PaymentSummary,
}

/// In-memory aggregate store.
///
/// Records, time index and running totals share one lock, so a writer updates
/// all three in a single critical section and readers see either the state
/// before or after a write, never a mix.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, record: PaymentRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        // Work on a copy of the totals; nothing is committed until all the
        // arithmetic has succeeded.
        let mut totals = inner.totals;

        if let Some(previous) = inner.records.get(&record.correlation_id) {
            let slot = totals.route_mut(previous.route);
            *slot = slot.try_sub(Summary::new(1, previous.amount))?;
        }

        let slot = totals.route_mut(record.route);
        *slot = slot.try_add_payment(record.amount)?;

        let key = (record.submitted_at, record.correlation_id);
        if let Some(previous) = inner.records.insert(record.correlation_id, record) {
            tracing::debug!(
                correlation_id = %previous.correlation_id,
                "Replacing previously recorded payment"
            );
            inner
                .by_time
                .remove(&(previous.submitted_at, previous.correlation_id));
        }
        inner.by_time.insert(key);
        inner.totals = totals;

        Ok(())
    }

    fn scan(&self, window: TimeWindow) -> Result<PaymentSummary, StoreError> {
        if window.is_empty() {
            return Ok(PaymentSummary::default());
        }

        let lower = match window.from {
            Some(from) => Bound::Included((from, Uuid::nil())),
            None => Bound::Unbounded,
        };
        let upper = match window.to {
            Some(to) => Bound::Included((to, Uuid::max())),
            None => Bound::Unbounded,
        };

        let inner = self.inner.read();
        let mut summary = PaymentSummary::default();

        for (_, correlation_id) in inner.by_time.range((lower, upper)) {
            let record = inner.records.get(correlation_id).ok_or_else(|| {
                StoreError::Inconsistent(format!("index entry without record: {correlation_id}"))
            })?;

            let slot = summary.route_mut(record.route);
            *slot = slot.try_add_payment(record.amount)?;
        }

        Ok(summary)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn record(&self, record: PaymentRecord) -> Result<(), StoreError> {
        self.insert(record)
    }

    async fn summary(&self, window: TimeWindow) -> Result<PaymentSummary, StoreError> {
        if window.is_unbounded() {
            return Ok(self.inner.read().totals);
        }
        self.scan(window)
    }

    async fn get(&self, correlation_id: Uuid) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.inner.read().records.get(&correlation_id).cloned())
    }

    async fn purge(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let purged = inner.records.len();
        *inner = Inner::default();
        tracing::info!(purged, "Purged payment store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Route;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap()
    }

    fn payment(cents: i64, offset_secs: i64, route: Route) -> PaymentRecord {
        PaymentRecord {
            correlation_id: Uuid::new_v4(),
            amount: Decimal::new(cents, 2),
            submitted_at: base_time() + Duration::seconds(offset_secs),
            route,
        }
    }

    async fn populated_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let payments = [
            payment(1990, 0, Route::Primary),
            payment(1, 5, Route::Secondary),
            payment(10, 10, Route::Primary),
            payment(20, 10, Route::Primary),
            payment(999_99, 30, Route::Secondary),
            payment(33, 60, Route::Primary),
        ];
        for p in payments {
            store.record(p).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_mixed_route_scenario() {
        let store = InMemoryStore::new();
        store.record(payment(1000, 0, Route::Primary)).await.unwrap();
        store.record(payment(2000, 1, Route::Primary)).await.unwrap();
        store.record(payment(500, 2, Route::Secondary)).await.unwrap();

        let summary = store.summary(TimeWindow::UNBOUNDED).await.unwrap();
        assert_eq!(summary.primary, Summary::new(2, Decimal::new(3000, 2)));
        assert_eq!(summary.fallback, Summary::new(1, Decimal::new(500, 2)));
    }

    #[tokio::test]
    async fn test_unbounded_matches_full_scan() {
        let store = populated_store().await;

        let fast = store.summary(TimeWindow::UNBOUNDED).await.unwrap();
        let scanned = store
            .summary(TimeWindow::between(
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            ))
            .await
            .unwrap();

        assert_eq!(fast, scanned);
        assert_eq!(fast.primary.count, 4);
        assert_eq!(fast.fallback.total_amount, Decimal::new(100_000, 2));
    }

    #[tokio::test]
    async fn test_adjacent_windows_add_up() {
        let store = populated_store().await;
        let a = base_time();
        let b = base_time() + Duration::seconds(10);
        let c = base_time() + Duration::seconds(60);

        let whole = store.summary(TimeWindow::between(a, c)).await.unwrap();
        // Bounds are inclusive, so the left part stops just short of `b`
        let left = store
            .summary(TimeWindow::between(a, b - Duration::nanoseconds(1)))
            .await
            .unwrap();
        let right = store.summary(TimeWindow::between(b, c)).await.unwrap();

        assert_eq!(left.try_merge(&right).unwrap(), whole);
        assert_eq!(left.primary.count, 1);
        assert_eq!(right.primary.count, 3);
    }

    #[tokio::test]
    async fn test_window_bounds() {
        let store = populated_store().await;
        let at_ten = base_time() + Duration::seconds(10);

        let exact = store
            .summary(TimeWindow::between(at_ten, at_ten))
            .await
            .unwrap();
        assert_eq!(exact.primary, Summary::new(2, Decimal::new(30, 2)));
        assert_eq!(exact.fallback, Summary::default());

        let open_end = store
            .summary(TimeWindow::new(Some(base_time() + Duration::seconds(30)), None))
            .await
            .unwrap();
        assert_eq!(open_end.primary.count, 1);
        assert_eq!(open_end.fallback.count, 1);

        let inverted = store
            .summary(TimeWindow::between(at_ten, base_time()))
            .await
            .unwrap();
        assert_eq!(inverted, PaymentSummary::default());
    }

    #[tokio::test]
    async fn test_resubmitted_id_keeps_single_record() {
        let store = InMemoryStore::new();
        let first = payment(1000, 0, Route::Primary);
        let mut retry = first.clone();
        retry.route = Route::Secondary;
        retry.submitted_at = base_time() + Duration::seconds(3);

        store.record(first.clone()).await.unwrap();
        store.record(retry.clone()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(first.correlation_id).await.unwrap(), Some(retry));

        let summary = store.summary(TimeWindow::UNBOUNDED).await.unwrap();
        assert_eq!(summary.primary, Summary::default());
        assert_eq!(summary.fallback, Summary::new(1, Decimal::new(1000, 2)));

        // The old timestamp must no longer be indexed
        let at_first = store
            .summary(TimeWindow::between(base_time(), base_time()))
            .await
            .unwrap();
        assert_eq!(at_first, PaymentSummary::default());
    }

    #[tokio::test]
    async fn test_overflow_leaves_totals_untouched() {
        let store = InMemoryStore::new();
        let mut big = payment(0, 0, Route::Primary);
        big.amount = Decimal::MAX;
        store.record(big).await.unwrap();

        let mut too_much = payment(0, 1, Route::Primary);
        too_much.amount = Decimal::MAX;
        assert_eq!(
            store.record(too_much.clone()).await,
            Err(StoreError::Overflow)
        );

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(too_much.correlation_id).await.unwrap(), None);
        let summary = store.summary(TimeWindow::UNBOUNDED).await.unwrap();
        assert_eq!(summary.primary, Summary::new(1, Decimal::MAX));
    }

    #[tokio::test]
    async fn test_rounding_sum_is_refused() {
        let store = InMemoryStore::new();
        let mut big = payment(0, 0, Route::Primary);
        big.amount = Decimal::from_str_exact("10000000000000000000000000000").unwrap();
        store.record(big.clone()).await.unwrap();

        let cent = payment(1, 1, Route::Primary);
        assert!(matches!(
            store.record(cent.clone()).await,
            Err(StoreError::PrecisionLoss(_))
        ));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(cent.correlation_id).await.unwrap(), None);
        let fast = store.summary(TimeWindow::UNBOUNDED).await.unwrap();
        assert_eq!(fast.primary, Summary::new(1, big.amount));

        // Totals still agree with a full scan
        let scanned = store
            .summary(TimeWindow::between(
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            ))
            .await
            .unwrap();
        assert_eq!(fast, scanned);
    }

    #[tokio::test]
    async fn test_purge() {
        let store = populated_store().await;
        let ids: Vec<Uuid> = store.inner.read().records.keys().copied().collect();

        store.purge().await.unwrap();

        assert_eq!(
            store.summary(TimeWindow::UNBOUNDED).await.unwrap(),
            PaymentSummary::default()
        );
        for id in ids {
            assert_eq!(store.get(id).await.unwrap(), None);
        }
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();

        for task in 0..8i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250i64 {
                    let route = if i % 3 == 0 {
                        Route::Secondary
                    } else {
                        Route::Primary
                    };
                    store
                        .record(payment(101 + task, i, route))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let fast = store.summary(TimeWindow::UNBOUNDED).await.unwrap();
        let scanned = store
            .summary(TimeWindow::between(
                DateTime::<Utc>::MIN_UTC,
                DateTime::<Utc>::MAX_UTC,
            ))
            .await
            .unwrap();

        assert_eq!(fast, scanned);
        assert_eq!(fast.primary.count + fast.fallback.count, 2000);
        // sum over tasks of 250 * (1.01 + task/100)
        let expected: Decimal = (0..8i64).map(|t| Decimal::new(250 * (101 + t), 2)).sum();
        assert_eq!(
            fast.primary.total_amount + fast.fallback.total_amount,
            expected
        );
    }
}
