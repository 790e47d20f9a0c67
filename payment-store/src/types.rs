use crate::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The upstream processor that accepted a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    #[serde(rename = "default")]
    Primary,
    #[serde(rename = "fallback")]
    Secondary,
}

impl Route {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Route::Primary => "primary",
            Route::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRecord {
    pub correlation_id: Uuid,
    pub amount: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub route: Route,
}

/// Count and total amount of the payments handled by one route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "totalRequests")]
    pub count: u64,
    #[serde(
        rename = "totalAmount",
        with = "rust_decimal::serde::arbitrary_precision"
    )]
    pub total_amount: Decimal,
}

impl Summary {
    pub fn new(count: u64, total_amount: Decimal) -> Self {
        Self {
            count,
            total_amount,
        }
    }

    pub fn try_add(self, other: Summary) -> Result<Summary, StoreError> {
        Ok(Summary {
            count: self.count.checked_add(other.count).ok_or(StoreError::Overflow)?,
            total_amount: exact_add(self.total_amount, other.total_amount)?,
        })
    }

    pub fn try_sub(self, other: Summary) -> Result<Summary, StoreError> {
        let count = self.count.checked_sub(other.count).ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "cannot remove {} payments from a total of {}",
                other.count, self.count
            ))
        })?;

        Ok(Summary {
            count,
            total_amount: exact_add(self.total_amount, -other.total_amount)?,
        })
    }

    /// Adds a single payment of `amount`.
    pub fn try_add_payment(self, amount: Decimal) -> Result<Summary, StoreError> {
        self.try_add(Summary::new(1, amount))
    }
}

/// Adds two amounts, failing instead of rounding.
///
/// `Decimal` keeps 28-29 significant digits and silently rounds sums that need
/// more. An exact sum keeps the larger of the two scales; a smaller scale means
/// digits were dropped, which is only acceptable when they were all zero.
pub(crate) fn exact_add(a: Decimal, b: Decimal) -> Result<Decimal, StoreError> {
    let sum = a.checked_add(b).ok_or(StoreError::Overflow)?;

    if sum.scale() >= a.scale().max(b.scale()) {
        return Ok(sum);
    }

    let reverses = sum.checked_sub(a) == Some(b) && sum.checked_sub(b) == Some(a);
    if reverses {
        Ok(sum)
    } else {
        Err(StoreError::PrecisionLoss(format!("{a} + {b}")))
    }
}

/// Per-route summaries. Both routes are always present, zero when empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    #[serde(rename = "default")]
    pub primary: Summary,
    pub fallback: Summary,
}

impl PaymentSummary {
    pub fn route_mut(&mut self, route: Route) -> &mut Summary {
        match route {
            Route::Primary => &mut self.primary,
            Route::Secondary => &mut self.fallback,
        }
    }

    /// Field-wise sum of two summaries.
    pub fn try_merge(&self, other: &PaymentSummary) -> Result<PaymentSummary, StoreError> {
        Ok(PaymentSummary {
            primary: self.primary.try_add(other.primary)?,
            fallback: self.fallback.try_add(other.fallback)?,
        })
    }
}

/// Inclusive time range over `submitted_at`. A missing bound is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub const UNBOUNDED: TimeWindow = TimeWindow {
        from: None,
        to: None,
    };

    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// True when the bounds are inverted and nothing can match.
    pub fn is_empty(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_json_shape() {
        let summary = PaymentSummary {
            primary: Summary::new(2, Decimal::new(3000, 2)),
            fallback: Summary::new(1, Decimal::new(500, 2)),
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert_eq!(
            json,
            r#"{"default":{"totalRequests":2,"totalAmount":30.00},"fallback":{"totalRequests":1,"totalAmount":5.00}}"#
        );
    }

    #[test]
    fn test_summary_parse_keeps_exact_amount() {
        let json = r#"{"default":{"totalRequests":3,"totalAmount":0.30},"fallback":{"totalRequests":0,"totalAmount":0}}"#;
        let summary: PaymentSummary = serde_json::from_str(json).unwrap();

        // 0.1 + 0.2 style values must not pick up binary floating point noise
        assert_eq!(summary.primary.total_amount, Decimal::new(30, 2));
        assert_eq!(summary.fallback, Summary::default());
    }

    #[test]
    fn test_try_merge() {
        let a = PaymentSummary {
            primary: Summary::new(1, Decimal::new(1000, 2)),
            fallback: Summary::new(2, Decimal::new(1, 2)),
        };
        let b = PaymentSummary {
            primary: Summary::new(4, Decimal::new(5, 1)),
            fallback: Summary::default(),
        };

        let merged = a.try_merge(&b).unwrap();
        assert_eq!(merged.primary, Summary::new(5, Decimal::new(1050, 2)));
        assert_eq!(merged.fallback, Summary::new(2, Decimal::new(1, 2)));
        assert_eq!(merged, b.try_merge(&a).unwrap());

        let huge = PaymentSummary {
            primary: Summary::new(1, Decimal::MAX),
            fallback: Summary::default(),
        };
        assert_eq!(huge.try_merge(&huge), Err(StoreError::Overflow));
    }

    #[test]
    fn test_exact_add_refuses_rounding() {
        let big = Decimal::from_str_exact("10000000000000000000000000000").unwrap();
        let cent = Decimal::new(1, 2);

        assert!(matches!(
            exact_add(big, cent),
            Err(StoreError::PrecisionLoss(_))
        ));
        assert!(matches!(
            Summary::new(1, big).try_add_payment(cent),
            Err(StoreError::PrecisionLoss(_))
        ));

        assert_eq!(
            exact_add(big, Decimal::ONE).unwrap(),
            Decimal::from_str_exact("10000000000000000000000000001").unwrap()
        );

        assert_eq!(
            exact_add(Decimal::new(10, 2), Decimal::new(20, 2)).unwrap(),
            Decimal::new(30, 2)
        );
    }

    #[test]
    fn test_try_sub_underflow_is_inconsistent() {
        let one = Summary::new(1, Decimal::ONE);
        assert_eq!(one.try_sub(one).unwrap(), Summary::new(0, Decimal::ZERO));
        assert!(matches!(
            Summary::default().try_sub(one),
            Err(StoreError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_window_shape() {
        let from = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 7, 1, 13, 0, 0).unwrap();
        let window = TimeWindow::between(from, to);

        assert!(!window.is_unbounded());
        assert!(!window.is_empty());
        assert!(TimeWindow::between(to, from).is_empty());
        assert!(!TimeWindow::between(from, from).is_empty());
        assert!(!TimeWindow::new(None, Some(to)).is_unbounded());
        assert!(TimeWindow::new(None, None).is_unbounded());
    }
}
