use crate::{Clock, MonetaryAmount};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedAmount {
    pub amount: MonetaryAmount,
    pub epoch_millis: i64,
}

impl DatedAmount {
    pub fn new(amount: MonetaryAmount, epoch_millis: i64) -> Self {
        Self {
            amount,
            epoch_millis,
        }
    }
}

/// Server view of the balance: the amount as of the last settling event
/// (start of day, save, withdrawal, boost award) and where interest takes it
/// by the end of the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub reference: DatedAmount,
    pub end_of_today: Option<DatedAmount>,
    pub subsequent_days: Vec<DatedAmount>,
}

/// End of day projection usable against a reference, in the reference unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub amount: i64,
    pub epoch_millis: i64,
}

impl BalanceSnapshot {
    pub fn new(reference: DatedAmount) -> Self {
        Self {
            reference,
            end_of_today: None,
            subsequent_days: Vec::new(),
        }
    }

    pub fn with_end_of_today(mut self, projection: DatedAmount) -> Self {
        self.end_of_today = Some(projection);
        self
    }

    pub fn with_subsequent_days(mut self, projections: Vec<DatedAmount>) -> Self {
        self.subsequent_days = projections;
        self
    }

    pub fn reference_amount(&self) -> i64 {
        self.reference.amount.amount
    }

    /// True when both snapshots describe different projections, ignoring the reference.
    pub fn projection_differs(&self, other: &Self) -> bool {
        self.end_of_today != other.end_of_today || self.subsequent_days != other.subsequent_days
    }

    /// The projection for the calendar day containing `now`.
    ///
    /// Projections in another currency, not convertible to the reference unit,
    /// or not later than the reference are treated as missing. A projection
    /// below the reference is raised to it, the balance only declines through
    /// a new reference.
    pub fn projection<C: Clock>(&self, now: i64, clock: &C) -> Option<Projection> {
        let today = self
            .end_of_today
            .iter()
            .chain(self.subsequent_days.iter())
            // an end of day stamp may sit exactly on the following midnight
            .find(|projection| clock.is_same_day(projection.epoch_millis - 1, now))?;

        let reference = &self.reference;
        if today.amount.currency != reference.amount.currency {
            debug!(
                projected = %today.amount,
                reference = %reference.amount,
                "ignoring projection in another currency"
            );
            return None;
        }
        if today.epoch_millis <= reference.epoch_millis {
            debug!(
                projected_at = today.epoch_millis,
                reference_at = reference.epoch_millis,
                "ignoring projection that does not follow the reference"
            );
            return None;
        }
        let amount = match today.amount.convert_to(reference.amount.unit) {
            Ok(amount) => amount.amount,
            Err(err) => {
                debug!(%err, "ignoring unconvertible projection");
                return None;
            }
        };

        Some(Projection {
            amount: amount.max(self.reference_amount()),
            epoch_millis: today.epoch_millis,
        })
    }

    /// Reference linearly advanced toward today's projection, rounded to whole
    /// subunits. Without a projection this is the reference itself.
    pub fn projected_at<C: Clock>(&self, now: i64, clock: &C) -> i64 {
        let reference = self.reference_amount();
        let Some(projection) = self.projection(now, clock) else {
            return reference;
        };

        let span = (projection.epoch_millis - self.reference.epoch_millis) as f64;
        let elapsed = (now - self.reference.epoch_millis) as f64;
        let ratio = (elapsed / span).clamp(0.0, 1.0);
        let gained = ratio * (projection.amount - reference) as f64;

        reference + gained.round() as i64
    }

    /// Where the slow animation heads: `max(projection, reference, 0)`, or
    /// `None` without a usable projection for today.
    pub fn drift_target<C: Clock>(&self, now: i64, clock: &C) -> Option<i64> {
        self.projection(now, clock)
            .map(|projection| projection.amount.max(self.reference_amount()).max(0))
    }
}
