use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use super::enums::{
    payment_stages::PaymentStage, proposal_statuses::ProposalStatus,
    stage_statuses::StageStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("proposal total cannot be negative: {0}")]
    NegativeTotal(i64),
    #[error("proposal total is too large to split: {0}")]
    TotalTooLarge(i64),
    #[error("stage amounts sum to {actual} but the proposal total is {expected}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("{stage} stage cannot be paid before the {pending} stage")]
    OutOfOrder {
        stage: PaymentStage,
        pending: PaymentStage,
    },
    #[error("{0} stage is already paid")]
    AlreadyPaid(PaymentStage),
}

/// Per-stage amounts in minor units, fixed when the proposal is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageAmounts {
    pub deposit_minor: i64,
    pub progress_minor: i64,
    pub final_minor: i64,
}

impl StageAmounts {
    /// Splits `total_minor` 50/30/20. The final stage absorbs the rounding
    /// remainder so the three amounts always add up to the total.
    pub fn split(total_minor: i64) -> Result<Self, LedgerError> {
        if total_minor < 0 {
            return Err(LedgerError::NegativeTotal(total_minor));
        }

        let share = |stage: PaymentStage| {
            total_minor
                .checked_mul(i64::from(stage.percentage()))
                .map(|scaled| scaled / 100)
                .ok_or(LedgerError::TotalTooLarge(total_minor))
        };
        let deposit_minor = share(PaymentStage::Deposit)?;
        let progress_minor = share(PaymentStage::Progress)?;

        Ok(Self {
            deposit_minor,
            progress_minor,
            final_minor: total_minor - deposit_minor - progress_minor,
        })
    }

    pub fn amount(&self, stage: PaymentStage) -> i64 {
        match stage {
            PaymentStage::Deposit => self.deposit_minor,
            PaymentStage::Progress => self.progress_minor,
            PaymentStage::Final => self.final_minor,
        }
    }

    /// Saturates, so corrupt stored amounts fail the total check instead of wrapping.
    pub fn total(&self) -> i64 {
        self.deposit_minor
            .saturating_add(self.progress_minor)
            .saturating_add(self.final_minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    pub stage: PaymentStage,
    pub percentage: u8,
    pub amount_minor: i64,
    pub due_date: Option<NaiveDate>,
    pub paid: bool,
}

/// Payment progress of one approved proposal.
///
/// Stages are paid strictly in order, so the set of paid timestamps is always
/// a prefix of [`PaymentStage::ALL`]. Every constructor enforces that, which is
/// what keeps [`PaymentLedger::stage_status`] from ever reporting a later stage
/// as active or completed behind a locked one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLedger {
    total_minor: i64,
    amounts: StageAmounts,
    paid_at: [Option<DateTime<Utc>>; 3],
}

impl PaymentLedger {
    pub fn materialize(total_minor: i64) -> Result<Self, LedgerError> {
        Ok(Self {
            total_minor,
            amounts: StageAmounts::split(total_minor)?,
            paid_at: [None; 3],
        })
    }

    pub fn from_parts(
        total_minor: i64,
        amounts: StageAmounts,
        deposit_paid_at: Option<DateTime<Utc>>,
        progress_paid_at: Option<DateTime<Utc>>,
        final_paid_at: Option<DateTime<Utc>>,
    ) -> Result<Self, LedgerError> {
        if total_minor < 0 {
            return Err(LedgerError::NegativeTotal(total_minor));
        }
        if amounts.total() != total_minor {
            return Err(LedgerError::AmountMismatch {
                expected: total_minor,
                actual: amounts.total(),
            });
        }

        let paid_at = [deposit_paid_at, progress_paid_at, final_paid_at];
        for stage in PaymentStage::ALL {
            if paid_at[stage.index()].is_none() {
                continue;
            }
            if let Some(pending) = PaymentStage::ALL[..stage.index()]
                .iter()
                .find(|earlier| paid_at[earlier.index()].is_none())
            {
                return Err(LedgerError::OutOfOrder {
                    stage,
                    pending: *pending,
                });
            }
        }

        Ok(Self {
            total_minor,
            amounts,
            paid_at,
        })
    }

    pub fn total_minor(&self) -> i64 {
        self.total_minor
    }

    pub fn amounts(&self) -> StageAmounts {
        self.amounts
    }

    pub fn paid_at(&self, stage: PaymentStage) -> Option<DateTime<Utc>> {
        self.paid_at[stage.index()]
    }

    pub fn is_paid(&self, stage: PaymentStage) -> bool {
        self.paid_at(stage).is_some()
    }

    pub fn has_payments(&self) -> bool {
        self.is_paid(PaymentStage::Deposit)
    }

    pub fn plan(&self, approved_on: NaiveDate) -> Vec<StagePlan> {
        PaymentStage::ALL
            .iter()
            .map(|stage| StagePlan {
                stage: *stage,
                percentage: stage.percentage(),
                amount_minor: self.amounts.amount(*stage),
                due_date: (*stage == PaymentStage::Deposit).then_some(approved_on),
                paid: self.is_paid(*stage),
            })
            .collect()
    }

    pub fn stage_status(&self, stage: PaymentStage) -> StageStatus {
        if self.is_paid(stage) {
            StageStatus::Completed
        } else if self.active_stage() == Some(stage) {
            StageStatus::Active
        } else {
            StageStatus::Locked
        }
    }

    /// Earliest unpaid stage; `None` once everything is paid.
    pub fn active_stage(&self) -> Option<PaymentStage> {
        PaymentStage::ALL
            .into_iter()
            .find(|stage| !self.is_paid(*stage))
    }

    pub fn is_fully_paid(&self) -> bool {
        self.active_stage().is_none()
    }

    pub fn total_paid_minor(&self) -> i64 {
        PaymentStage::ALL
            .iter()
            .filter(|stage| self.is_paid(**stage))
            .map(|stage| self.amounts.amount(*stage))
            .sum()
    }

    /// Cumulative amount once `stage` and everything before it is paid.
    pub fn total_paid_through(&self, stage: PaymentStage) -> i64 {
        PaymentStage::ALL[..=stage.index()]
            .iter()
            .map(|s| self.amounts.amount(*s))
            .sum()
    }

    pub fn paid_percentage(&self) -> f64 {
        if self.total_minor == 0 {
            return 0.0;
        }
        (self.total_paid_minor() as f64 / self.total_minor as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn derived_status(&self) -> ProposalStatus {
        PaymentStage::ALL
            .iter()
            .rev()
            .find(|stage| self.is_paid(**stage))
            .map(|stage| stage.paid_status())
            .unwrap_or(ProposalStatus::Approved)
    }

    pub fn record_payment(
        &self,
        stage: PaymentStage,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentLedger, LedgerError> {
        if self.is_paid(stage) {
            return Err(LedgerError::AlreadyPaid(stage));
        }
        if let Some(pending) = self.active_stage().filter(|active| *active != stage) {
            return Err(LedgerError::OutOfOrder { stage, pending });
        }

        let mut next = self.clone();
        next.paid_at[stage.index()] = Some(paid_at);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    #[test]
    fn split_of_one_thousand_is_500_300_200() {
        let amounts = StageAmounts::split(100_000).unwrap();
        assert_eq!(amounts.deposit_minor, 50_000);
        assert_eq!(amounts.progress_minor, 30_000);
        assert_eq!(amounts.final_minor, 20_000);
    }

    #[test]
    fn split_always_reconciles_to_the_cent() {
        for total in [0, 1, 2, 3, 7, 99, 101, 333, 1_001, 123_457, 999_999_999] {
            let amounts = StageAmounts::split(total).unwrap();
            assert_eq!(amounts.total(), total, "total {total}");
            assert!(amounts.final_minor >= 0);
        }
    }

    #[test]
    fn oversized_total_is_rejected_instead_of_overflowing() {
        assert_eq!(
            StageAmounts::split(i64::MAX),
            Err(LedgerError::TotalTooLarge(i64::MAX))
        );
        assert!(PaymentLedger::materialize(i64::MAX / 2).is_err());

        let largest = i64::MAX / 50;
        let amounts = StageAmounts::split(largest).unwrap();
        assert_eq!(amounts.total(), largest);
    }

    #[test]
    fn negative_total_is_rejected() {
        assert_eq!(
            StageAmounts::split(-5),
            Err(LedgerError::NegativeTotal(-5))
        );
    }

    #[test]
    fn fresh_ledger_has_deposit_active_and_rest_locked() {
        let ledger = PaymentLedger::materialize(100_000).unwrap();
        assert_eq!(ledger.stage_status(PaymentStage::Deposit), StageStatus::Active);
        assert_eq!(ledger.stage_status(PaymentStage::Progress), StageStatus::Locked);
        assert_eq!(ledger.stage_status(PaymentStage::Final), StageStatus::Locked);
        assert_eq!(ledger.paid_percentage(), 0.0);
        assert_eq!(ledger.derived_status(), ProposalStatus::Approved);
    }

    #[test]
    fn paying_in_order_advances_status_and_totals() {
        let ledger = PaymentLedger::materialize(100_000).unwrap();

        let ledger = ledger.record_payment(PaymentStage::Deposit, at(9)).unwrap();
        assert_eq!(ledger.total_paid_minor(), 50_000);
        assert_eq!(ledger.paid_percentage(), 50.0);
        assert_eq!(ledger.derived_status(), ProposalStatus::DepositPaid);
        assert_eq!(ledger.active_stage(), Some(PaymentStage::Progress));

        let ledger = ledger.record_payment(PaymentStage::Progress, at(10)).unwrap();
        assert_eq!(ledger.total_paid_minor(), 80_000);
        assert_eq!(ledger.derived_status(), ProposalStatus::RoughInPaid);

        let ledger = ledger.record_payment(PaymentStage::Final, at(11)).unwrap();
        assert_eq!(ledger.total_paid_minor(), 100_000);
        assert_eq!(ledger.paid_percentage(), 100.0);
        assert_eq!(ledger.derived_status(), ProposalStatus::Completed);
        assert!(ledger.is_fully_paid());
        assert_eq!(ledger.active_stage(), None);
    }

    #[test]
    fn out_of_order_and_repeat_payments_are_rejected() {
        let ledger = PaymentLedger::materialize(100_000).unwrap();
        assert_eq!(
            ledger.record_payment(PaymentStage::Final, at(9)),
            Err(LedgerError::OutOfOrder {
                stage: PaymentStage::Final,
                pending: PaymentStage::Deposit,
            })
        );

        let ledger = ledger.record_payment(PaymentStage::Deposit, at(9)).unwrap();
        assert_eq!(
            ledger.record_payment(PaymentStage::Deposit, at(10)),
            Err(LedgerError::AlreadyPaid(PaymentStage::Deposit))
        );
    }

    #[test]
    fn rehydration_rejects_gaps_in_paid_stages() {
        let amounts = StageAmounts::split(1_000).unwrap();
        let err = PaymentLedger::from_parts(1_000, amounts, None, None, Some(at(9))).unwrap_err();
        assert_eq!(
            err,
            LedgerError::OutOfOrder {
                stage: PaymentStage::Final,
                pending: PaymentStage::Deposit,
            }
        );
    }

    #[test]
    fn rehydration_rejects_amounts_that_drift_from_total() {
        let amounts = StageAmounts {
            deposit_minor: 500,
            progress_minor: 300,
            final_minor: 100,
        };
        assert_eq!(
            PaymentLedger::from_parts(1_000, amounts, None, None, None),
            Err(LedgerError::AmountMismatch {
                expected: 1_000,
                actual: 900,
            })
        );
    }

    #[test]
    fn no_stage_runs_ahead_of_a_locked_one() {
        let amounts = StageAmounts::split(1_000).unwrap();
        let prefixes = [
            (None, None, None),
            (Some(at(1)), None, None),
            (Some(at(1)), Some(at(2)), None),
            (Some(at(1)), Some(at(2)), Some(at(3))),
        ];

        for (deposit, progress, final_) in prefixes {
            let ledger = PaymentLedger::from_parts(1_000, amounts, deposit, progress, final_).unwrap();
            let mut seen_locked = false;
            for stage in PaymentStage::ALL {
                let status = ledger.stage_status(stage);
                if seen_locked {
                    assert_eq!(status, StageStatus::Locked);
                }
                seen_locked |= status == StageStatus::Locked;
            }
        }
    }

    #[test]
    fn zero_total_reports_zero_percent() {
        let ledger = PaymentLedger::materialize(0).unwrap();
        let ledger = ledger.record_payment(PaymentStage::Deposit, at(9)).unwrap();
        assert_eq!(ledger.paid_percentage(), 0.0);
        assert!(ledger.paid_percentage().is_finite());
    }

    #[test]
    fn total_paid_through_is_cumulative() {
        let ledger = PaymentLedger::materialize(100_000).unwrap();
        assert_eq!(ledger.total_paid_through(PaymentStage::Deposit), 50_000);
        assert_eq!(ledger.total_paid_through(PaymentStage::Progress), 80_000);
        assert_eq!(ledger.total_paid_through(PaymentStage::Final), 100_000);
    }

    #[test]
    fn plan_puts_due_date_on_the_deposit_only() {
        let approved_on = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let plan = PaymentLedger::materialize(1_000).unwrap().plan(approved_on);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].due_date, Some(approved_on));
        assert_eq!(plan[1].due_date, None);
        assert_eq!(plan[2].amount_minor, 200);
        assert!(plan.iter().all(|p| !p.paid));
    }
}
