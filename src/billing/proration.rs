use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};
use crate::usage::models::UsagePeriod;

use super::models::PlanChange;

/// key: billing-proration -> mid-period plan change delta
///
/// Credits the unused remainder of the old plan and charges the same
/// remainder of the new plan. Elapsed days are clamped so the last day of a
/// period still has one billable day remaining.
pub fn calculate_plan_change(
    old_plan_amount: Decimal,
    new_plan_amount: Decimal,
    current_date: NaiveDate,
    period_start_date: NaiveDate,
    period: UsagePeriod,
) -> AppResult<PlanChange> {
    if old_plan_amount < Decimal::ZERO || new_plan_amount < Decimal::ZERO {
        return Err(AppError::Validation(
            "plan amounts must be non-negative".to_string(),
        ));
    }
    if current_date < period_start_date {
        return Err(AppError::Validation(
            "current_date precedes period_start_date".to_string(),
        ));
    }

    let days_in_period = period.days_in_period(period_start_date);
    let days_elapsed = (current_date - period_start_date)
        .num_days()
        .clamp(0, days_in_period - 1);
    let days_remaining = days_in_period - days_elapsed;

    let remaining = Decimal::from(days_remaining);
    let total = Decimal::from(days_in_period);
    let credit = old_plan_amount * remaining / total;
    let charge = new_plan_amount * remaining / total;

    Ok(PlanChange {
        amount: charge - credit,
        credit,
        charge,
        days_remaining,
        days_in_period,
    })
}
