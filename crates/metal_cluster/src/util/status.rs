use chrono::Utc;

use crate::api::v1alpha1::conditions::{Condition, ConditionStatus, HasConditions};

/// Sets the corresponding condition in conditions to new_condition and returns
/// a tuple containing the new conditions vector and whether it was changed.
///
/// 1. If the condition of the specified type already exists, all fields of the existing condition
///    are updated to new_condition. LastTransitionTime is set to now if the new status differs
///    from the old status
/// 2. If a condition of the specified type does not exist, LastTransitionTime is set to now()
///    and new_condition is appended
pub fn set_status_condition(conditions: &[Condition], mut new_condition: Condition) -> (Vec<Condition>, bool) {
    let mut new_conditions = Vec::from(conditions);
    let mut changed = false;

    if let Some(existing) = find_status_condition_mut(&mut new_conditions, &new_condition.type_) {
        if existing.status != new_condition.status {
            existing.status = new_condition.status;
            existing.last_transition_time = Utc::now();
            changed = true;
        }

        if existing.reason != new_condition.reason {
            existing.reason = new_condition.reason;
            changed = true;
        }

        if existing.message != new_condition.message {
            existing.message = new_condition.message;
            changed = true;
        }
    } else {
        new_condition.last_transition_time = Utc::now();
        new_conditions.push(new_condition);
        changed = true;
    }

    (new_conditions, changed)
}

/// Finds the condition_type in conditions.
pub fn find_status_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|condition| condition.type_ == condition_type)
}

/// Finds the condition_type in conditions and returns a mutable reference.
pub fn find_status_condition_mut<'a>(
    conditions: &'a mut [Condition],
    condition_type: &str,
) -> Option<&'a mut Condition> {
    conditions
        .iter_mut()
        .find(|condition| condition.type_ == condition_type)
}

/// Returns true when the condition_type is present and set to `True`
pub fn is_status_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    is_status_condition_present_and_equal(conditions, condition_type, ConditionStatus::True)
}

/// Returns true when condition_type is present and equal to status.
pub fn is_status_condition_present_and_equal(
    conditions: &[Condition],
    condition_type: &str,
    status: ConditionStatus,
) -> bool {
    conditions
        .iter()
        .any(|condition| condition.type_ == condition_type && condition.status == status)
}

/// Set a condition on any resource carrying a condition list.
pub fn set_condition<T: HasConditions>(obj: &mut T, condition: Condition) -> bool {
    let (conditions, changed) = set_status_condition(obj.conditions(), condition);
    if changed {
        obj.set_conditions(conditions);
    }
    changed
}

pub fn mark_true<T: HasConditions>(obj: &mut T, condition_type: &str, reason: &str) -> bool {
    set_condition(obj, Condition::new(condition_type, ConditionStatus::True, reason, ""))
}

/// Computes `summary_type` from the `tracked` condition types present on `obj`.
///
/// The first False condition wins, then the first Unknown one, otherwise the
/// summary is True; reason and message are taken from the winning condition.
/// When none of the tracked conditions is present the summary is left as is.
/// Returns whether the summary changed.
pub fn set_summary<T: HasConditions>(obj: &mut T, summary_type: &str, tracked: &[&str]) -> bool {
    let present: Vec<&Condition> = tracked
        .iter()
        .filter_map(|t| find_status_condition(obj.conditions(), t))
        .collect();

    let winner = present
        .iter()
        .find(|c| c.status == ConditionStatus::False)
        .or_else(|| present.iter().find(|c| c.status == ConditionStatus::Unknown))
        .or_else(|| present.first());

    let summary = match winner {
        Some(c) => Condition::new(summary_type, c.status, c.reason.clone(), c.message.clone()),
        None => return false,
    };
    set_condition(obj, summary)
}
