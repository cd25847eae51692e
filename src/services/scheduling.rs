use chrono::NaiveTime;

use crate::models::AvailabilitySlot;
use crate::services::availability::AvailabilitySource;

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// The requested slot cannot be booked. `alternatives` are the free
    /// times for the same service on the same day.
    #[error(
        "Sorry, {} is not available on {} for a {}. {}",
        format_time(.slot.time),
        .slot.date.format("%Y-%m-%d"),
        .slot.service,
        offer(.alternatives)
    )]
    Unavailable {
        slot: AvailabilitySlot,
        alternatives: Vec<NaiveTime>,
    },
    #[error("availability lookup failed: {0}")]
    Lookup(anyhow::Error),
}

fn offer(alternatives: &[NaiveTime]) -> String {
    if alternatives.is_empty() {
        "There are no free times left that day.".to_string()
    } else {
        format!("We have these times: {}.", format_times(alternatives))
    }
}

pub fn validate_slot(
    source: &dyn AvailabilitySource,
    slot: &AvailabilitySlot,
) -> Result<(), SchedulingError> {
    if source.is_available(slot).map_err(SchedulingError::Lookup)? {
        return Ok(());
    }
    Err(unavailable(source, slot))
}

/// Builds the refusal for `slot`, listing what is still free that day.
pub fn unavailable(source: &dyn AvailabilitySource, slot: &AvailabilitySlot) -> SchedulingError {
    let alternatives = match source.available_times(slot.date, &slot.service) {
        Ok(times) => times.into_iter().filter(|t| *t != slot.time).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to list alternative times");
            vec![]
        }
    };
    SchedulingError::Unavailable {
        slot: slot.clone(),
        alternatives,
    }
}

/// `9:00`, `15:30`
pub fn format_time(t: NaiveTime) -> String {
    t.format("%-H:%M").to_string()
}

pub fn format_times(times: &[NaiveTime]) -> String {
    times
        .iter()
        .map(|t| format_time(*t))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::availability::StaticAvailability;
    use chrono::NaiveDate;

    fn slot(time: &str) -> AvailabilitySlot {
        AvailabilitySlot {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            service: "haircut".to_string(),
        }
    }

    struct FailingSource;

    impl AvailabilitySource for FailingSource {
        fn is_available(&self, _slot: &AvailabilitySlot) -> anyhow::Result<bool> {
            Err(anyhow::anyhow!("backend down"))
        }
    }

    #[test]
    fn test_available_slot_passes() {
        let source = StaticAvailability::new([slot("10:00")]);
        assert!(validate_slot(&source, &slot("10:00")).is_ok());
    }

    #[test]
    fn test_unavailable_slot_lists_alternatives() {
        let source = StaticAvailability::new([slot("09:00"), slot("16:00")]);
        let err = validate_slot(&source, &slot("10:00")).unwrap_err();
        match &err {
            SchedulingError::Unavailable { alternatives, .. } => assert_eq!(alternatives.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.to_string(),
            "Sorry, 10:00 is not available on 2024-01-01 for a haircut. We have these times: 9:00, 16:00."
        );
    }

    #[test]
    fn test_unavailable_without_alternatives() {
        let source = StaticAvailability::default();
        let err = validate_slot(&source, &slot("10:00")).unwrap_err();
        assert!(err.to_string().ends_with("There are no free times left that day."));
    }

    #[test]
    fn test_lookup_failure_is_not_a_refusal() {
        let err = validate_slot(&FailingSource, &slot("10:00")).unwrap_err();
        assert!(matches!(err, SchedulingError::Lookup(_)));
    }
}
