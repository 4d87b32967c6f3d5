use crate::db::enums::{TimelockStandard, TransactionStatus};

/// Whether the lifecycle graph has an edge `from -> to` for `standard`.
///
/// Expiry is an admin-based concept; role-based timelocks never expire.
pub fn can_transition(
    from: TransactionStatus,
    to: TransactionStatus,
    standard: TimelockStandard,
) -> bool {
    use TransactionStatus::*;

    match (from, to) {
        (Submitting, Queued | SubmitFailed | Canceled) => true,
        (Queued, Ready | Canceled) => true,
        (Ready, Executing | Canceled) => true,
        (Queued | Ready, Expired) => standard == TimelockStandard::Compound,
        (Executing, Executed | Failed) => true,
        (Failed, Executing | Canceled) => true,
        (SubmitFailed, Submitting | Canceled) => true,
        _ => false,
    }
}

/// Statuses from which a user may cancel.
pub fn is_cancelable(status: TransactionStatus) -> bool {
    can_transition(status, TransactionStatus::Canceled, TimelockStandard::Compound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    const ALL: [TransactionStatus; 9] = [
        Submitting,
        Queued,
        Ready,
        Executing,
        Executed,
        Failed,
        SubmitFailed,
        Expired,
        Canceled,
    ];

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in [Executed, Expired, Canceled] {
            for to in ALL {
                for standard in [TimelockStandard::Compound, TimelockStandard::OpenZeppelin] {
                    assert!(!can_transition(from, to, standard), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn expiry_is_limited_to_admin_based() {
        assert!(can_transition(Queued, Expired, TimelockStandard::Compound));
        assert!(can_transition(Ready, Expired, TimelockStandard::Compound));
        assert!(!can_transition(Queued, Expired, TimelockStandard::OpenZeppelin));
        assert!(!can_transition(Ready, Expired, TimelockStandard::OpenZeppelin));
        assert!(!can_transition(Failed, Expired, TimelockStandard::Compound));
    }

    #[test]
    fn cancel_is_allowed_only_before_execution() {
        let cancelable: Vec<_> = ALL.into_iter().filter(|s| is_cancelable(*s)).collect();
        assert_eq!(cancelable, vec![Submitting, Queued, Ready, Failed, SubmitFailed]);
    }

    #[test]
    fn retries_loop_back() {
        assert!(can_transition(Failed, Executing, TimelockStandard::OpenZeppelin));
        assert!(can_transition(SubmitFailed, Submitting, TimelockStandard::Compound));
        assert!(!can_transition(Queued, Executing, TimelockStandard::Compound));
        assert!(!can_transition(Queued, Queued, TimelockStandard::Compound));
    }
}
