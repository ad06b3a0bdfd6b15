use serde::{Deserialize, Serialize};

use flowrack_core::{DomainError, DomainResult};

/// Request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Collecting,
    Delivered,
    Returned,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Collecting,
        RequestStatus::Delivered,
        RequestStatus::Returned,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Collecting => "collecting",
            RequestStatus::Delivered => "delivered",
            RequestStatus::Returned => "returned",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }

    /// Direct successors in the transition graph.
    pub fn successors(&self) -> &'static [RequestStatus] {
        match self {
            RequestStatus::Pending => &[RequestStatus::Approved, RequestStatus::Cancelled],
            RequestStatus::Approved => &[RequestStatus::Collecting, RequestStatus::Cancelled],
            RequestStatus::Collecting => &[RequestStatus::Delivered],
            RequestStatus::Delivered => &[RequestStatus::Returned],
            RequestStatus::Returned | RequestStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(RequestStatus::Cancelled)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_is_forward_only() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Collecting));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(Collecting.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Returned));

        assert!(!Approved.can_transition_to(Pending));
        assert!(!Collecting.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Collecting));
        assert!(!Pending.can_transition_to(Collecting));
        assert!(Returned.is_terminal());
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn no_status_reaches_itself_or_pending() {
        for from in RequestStatus::ALL {
            assert!(!from.can_transition_to(from));
            assert!(!from.can_transition_to(RequestStatus::Pending));
        }
    }

    #[test]
    fn approved_is_only_reachable_from_pending() {
        let sources: Vec<RequestStatus> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(RequestStatus::Approved))
            .collect();
        assert_eq!(sources, vec![RequestStatus::Pending]);
    }

    #[test]
    fn parse_round_trips_names() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(RequestStatus::parse("shipped").is_err());
    }
}
