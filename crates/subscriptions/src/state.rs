use obscuro_primitives::ErrorKind;

/// The lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Forwarded to the enclave, awaiting its acknowledgement.
    Pending,
    /// Acknowledged by the enclave; events are delivered.
    Active,
    /// Terminated. No event is delivered anymore.
    Closed,
}

/// An illegal transition of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal subscription transition from {from:?} to {to:?}")]
pub struct SubscriptionStateError {
    /// The current state.
    pub from: SubscriptionState,
    /// The requested state.
    pub to: SubscriptionState,
}

impl SubscriptionStateError {
    /// Returns the kind of the error.
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::SubscriptionState
    }
}

impl SubscriptionState {
    /// Returns the state reached by moving to `to`. `Closed` is terminal.
    pub const fn transition(self, to: Self) -> Result<Self, SubscriptionStateError> {
        match (self, to) {
            (Self::Pending, Self::Active) | (Self::Pending | Self::Active, Self::Closed) => Ok(to),
            (from, to) => Err(SubscriptionStateError { from, to }),
        }
    }

    /// Returns true if events are delivered in this state.
    pub const fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::SubscriptionState::{self, Active, Closed, Pending};

    #[test]
    fn test_transitions() {
        assert_eq!(Pending.transition(Active), Ok(Active));
        assert_eq!(Pending.transition(Closed), Ok(Closed));
        assert_eq!(Active.transition(Closed), Ok(Closed));

        let illegal: [(SubscriptionState, SubscriptionState); 6] = [
            (Pending, Pending),
            (Active, Active),
            (Active, Pending),
            (Closed, Pending),
            (Closed, Active),
            (Closed, Closed),
        ];
        for (from, to) in illegal {
            let err = from.transition(to).unwrap_err();
            assert_eq!((err.from, err.to), (from, to));
        }
    }
}
