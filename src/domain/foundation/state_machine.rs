//! Transition table trait for lifecycle enums.

use super::ValidationError;

/// A status enum with an explicit transition table.
///
/// Implementors list the legal moves; `transition_to` turns an illegal one
/// into a `ValidationError` on the `state_transition` field.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Every legal target from `self`. Must agree with `can_transition_to`.
    fn valid_transitions(&self) -> Vec<Self>;

    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }
}
