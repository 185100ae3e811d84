//! Before/after pairs handed to the derived-update handlers.

/// A document change: `before` is `None` on create, `after` is `None` on
/// delete.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<T> {
    pub before: Option<T>,
    pub after: Option<T>,
}

impl<T> Change<T> {
    pub fn created(after: T) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(before: T, after: T) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(before: T) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }
}
