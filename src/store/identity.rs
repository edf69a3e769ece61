use std::cell::Cell;
use std::rc::Rc;

use crate::models::UserId;

/// Resolves the identity acting at call time.
pub trait IdentityProvider {
    fn current_user(&self) -> Option<UserId>;
}

/// An identity fixed by the caller, switchable between calls.
///
/// Anonymous (public) viewers are represented by `None`.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: Cell<Option<UserId>>,
}

impl StaticIdentity {
    pub fn new(user: Option<UserId>) -> Self {
        Self {
            user: Cell::new(user),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: UserId) -> Self {
        Self::new(Some(id))
    }

    /// Replaces the acting identity, e.g. after a sign-in.
    pub fn set(&self, user: Option<UserId>) {
        self.user.set(user);
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user.get()
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Rc<T> {
    fn current_user(&self) -> Option<UserId> {
        (**self).current_user()
    }
}
