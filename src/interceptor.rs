//! The keyboard interception contract a capture session depends on.

use anyhow::Result;

/// Opaque token for an installed catch-all registration.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct InterceptHandle(u64);

impl InterceptHandle {
    /// Create a handle. Only interceptor implementations should need this.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Something that can route every keyboard event to a capture session ahead
/// of all other shortcut handling, and stop doing so again.
///
/// While a registration is installed the host must deliver every key-down,
/// whatever the modifiers, to the session and honour its
/// [`Disposition`](crate::Disposition).
pub trait InputInterceptor {
    /// Install a highest-priority catch-all registration.
    fn install(&mut self) -> Result<InterceptHandle>;

    /// Remove a registration returned by [`install`](Self::install).
    fn uninstall(&mut self, handle: InterceptHandle) -> Result<()>;
}

impl<T: InputInterceptor + ?Sized> InputInterceptor for Box<T> {
    fn install(&mut self) -> Result<InterceptHandle> {
        (**self).install()
    }

    fn uninstall(&mut self, handle: InterceptHandle) -> Result<()> {
        (**self).uninstall(handle)
    }
}
