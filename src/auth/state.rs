//! Session backend trait and macro.

use std::sync::Arc;

use super::store::SessionSettings;
use crate::jwt::SessionCodec;

/// Trait for state types that can build a [`super::SessionStore`].
pub trait HasSessionBackend {
    fn codec(&self) -> &Arc<SessionCodec>;
    fn session_settings(&self) -> &SessionSettings;
}

/// Macro to implement `HasSessionBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `codec: Arc<SessionCodec>`
/// - `session: SessionSettings`
///
/// # Example
/// ```ignore
/// use crate::impl_has_session_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub codec: Arc<SessionCodec>,
///     pub session: SessionSettings,
///     // ... other fields
/// }
///
/// impl_has_session_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_session_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionBackend for $state_type {
            fn codec(&self) -> &::std::sync::Arc<$crate::jwt::SessionCodec> {
                &self.codec
            }
            fn session_settings(&self) -> &$crate::auth::SessionSettings {
                &self.session
            }
        }
    };
}
