use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

/// Invokes `event` on every listener in registration order.
///
/// A panicking listener is logged and skipped; later listeners still run and
/// the caller's outcome is unaffected.
pub(crate) fn notify<L, F>(listeners: &[Arc<L>], event: &'static str, mut f: F)
where
    L: ?Sized,
    F: FnMut(&L),
{
    for listener in listeners {
        let listener = listener.as_ref();
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| f(listener))) {
            warn!(
                event,
                reason = %panic_message(panic.as_ref()),
                "Listener panicked; continuing with remaining listeners"
            );
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
