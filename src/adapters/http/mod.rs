//! HTTP adapters - the callback endpoint and the listeners serving it.
//!
//! - `callback` - the delivery endpoint (verify, filter, acknowledge, dispatch)
//! - `bootstrap` - plain-HTTP router used alongside TLS (ACME challenges, redirect)
//! - `dispatcher` - detached handler execution with panic isolation
//! - `listener` - accept loops with optional per-connection TLS

pub mod bootstrap;
pub mod callback;
pub mod dispatcher;
pub mod listener;

pub use bootstrap::bootstrap_router;
pub use callback::{callback_router, CallbackRejection, CallbackState};
pub use dispatcher::Dispatcher;
