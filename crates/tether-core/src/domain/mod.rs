//! Domain model (IDs, action parameters, request keys, errors).

pub mod action;
pub mod errors;
pub mod ids;
pub mod key;

pub use self::action::{ActionKind, ActionParameter, Pages};
pub use self::errors::{ApiError, BoxError, CancelError, ErrorKind, ProxyError};
pub use self::ids::{HandleId, ObserverId, ProxyId, ScopeId};
pub use self::key::RequestKey;

/// Terminal outcome of one request, as seen by a callback.
pub type Outcome<D> = Result<D, ProxyError>;
