//! Helpers for collective construction: every unit reaches the same outcome,
//! so no unit is left waiting in a barrier when another one fails.

use crate::error::Error;
use crate::pointer::{GlobalPtr, Record};
use crate::transport::{Transport, MASTER_UNIT};

/// Collective: combines the outcome of a local construction step on every
/// unit.
///
/// If any unit failed, the successful units hand their partial result to
/// `undo` and report [`Error::Collective`], the failing units report their own
/// error.
pub(crate) fn settle<C, T>(
    transport: &C,
    local: Result<T, Error>,
    undo: impl FnOnce(T),
) -> Result<T, Error>
where
    C: Transport,
{
    match (transport.agree(local.is_ok()), local) {
        (Ok(()), local) => local,
        (Err(unit), Ok(value)) => {
            undo(value);
            Err(Error::Collective(unit))
        }
        (Err(_), Err(err)) => Err(err),
    }
}

/// Collective: the master allocates `count` zeroed records, initializes them
/// with `init` and broadcasts their address to every unit.
pub(crate) fn share<C, T>(
    transport: &C,
    count: usize,
    init: impl FnOnce(GlobalPtr<T>),
) -> Result<GlobalPtr<T>, Error>
where
    C: Transport,
    T: Record,
{
    let local = if transport.is_master() {
        let res = transport.alloc::<T>(count);
        if let Ok(ptr) = res {
            init(ptr);
        }
        Some(res)
    } else {
        None
    };

    let shared = transport.broadcast(
        local.as_ref().and_then(|res| res.as_ref().ok().copied()).unwrap_or(GlobalPtr::NULL),
        MASTER_UNIT,
    );

    match (shared.is_null(), local) {
        (false, _) => Ok(shared),
        (true, Some(Err(err))) => {
            tracing::warn!(
                unit = transport.unit_id(),
                error = %err,
                "shared header allocation failed"
            );
            Err(err)
        }
        (true, _) => Err(Error::Collective(MASTER_UNIT)),
    }
}
