//! Persistent store bring-up
//!
//! A store left behind by another firmware version, or one with no free
//! pages, is erased and initialized exactly once more. Anything else, or a
//! second failure, is returned to the caller, which treats it as fatal to INIT.

use crate::errors::StoreError;
use crate::traits::PersistentStore;

/// How the store came up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreInit {
    /// First `init` succeeded
    Ready,
    /// Store was erased and re-initialized
    Recovered,
}

/// Initialize `store`, erasing and retrying once on a recoverable error
pub fn init_store<S: PersistentStore + ?Sized>(store: &mut S) -> Result<StoreInit, StoreError> {
    match store.init() {
        Ok(()) => Ok(StoreInit::Ready),
        Err(err) if err.is_recoverable() => {
            log_warn!("store init failed ({}), erasing and retrying", err);
            store.erase()?;
            store.init()?;
            Ok(StoreInit::Recovered)
        }
        Err(err) => Err(err),
    }
}
