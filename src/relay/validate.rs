//! Access-code validation and the staleness rule.
//!
//! A presented code is superseded once the next newer code has been
//! claimed (`next.last_update > presented.created`). A newer code that
//! nobody has used yet does not retire the presented one, so a controller
//! that reconnects quickly with a just-rotated code keeps working.

use crate::storage::models::AccessCode;
use crate::storage::{CodeStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The code exists and has not been superseded
    Accepted(AccessCode),
    /// A newer code is already in use
    Superseded {
        current: AccessCode,
        presented: AccessCode,
    },
    /// The code is not in the store
    Unknown,
}

/// Decide whether `code` may drive the receiver.
///
/// Store failures other than NotFound are returned to the caller, which
/// treats them like an unknown code.
pub async fn check(store: &dyn CodeStore, code: &str) -> Result<Verdict, StoreError> {
    let presented = match store.get(code).await {
        Ok(presented) => presented,
        Err(StoreError::NotFound(_)) => return Ok(Verdict::Unknown),
        Err(e) => return Err(e),
    };

    // Ascending order, so a code two rotations ahead that nobody has claimed
    // cannot mask the claimed one in between.
    if let Some(next) = store.next_after(&presented.code, presented.created).await? {
        if next.last_update > presented.created {
            return Ok(Verdict::Superseded {
                current: next,
                presented,
            });
        }
    }

    Ok(Verdict::Accepted(presented))
}
