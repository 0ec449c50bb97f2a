//! Principal store implementations

mod memory;
#[cfg(test)]
pub(crate) mod racing;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryPrincipalStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePrincipalStore;

use chrono::{DateTime, Utc};
use natours_core::{NatoursResult, Principal, PrincipalRecord, Projection};

fn apply_projection(record: PrincipalRecord, projection: Projection) -> NatoursResult<Principal> {
    let principal = Principal::from_record(record)?;
    Ok(match projection {
        Projection::Default => principal.without_password_hash(),
        Projection::WithPasswordHash => principal,
    })
}

/// The later of two optional instants
fn latest(stored: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (stored, incoming) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
