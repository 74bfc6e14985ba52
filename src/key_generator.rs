//! Primary-key generation for INSERT statements.
//!
//! MyBatis's `BEFORE` generator mutates the caller's parameter object in
//! place before the insert runs, then binds the generated value as an
//! ordinary column. The `#[mapper]` proxy passes parameters by shared
//! reference (`&'a T`), so there is nothing here to mutate in place —
//! `before_insert` only produces the value and logs it; wiring it back
//! into the bound SQL is the caller's responsibility via a dedicated
//! sequence-fetching statement of their own. `AFTER` needs no such
//! workaround: `Connection::last_insert_id` runs once the insert has
//! already committed a row.

use crate::error::SqlweaveError;
use crate::registry::mapped_statement::KeyGeneratorKind;
use crate::udbc::connection::Connection;

/// Fetches the generated key for an `AFTER` key generator. Returns `None`
/// for `None`/`Before` generators, since a `Before` key is produced ahead
/// of the insert rather than read back from the connection afterward.
pub async fn after_insert(
    kind: KeyGeneratorKind,
    conn: &mut dyn Connection,
) -> Result<Option<u64>, SqlweaveError> {
    match kind {
        KeyGeneratorKind::After => Ok(Some(conn.last_insert_id().await?)),
        KeyGeneratorKind::Before | KeyGeneratorKind::None => Ok(None),
    }
}
