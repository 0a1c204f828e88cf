// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::types::TableName;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;

/// Tracks whether the close manager currently holds the membership manager
/// for its peer.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipPhase {
    /// Disengaged.
    None,

    /// Queued behind a membership layer that is not yet usable; the peer
    /// will re-trigger the request.
    InWait,

    /// Requests are outstanding with the membership manager.
    InUse,
}

impl MembershipPhase {
    pub fn as_str(&self) -> &str {
        match self {
            MembershipPhase::None => "NONE",
            MembershipPhase::InWait => "IN_WAIT",
            MembershipPhase::InUse => "IN_USE",
        }
    }
}

impl Display for MembershipPhase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The subscription bookkeeping layer shared across all peers. The close
/// manager issues at most one batch of requests per peer at a time and waits
/// for the manager to report completion.
///
/// Request methods (`unregister*`, `walk_ribin`) only enqueue work; the
/// manager processes them on its own task context, driving the peer's
/// RIB-In walks through the close manager's path callback, and invokes the
/// close manager's `membership_walk_done()` once all requested operations
/// for the peer have drained. Implementations must not call back
/// synchronously from a request method.
pub trait MembershipMgr: Send + Sync {
    /// Tables this peer is registered with, fully or RIB-In only.
    fn registered_ribs(&self, peer: IpAddr) -> Vec<TableName>;

    /// Whether the peer is fully (RIB-In and RIB-Out) registered.
    fn is_registered(&self, peer: IpAddr, table: &TableName) -> bool;

    /// Whether the peer is registered for RIB-In only.
    fn is_ribin_registered(&self, peer: IpAddr, table: &TableName) -> bool;

    /// Remove both RIB-In and RIB-Out registrations.
    fn unregister(&self, peer: IpAddr, table: &TableName);

    /// Remove the RIB-Out registration, keeping RIB-In so staling and
    /// sweeping can proceed.
    fn unregister_ribout(&self, peer: IpAddr, table: &TableName);

    /// Remove the RIB-In registration, deleting the peer's paths.
    fn unregister_ribin(&self, peer: IpAddr, table: &TableName);

    /// Walk the peer's RIB-In paths through the per-path callback.
    fn walk_ribin(&self, peer: IpAddr, table: &TableName);

    /// Whether register/unregister/walk work is still outstanding for the
    /// peer.
    fn is_pending(&self, peer: IpAddr) -> bool;
}
