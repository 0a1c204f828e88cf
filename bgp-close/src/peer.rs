// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::membership::MembershipMgr;
use crate::types::Family;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// The contract a peer object supplies to its close manager. The peer owns
/// the close manager and is guaranteed to outlive it, so the manager keeps a
/// plain shared handle back to the peer with no lifetime gymnastics.
///
/// The notification methods (`graceful_restart_stale`, `close_complete`,
/// `graceful_restart_sweep`, `custom_close`, `delete`) are invoked with the
/// close manager's mutex held and must not call back into the manager.
pub trait ClosePeer: Send + Sync + 'static {
    /// Peer identity used in log lines and membership calls.
    fn addr(&self) -> IpAddr;

    /// Whether graceful restart was negotiated for the session.
    fn is_close_graceful(&self) -> bool;

    /// Whether long-lived graceful restart was negotiated.
    fn is_close_llgr(&self) -> bool;

    /// Whether the BGP session is currently Established.
    fn is_ready(&self) -> bool;

    /// The stale phase of a graceful closure has started.
    fn graceful_restart_stale(&self);

    /// Families for which graceful restart applies.
    fn graceful_restart_families(&self) -> BTreeSet<Family>;

    /// Negotiated graceful restart window.
    fn graceful_restart_time(&self) -> Duration;

    /// Negotiated long-lived graceful restart window.
    fn llgr_time(&self) -> Duration;

    /// Stale paths the reconnected peer did not refresh are being swept.
    fn graceful_restart_sweep(&self);

    /// Peer specific cleanup, invoked once on entry to the delete phase.
    fn custom_close(&self);

    /// The stale phase finished; the restart timer is about to start.
    fn close_complete(&self);

    /// Final teardown at the end of the delete phase.
    fn delete(&self);

    /// Whether the membership layer can be used right now. When this is
    /// false the close manager parks and the peer must call
    /// `membership_request()` once the layer becomes usable.
    fn can_use_membership_manager(&self) -> bool;

    /// Handle to the shared membership manager, if one is available. `None`
    /// is treated as an empty registration set.
    fn membership_mgr(&self) -> Option<Arc<dyn MembershipMgr>>;
}
