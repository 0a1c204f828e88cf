// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Close manager for a BGP peering session.
//!
//! A close is processed in phases:
//!
//! Graceful                                    state: NONE
//! RibIn stale marking and RibOut deletion     state: STALE
//! Restart timer start                         state: GR_TIMER
//!
//! Peer ready in the timer callback (or all EoRs received)
//! RibIn sweep                                 state: SWEEP
//!   walk done                                 state: NONE
//!
//! Peer not ready in the timer callback, LLGR negotiated
//! RibIn re-marking with LLGR_STALE            state: LLGR_STALE
//!   LLGR timer start                          state: LLGR_TIMER
//!     peer still not ready on expiry
//!       RibIn delete                          state: DELETE
//!         walk done                           state: NONE
//!     peer ready on expiry (or all EoRs received)
//!       RibIn sweep                           state: SWEEP
//!         walk done                           state: NONE
//!
//! LLGR not negotiated: RibIn delete           state: DELETE
//!
//! A close request that lands during a timer phase cancels the timer and
//! starts the closure over, carrying the elapsed wait forward so a flapping
//! peer cannot extend its restart window indefinitely. A close request that
//! lands during a walk phase is latched and serviced when the walk drains.
//! A non-graceful request is sticky for the rest of the cycle.

use crate::clock::Timer;
use crate::log::close_log;
use crate::membership::MembershipPhase;
use crate::peer::ClosePeer;
use crate::rib::{Path, RibOperation, RibRequest, RibTable};
use crate::types::{path_flags, Community, Family, Prefix};
use close_common::{format_window, lock};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// The phases a close cycle moves through.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClosePhase {
    /// Idle, no close in progress.
    None,

    /// RIB-In paths being marked stale (RFC 4724).
    Stale,

    /// Graceful restart window running, waiting for the peer to recover.
    GrTimer,

    /// RIB-In paths being re-marked with LLGR stale semantics (RFC 9494).
    LlgrStale,

    /// Long-lived graceful restart window running.
    LlgrTimer,

    /// Peer recovered; stale paths it did not refresh are being deleted.
    Sweep,

    /// Peer did not recover, or the close is non-graceful; all RIB-In paths
    /// being deleted and the peer torn down.
    Delete,
}

impl ClosePhase {
    pub fn as_str(&self) -> &str {
        match self {
            ClosePhase::None => "NONE",
            ClosePhase::Stale => "STALE",
            ClosePhase::GrTimer => "GR_TIMER",
            ClosePhase::LlgrStale => "LLGR_STALE",
            ClosePhase::LlgrTimer => "LLGR_TIMER",
            ClosePhase::Sweep => "SWEEP",
            ClosePhase::Delete => "DELETE",
        }
    }
}

impl Display for ClosePhase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monotonic close manager counters.
#[derive(Default)]
pub struct CloseCounters {
    /// Entries into NONE, including construction.
    pub init: AtomicU64,

    /// External close requests.
    pub close: AtomicU64,

    /// Close requests that landed while a cycle was already running.
    pub nested: AtomicU64,

    /// Cycles that entered DELETE.
    pub deletes: AtomicU64,

    /// Cycles that entered STALE.
    pub stale: AtomicU64,

    /// Cycles that entered LLGR_STALE.
    pub llgr_stale: AtomicU64,

    /// Cycles that entered SWEEP.
    pub sweep: AtomicU64,

    /// Times the graceful restart window was started.
    pub gr_timer: AtomicU64,

    /// Times the long-lived graceful restart window was started.
    pub llgr_timer: AtomicU64,
}

/// Point-in-time snapshot of a close manager, served through the
/// introspection API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CloseInfo {
    pub state: ClosePhase,
    pub close_again: bool,
    pub non_graceful: bool,
    pub init: u64,
    pub close: u64,
    pub nested: u64,
    pub deletes: u64,
    pub stale: u64,
    pub llgr_stale: u64,
    pub sweep: u64,
    pub gr_timer: u64,
    pub llgr_timer: u64,
}

/// Mutable close cycle state, guarded by the manager's mutex.
struct CloseState {
    state: ClosePhase,
    membership: MembershipPhase,

    /// A close request arrived while one was in progress.
    close_again: bool,

    /// Sticky for the rest of the cycle once set.
    non_graceful: bool,

    /// Families still awaiting an End-of-RIB marker.
    families: BTreeSet<Family>,

    /// Restart window time consumed by earlier nested closes.
    gr_elapsed: Duration,
    llgr_elapsed: Duration,
}

impl CloseState {
    fn new() -> Self {
        Self {
            state: ClosePhase::None,
            membership: MembershipPhase::None,
            close_again: false,
            non_graceful: false,
            families: BTreeSet::new(),
            gr_elapsed: Duration::ZERO,
            llgr_elapsed: Duration::ZERO,
        }
    }
}

/// Drives the closure of one peer. Created by the peer when the peer is
/// created and lives exactly as long as it; timers are cancelled and joined
/// when the manager drops.
///
/// Every entry point takes the single close mutex before inspecting or
/// mutating state, and every handler runs to completion under it. Work that
/// must run on a different context (the sweep notification) is deferred
/// through a zero-delay timer rather than by blocking.
pub struct CloseManager<P: ClosePeer> {
    peer: Arc<P>,
    state: Mutex<CloseState>,
    restart_timer: Timer,
    sweep_timer: Timer,
    pub counters: CloseCounters,
    sref: Weak<Self>,
    log: Logger,
}

impl<P: ClosePeer> CloseManager<P> {
    pub fn new(peer: Arc<P>, log: Logger) -> Arc<Self> {
        let mgr = Arc::new_cyclic(|sref| Self {
            peer,
            state: Mutex::new(CloseState::new()),
            restart_timer: Timer::new(
                "graceful restart stale timer",
                log.clone(),
            ),
            sweep_timer: Timer::new(
                "graceful restart sweep timer",
                log.clone(),
            ),
            counters: CloseCounters::default(),
            sref: sref.clone(),
            log,
        });
        mgr.counters.init.fetch_add(1, Ordering::Relaxed);
        mgr
    }

    /// Request closure of the peer. Graceful closes stale routes and waits
    /// for the peer to come back; non-graceful goes straight to deletion.
    /// Once a cycle has seen a non-graceful request it stays non-graceful
    /// until the cycle completes, whatever later requests say.
    pub fn close(&self, non_graceful: bool) {
        let mut s = lock!(self.state);
        self.counters.close.fetch_add(1, Ordering::Relaxed);
        s.non_graceful |= non_graceful;
        self.close_locked(&mut s);
    }

    fn close_locked(&self, s: &mut CloseState) {
        if s.close_again {
            close_log!(self, s, info, "nested close calls ignored");
            return;
        }

        match s.state {
            ClosePhase::None => self.process_closure(s),

            ClosePhase::GrTimer => {
                close_log!(self, s, info, "nested close: restart gr");
                s.close_again = true;
                self.counters.nested.fetch_add(1, Ordering::Relaxed);
                s.gr_elapsed += self.restart_timer.elapsed();
                self.close_complete(s);
            }

            ClosePhase::LlgrTimer => {
                close_log!(self, s, info, "nested close: restart llgr");
                s.close_again = true;
                self.counters.nested.fetch_add(1, Ordering::Relaxed);
                s.llgr_elapsed += self.restart_timer.elapsed();
                self.close_complete(s);
            }

            // A walk is in flight and must drain first; latch the request
            // and service it from the walk completion.
            ClosePhase::Stale
            | ClosePhase::LlgrStale
            | ClosePhase::Sweep
            | ClosePhase::Delete => {
                close_log!(self, s, info, "nested close");
                s.close_again = true;
                self.counters.nested.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// An End-of-RIB marker arrived for `family`. Once every family the
    /// peer negotiated restart for has seen its marker, the restart window
    /// collapses and the next phase is evaluated immediately.
    pub fn eor_received(&self, family: Family) {
        let mut s = lock!(self.state);
        if !matches!(s.state, ClosePhase::GrTimer | ClosePhase::LlgrTimer)
            || s.families.is_empty()
        {
            return;
        }
        close_log!(self, s, info, "end-of-rib received for {family}");
        if family == Family::Unspec {
            s.families.clear();
        } else {
            s.families.remove(&family);
        }
        if s.families.is_empty() {
            self.start_restart_timer(&s, Duration::ZERO);
        }
    }

    fn start_restart_timer(&self, s: &CloseState, interval: Duration) {
        close_log!(
            self,
            s,
            info,
            "restart timer armed to fire after {}",
            format_window(interval)
        );
        let sref = self.sref.clone();
        self.restart_timer.start(interval, move || {
            if let Some(mgr) = sref.upgrade() {
                mgr.restart_timer_fired();
            }
        });
    }

    fn restart_timer_fired(&self) {
        let mut s = lock!(self.state);
        match s.state {
            ClosePhase::GrTimer | ClosePhase::LlgrTimer => {
                close_log!(self, s, info, "restart timer fired");
                self.process_closure(&mut s);
            }
            // Superseded arming that won the cancellation race.
            _ => {
                close_log!(self, s, warn, "stale restart timer callback");
            }
        }
    }

    /// Evaluate the next phase. Entered from NONE when a close begins and
    /// from the timer phases when the window expires or collapses.
    fn process_closure(&self, s: &mut CloseState) {
        match s.state {
            ClosePhase::None => {
                if s.non_graceful || !self.peer.is_close_graceful() {
                    self.move_to(s, ClosePhase::Delete);
                    self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.move_to(s, ClosePhase::Stale);
                    self.counters.stale.fetch_add(1, Ordering::Relaxed);
                    self.peer.graceful_restart_stale();
                }
            }

            ClosePhase::GrTimer => {
                if self.peer.is_ready() {
                    self.move_to(s, ClosePhase::Sweep);
                    s.gr_elapsed = Duration::ZERO;
                    s.llgr_elapsed = Duration::ZERO;
                    self.counters.sweep.fetch_add(1, Ordering::Relaxed);
                } else if self.peer.is_close_llgr() {
                    self.move_to(s, ClosePhase::LlgrStale);
                    self.counters.llgr_stale.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.move_to(s, ClosePhase::Delete);
                    self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                }
            }

            ClosePhase::LlgrTimer => {
                if self.peer.is_ready() {
                    self.move_to(s, ClosePhase::Sweep);
                    s.gr_elapsed = Duration::ZERO;
                    s.llgr_elapsed = Duration::ZERO;
                    self.counters.sweep.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.move_to(s, ClosePhase::Delete);
                    self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                }
            }

            ClosePhase::Stale
            | ClosePhase::LlgrStale
            | ClosePhase::Sweep
            | ClosePhase::Delete => {
                panic!(
                    "close processing re-entered during walk state {}",
                    s.state
                );
            }
        }

        if s.state == ClosePhase::Delete {
            self.peer.custom_close();
        }
        self.membership_request_locked(s);
    }

    fn move_to(&self, s: &mut CloseState, next: ClosePhase) {
        assert_ne!(s.state, next);
        close_log!(self, s, info, "move to state {next}");
        s.state = next;
    }

    /// Wind the cycle back to NONE. If a close was latched while the cycle
    /// ran, start a fresh one; the sticky non-graceful flag and accumulated
    /// timer elapsed carry into it.
    fn close_complete(&self, s: &mut CloseState) {
        self.move_to(s, ClosePhase::None);
        self.restart_timer.cancel();
        self.sweep_timer.cancel();
        s.families.clear();
        self.counters.init.fetch_add(1, Ordering::Relaxed);

        if s.close_again {
            s.close_again = false;
            self.close_locked(s);
        }
    }

    /// Re-trigger a membership request that parked because the membership
    /// layer was not usable. Called by the peer once
    /// `can_use_membership_manager()` turns true.
    pub fn membership_request(&self) {
        let mut s = lock!(self.state);
        self.membership_request_locked(&mut s);
    }

    fn membership_request_locked(&self, s: &mut CloseState) {
        assert_ne!(s.membership, MembershipPhase::InUse);

        // Pause until the membership layer is ready; the peer re-triggers.
        if !self.peer.can_use_membership_manager() {
            s.membership = MembershipPhase::InWait;
            close_log!(self, s, info, "membership manager not usable, waiting");
            return;
        }
        s.membership = MembershipPhase::InUse;

        // An unavailable manager is treated as an empty registration set.
        let mgr = match self.peer.membership_mgr() {
            Some(mgr) => mgr,
            None => {
                self.walk_done_locked(s);
                return;
            }
        };

        let addr = self.peer.addr();
        let tables = mgr.registered_ribs(addr);

        // Nothing registered: synthesize the walk completion inline.
        if tables.is_empty() {
            self.walk_done_locked(s);
            return;
        }

        for table in &tables {
            if mgr.is_registered(addr, table) {
                if s.state == ClosePhase::Delete {
                    mgr.unregister(addr, table);
                } else {
                    mgr.unregister_ribout(addr, table);
                }
            } else {
                assert!(mgr.is_ribin_registered(addr, table));
                if s.state == ClosePhase::Delete {
                    mgr.unregister_ribin(addr, table);
                } else {
                    mgr.walk_ribin(addr, table);
                }
            }
        }
    }

    fn is_membership_pending(&self) -> bool {
        self.peer
            .membership_mgr()
            .map(|mgr| mgr.is_pending(self.peer.addr()))
            .unwrap_or(false)
    }

    /// The membership manager finished the requested unregisters and walks
    /// for this peer. Runs on the membership task context. Returns false if
    /// work is still outstanding.
    pub fn membership_walk_done(&self) -> bool {
        let mut s = lock!(self.state);
        self.walk_done_locked(&mut s)
    }

    fn walk_done_locked(&self, s: &mut CloseState) -> bool {
        assert!(
            matches!(
                s.state,
                ClosePhase::Stale
                    | ClosePhase::LlgrStale
                    | ClosePhase::Sweep
                    | ClosePhase::Delete
            ),
            "walk completion in state {}",
            s.state
        );
        assert_eq!(s.membership, MembershipPhase::InUse);

        if self.is_membership_pending() {
            return false;
        }

        s.membership = MembershipPhase::None;
        close_log!(self, s, info, "rib walk completed");

        if s.state == ClosePhase::Delete {
            self.move_to(s, ClosePhase::None);
            self.peer.delete();
            s.gr_elapsed = Duration::ZERO;
            s.llgr_elapsed = Duration::ZERO;
            s.families.clear();
            s.close_again = false;
            s.non_graceful = false;
            self.counters.init.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        // Service a latched close before starting any timer.
        if s.close_again {
            self.close_complete(s);
            return true;
        }

        match s.state {
            ClosePhase::Stale => {
                self.peer.close_complete();
                self.move_to(s, ClosePhase::GrTimer);
                s.families = self.peer.graceful_restart_families();
                let time = self
                    .peer
                    .graceful_restart_time()
                    .saturating_sub(s.gr_elapsed);
                self.start_restart_timer(s, time);
                self.counters.gr_timer.fetch_add(1, Ordering::Relaxed);
            }

            // Typically a very long window; EoRs are expected to collapse
            // it well before it expires.
            ClosePhase::LlgrStale => {
                self.move_to(s, ClosePhase::LlgrTimer);
                s.families = self.peer.graceful_restart_families();
                let time =
                    self.peer.llgr_time().saturating_sub(s.llgr_elapsed);
                self.start_restart_timer(s, time);
                self.counters.llgr_timer.fetch_add(1, Ordering::Relaxed);
            }

            ClosePhase::Sweep => self.trigger_sweep_actions(s),

            _ => unreachable!(),
        }
        true
    }

    /// The user-visible sweep must not run on the membership task context,
    /// so hop onto the timer context with a zero-delay arming.
    fn trigger_sweep_actions(&self, s: &CloseState) {
        close_log!(self, s, info, "sweep timer armed to fire right away");
        let sref = self.sref.clone();
        self.sweep_timer.start(Duration::ZERO, move || {
            if let Some(mgr) = sref.upgrade() {
                mgr.sweep_timer_fired();
            }
        });
    }

    fn sweep_timer_fired(&self) {
        let mut s = lock!(self.state);
        if s.state != ClosePhase::Sweep {
            close_log!(self, s, warn, "stale sweep timer callback");
            return;
        }
        self.peer.graceful_restart_sweep();
        self.close_complete(&mut s);
    }

    /// Per-path decision function, invoked by the membership manager for
    /// each of the peer's paths during a RIB-In walk. Translates the current
    /// phase into an add/change or delete fed to the table input process,
    /// with the peer as origin and the path's id, merged flags and label
    /// preserved. Returns whether the path was modified.
    pub fn membership_path_callback(
        &self,
        table: &dyn RibTable,
        prefix: &Prefix,
        path: &mut Path,
    ) -> bool {
        let s = lock!(self.state);

        let (operation, attrs, stale) = match s.state {
            ClosePhase::None | ClosePhase::GrTimer | ClosePhase::LlgrTimer => {
                return false;
            }

            ClosePhase::Sweep => {
                // Only paths the new session did not refresh remain marked;
                // those must go.
                if !path.is_stale() && !path.is_llgr_stale() {
                    return false;
                }
                path.reset_stale();
                path.reset_llgr_stale();
                (RibOperation::Delete, None, 0)
            }

            ClosePhase::Delete => (RibOperation::Delete, None, 0),

            ClosePhase::Stale => {
                // Already marked from a previous cycle; the session flipped
                // while in GR_TIMER.
                if path.is_stale() {
                    return false;
                }
                (
                    RibOperation::AddChange,
                    path.attrs.clone(),
                    path_flags::STALE,
                )
            }

            ClosePhase::LlgrStale => {
                // NO_LLGR opts the path out of long-lived retention.
                if path
                    .attrs
                    .as_ref()
                    .map(|a| a.has_community(Community::NoLlgr))
                    .unwrap_or(false)
                {
                    (RibOperation::Delete, None, 0)
                } else if path.is_llgr_stale() {
                    // Session flipped while in LLGR_TIMER.
                    return false;
                } else {
                    (
                        RibOperation::AddChange,
                        path.attrs.clone(),
                        path_flags::LLGR_STALE,
                    )
                }
            }
        };

        table.input(
            self.peer.addr(),
            RibRequest {
                prefix: *prefix,
                operation,
                attrs,
                path_id: path.path_id,
                flags: path.flags | stale,
                label: path.label,
            },
        );
        true
    }

    /// Snapshot for the introspection API. Purely observational.
    pub fn close_info(&self) -> CloseInfo {
        let s = lock!(self.state);
        CloseInfo {
            state: s.state,
            close_again: s.close_again,
            non_graceful: s.non_graceful,
            init: self.counters.init.load(Ordering::Relaxed),
            close: self.counters.close.load(Ordering::Relaxed),
            nested: self.counters.nested.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            llgr_stale: self.counters.llgr_stale.load(Ordering::Relaxed),
            sweep: self.counters.sweep.load(Ordering::Relaxed),
            gr_timer: self.counters.gr_timer.load(Ordering::Relaxed),
            llgr_timer: self.counters.llgr_timer.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn elapsed_accounting(&self) -> (Duration, Duration) {
        let s = lock!(self.state);
        (s.gr_elapsed, s.llgr_elapsed)
    }

    #[cfg(test)]
    pub(crate) fn pending_families(&self) -> BTreeSet<Family> {
        lock!(self.state).families.clone()
    }

    #[cfg(test)]
    pub(crate) fn membership_phase(&self) -> MembershipPhase {
        lock!(self.state).membership
    }
}
