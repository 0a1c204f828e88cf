// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for the per-path close callback.
//!
//! Each fixture below is a close manager parked in one phase (the membership
//! layer is reported unusable, so the phase holds still), letting the
//! decision table be probed with arbitrary path flag and community
//! combinations.

use crate::close::ClosePhase;
use crate::rib::{Path, PathAttrs, RibOperation};
use crate::test::{harness_no_tables, wait_for, Harness, RequestSink};
use crate::types::{path_flags, Community, Family, Prefix};
use proptest::prelude::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

lazy_static! {
    static ref STALE_FIXTURE: Harness = {
        let h = harness_no_tables();
        h.peer.membership_usable.store(false, Ordering::Relaxed);
        h.mgr.close(false);
        assert_eq!(h.mgr.close_info().state, ClosePhase::Stale);
        h
    };
    static ref LLGR_FIXTURE: Harness = {
        let h = harness_no_tables();
        h.peer.llgr.store(true, Ordering::Relaxed);
        h.mgr.close(false);
        h.peer.membership_usable.store(false, Ordering::Relaxed);
        h.mgr.eor_received(Family::Unspec);
        wait_for("llgr stale phase", || {
            h.mgr.close_info().state == ClosePhase::LlgrStale
        });
        h
    };
    static ref SWEEP_FIXTURE: Harness = {
        let h = harness_no_tables();
        h.mgr.close(false);
        h.peer.ready.store(true, Ordering::Relaxed);
        h.peer.membership_usable.store(false, Ordering::Relaxed);
        h.mgr.eor_received(Family::Unspec);
        wait_for("sweep phase", || {
            h.mgr.close_info().state == ClosePhase::Sweep
        });
        h
    };
    static ref DELETE_FIXTURE: Harness = {
        let h = harness_no_tables();
        h.peer.membership_usable.store(false, Ordering::Relaxed);
        h.mgr.close(true);
        assert_eq!(h.mgr.close_info().state, ClosePhase::Delete);
        h
    };
}

fn probe(
    h: &Harness,
    path: &mut Path,
) -> (bool, Option<crate::rib::RibRequest>) {
    let sink = RequestSink::default();
    let prefix: Prefix = "192.0.2.0/24".parse().unwrap();
    let modified = h.mgr.membership_path_callback(&sink, &prefix, path);
    let request = sink.0.lock().unwrap().pop();
    (modified, request)
}

fn make_path(flags: u32, communities: Vec<Community>) -> Path {
    let mut p = Path::new(
        Arc::new(PathAttrs { communities }),
        1,
        0,
    );
    p.flags = flags;
    p
}

// exercise both stale bits plus a couple of unrelated flag bits
fn flags_strategy() -> impl Strategy<Value = u32> {
    0u32..16u32
}

proptest! {
    /// Staling modifies a path exactly once, whatever state it starts in.
    #[test]
    fn prop_stale_marking_idempotent(flags in flags_strategy()) {
        let h: &Harness = &STALE_FIXTURE;
        let mut path = make_path(flags, vec![]);
        let was_stale = path.is_stale();

        let (modified, request) = probe(h, &mut path);
        prop_assert_eq!(modified, !was_stale);
        if let Some(req) = request {
            prop_assert_eq!(req.operation, RibOperation::AddChange);
            prop_assert_eq!(req.flags, flags | path_flags::STALE);
            prop_assert!(req.attrs.is_some());
            path.flags = req.flags;
        }

        // second visit in the same phase is always a no-op
        let (modified, request) = probe(h, &mut path);
        prop_assert!(!modified);
        prop_assert!(request.is_none());
    }

    /// LLGR demotion deletes opted-out paths and demotes the rest exactly
    /// once.
    #[test]
    fn prop_llgr_demotion(
        flags in flags_strategy(),
        opted_out in any::<bool>(),
    ) {
        let h: &Harness = &LLGR_FIXTURE;
        let communities = if opted_out {
            vec![Community::NoLlgr]
        } else {
            vec![Community::UserDefined(64512)]
        };
        let mut path = make_path(flags, communities);
        let was_llgr_stale = path.is_llgr_stale();

        let (modified, request) = probe(h, &mut path);
        if opted_out {
            prop_assert!(modified);
            let req = request.unwrap();
            prop_assert_eq!(req.operation, RibOperation::Delete);
            prop_assert!(req.attrs.is_none());
        } else {
            prop_assert_eq!(modified, !was_llgr_stale);
            if let Some(req) = request {
                prop_assert_eq!(req.operation, RibOperation::AddChange);
                prop_assert_eq!(
                    req.flags,
                    flags | path_flags::LLGR_STALE
                );
                path.flags = req.flags;
                let (again, _) = probe(h, &mut path);
                prop_assert!(!again);
            }
        }
    }

    /// Sweeping touches marked paths only, deleting them with their marks
    /// cleared.
    #[test]
    fn prop_sweep_deletes_marked_paths(flags in flags_strategy()) {
        let h: &Harness = &SWEEP_FIXTURE;
        let mut path = make_path(flags, vec![]);
        let marked = path.is_stale() || path.is_llgr_stale();

        let (modified, request) = probe(h, &mut path);
        prop_assert_eq!(modified, marked);
        if marked {
            let req = request.unwrap();
            prop_assert_eq!(req.operation, RibOperation::Delete);
            prop_assert!(!path.is_stale());
            prop_assert!(!path.is_llgr_stale());
        } else {
            prop_assert!(request.is_none());
            prop_assert_eq!(path.flags, flags);
        }
    }

    /// Deletion is unconditional and carries no attributes.
    #[test]
    fn prop_delete_is_unconditional(flags in flags_strategy()) {
        let h: &Harness = &DELETE_FIXTURE;
        let mut path = make_path(flags, vec![]);

        let (modified, request) = probe(h, &mut path);
        prop_assert!(modified);
        let req = request.unwrap();
        prop_assert_eq!(req.operation, RibOperation::Delete);
        prop_assert!(req.attrs.is_none());
        prop_assert_eq!(req.flags, flags);
    }
}
