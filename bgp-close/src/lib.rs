// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Graceful, long-lived-graceful and non-graceful closure of BGP peering
//! sessions.
//!
//! When a peer goes away, the paths learned from it are not deleted outright.
//! Per RFC 4724 they are first marked stale and kept for a restart window,
//! and per RFC 9494 optionally demoted a second time and kept for a longer
//! window, so that a peer that comes back quickly does not trigger a
//! reconvergence storm. The [`close::CloseManager`] in this crate drives that
//! lifecycle: it marks RIB-In paths, runs the restart timers, consumes
//! End-of-RIB markers and finally either sweeps paths the returning peer did
//! not refresh or deletes everything the peer left behind.

pub mod clock;
pub mod close;
pub mod error;
pub mod log;
pub mod membership;
pub mod peer;
pub mod rib;
pub mod types;

#[cfg(test)]
#[macro_use]
extern crate lazy_static;


#[cfg(test)]
mod proptest;
