// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::types::{path_flags, Community, Prefix};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// The attribute bundle shared by the paths that carry it. The close manager
/// never computes attributes, it only needs to look for the communities that
/// change LLGR handling and to hand existing attributes back to the table
/// input process unmodified.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PathAttrs {
    pub communities: Vec<Community>,
}

impl PathAttrs {
    pub fn has_community(&self, c: Community) -> bool {
        self.communities.contains(&c)
    }
}

/// A RIB-In path learned from the peer being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub flags: u32,
    pub attrs: Option<Arc<PathAttrs>>,
    pub path_id: u32,
    pub label: u32,
}

impl Path {
    pub fn new(attrs: Arc<PathAttrs>, path_id: u32, label: u32) -> Self {
        Self {
            flags: 0,
            attrs: Some(attrs),
            path_id,
            label,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.flags & path_flags::STALE != 0
    }

    pub fn is_llgr_stale(&self) -> bool {
        self.flags & path_flags::LLGR_STALE != 0
    }

    pub fn set_stale(&mut self) {
        self.flags |= path_flags::STALE;
    }

    pub fn set_llgr_stale(&mut self) {
        self.flags |= path_flags::LLGR_STALE;
    }

    pub fn reset_stale(&mut self) {
        self.flags &= !path_flags::STALE;
    }

    pub fn reset_llgr_stale(&mut self) {
        self.flags &= !path_flags::LLGR_STALE;
    }
}

/// What to do with a path, as decided by the close manager's per-path
/// callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RibOperation {
    /// Re-add the path with the attributes and flags carried in the request.
    AddChange,

    /// Remove the path from the table.
    Delete,
}

/// One unit of work for a table's input process. Deletes carry no
/// attributes; add/change requests carry the path's existing attributes with
/// the stale flag bits merged in.
#[derive(Debug, Clone)]
pub struct RibRequest {
    pub prefix: Prefix,
    pub operation: RibOperation,
    pub attrs: Option<Arc<PathAttrs>>,
    pub path_id: u32,
    pub flags: u32,
    pub label: u32,
}

/// The input side of a RIB table. Implemented by the table layer; requests
/// are processed on the table's own task context with the originating peer
/// recorded as the source of the change.
pub trait RibTable: Send + Sync {
    fn input(&self, peer: IpAddr, request: RibRequest);
}
