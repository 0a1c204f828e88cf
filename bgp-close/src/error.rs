// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use num_enum::TryFromPrimitiveError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid prefix {0}")]
    InvalidPrefix(String),

    #[error("address family identifier error")]
    Afi(#[from] TryFromPrimitiveError<crate::types::Afi>),

    #[error("subsequent address family identifier error")]
    Safi(#[from] TryFromPrimitiveError<crate::types::Safi>),

    #[error("unsupported address family afi={afi} safi={safi}")]
    UnsupportedFamily { afi: u16, safi: u8 },
}
