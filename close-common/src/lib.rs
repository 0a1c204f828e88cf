// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

/// Render a restart window for log output.
///
/// Windows are human-scale, from the zero-delay context hop up through the
/// multi-minute LLGR range, so at most two units are printed:
/// "10m 0s", "1m 30s", "5s 250ms", "250ms", "0ms".
pub fn format_window(d: Duration) -> String {
    let secs = d.as_secs();
    let millis = d.subsec_millis();
    let minutes = secs / 60;
    let seconds = secs % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else if seconds > 0 && millis > 0 {
        format!("{}s {}ms", seconds, millis)
    } else if seconds > 0 {
        format!("{}s", seconds)
    } else {
        format!("{}ms", millis)
    }
}

/// Take a mutex, treating a poisoned lock as fatal. A thread that panicked
/// while holding shared state leaves that state unrecoverable, so the only
/// sane option is to propagate the panic.
#[macro_export]
macro_rules! lock {
    ($mtx:expr) => {
        $mtx.lock().expect("poisoned lock")
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn window_formatting() {
        assert_eq!(format_window(Duration::ZERO), "0ms");
        assert_eq!(format_window(Duration::from_millis(250)), "250ms");
        assert_eq!(format_window(Duration::from_millis(5_250)), "5s 250ms");
        assert_eq!(format_window(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_window(Duration::from_secs(600)), "10m 0s");
    }
}
