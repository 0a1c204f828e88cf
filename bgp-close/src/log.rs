use slog::{Drain, Logger};

/// Structured logger for the close subsystem: bunyan records over an async
/// channel, tagged so close-manager lines are separable in mixed daemon
/// output. Close events are human-scale, so the channel is kept small.
pub fn init_logger() -> Logger {
    let drain = slog_bunyan::new(std::io::stdout()).build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x2000)
        .build()
        .fuse();
    Logger::root(drain, slog::o!("unit" => "close_manager"))
}

/// Log through a close manager with its standing context attached: the peer
/// being closed, the phase the cycle is in, and whether a further close is
/// latched behind it.
macro_rules! close_log {
    ($self:expr, $s:expr, $level:ident, $($body:tt)*) => {
        slog::$level!($self.log, $($body)*;
            "peer" => $self.peer.addr().to_string(),
            "state" => $s.state.to_string(),
            "close_again" => $s.close_again
        )
    };
}

pub(crate) use close_log;
