use std::net::SocketAddr;
use std::time::Instant;

/// Connection lifecycle events emitted by the client while it works on a
/// request. Events of one connection are delivered in order and never
/// interleave with another connection's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// The client starts acquiring a connection to `address` (`host:port`).
    ConnectionRequested { address: String },
    /// A connection is ready to carry the request. `reused` is set when it
    /// came from the idle list without any new dial or handshake.
    ConnectionEstablished { reused: bool },
    DnsStart { host: String },
    DnsDone { error: Option<String> },
    ConnectStart { addr: SocketAddr },
    ConnectDone {
        addr: SocketAddr,
        error: Option<String>,
    },
    TlsStart,
    TlsDone { error: Option<String> },
    /// The request head and body were flushed to the connection.
    RequestWritten,
    FirstResponseByte,
}

/// Receives the events of a single logical request.
///
/// The emitter stamps every event, so a listener that defers processing
/// still sees the original timing.
pub trait TraceListener: Send + Sync {
    fn on_event(&self, at: Instant, event: TraceEvent);

    fn record(&self, event: TraceEvent) {
        self.on_event(Instant::now(), event);
    }
}
