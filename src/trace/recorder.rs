use super::event::{TraceEvent, TraceListener};
use crate::timing::Trace;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Builds the ordered hop list of one logical request from its events.
///
/// A trace is opened on `ConnectionRequested` and becomes visible in the list
/// on `ConnectionEstablished`. Events after establishment (request written,
/// first byte) land on the last listed trace.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    state: Mutex<RecorderState>,
}

#[derive(Debug, Default)]
struct RecorderState {
    pending: Option<Trace>,
    traces: Vec<Trace>,
}

impl RecorderState {
    fn current_mut(&mut self) -> Option<&mut Trace> {
        match self.pending.as_mut() {
            Some(trace) => Some(trace),
            None => self.traces.last_mut(),
        }
    }
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn traces(&self) -> Vec<Trace> {
        self.lock().traces.clone()
    }

    pub fn into_traces(self) -> Vec<Trace> {
        self.state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .traces
    }

    pub fn len(&self) -> usize {
        self.lock().traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceListener for TraceRecorder {
    fn on_event(&self, at: Instant, event: TraceEvent) {
        let mut state = self.lock();
        match event {
            TraceEvent::ConnectionRequested { address } => {
                state.pending = Some(Trace::new(address, at));
            }
            TraceEvent::ConnectionEstablished { reused } => {
                let pending = state.pending.take();
                let trace = match pending {
                    // The candidate opened for a pooled connection says
                    // nothing about this hop; start over from here.
                    Some(candidate) if reused => Trace::new(candidate.address, at),
                    Some(candidate) => candidate,
                    None => Trace::new(String::new(), at),
                };
                state.traces.push(trace);
            }
            event => match state.current_mut() {
                Some(trace) => apply(trace, at, event),
                None => trace!("no open connection for {:?}", event),
            },
        }
    }
}

fn apply(trace: &mut Trace, at: Instant, event: TraceEvent) {
    match event {
        TraceEvent::DnsStart { .. } => trace.dns_start = Some(at),
        TraceEvent::DnsDone { .. } => trace.dns_end = Some(at),
        TraceEvent::ConnectStart { .. } => trace.tcp_start = Some(at),
        TraceEvent::ConnectDone { .. } => trace.tcp_end = Some(at),
        TraceEvent::TlsStart => {
            trace.tls = true;
            trace.tls_start = Some(at);
        }
        TraceEvent::TlsDone { .. } => trace.tls_end = Some(at),
        TraceEvent::RequestWritten => trace.request_written = Some(at),
        TraceEvent::FirstResponseByte => trace.first_byte = Some(at),
        TraceEvent::ConnectionRequested { .. } | TraceEvent::ConnectionEstablished { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    struct Clock(Instant);

    impl Clock {
        fn at(&self, millis: u64) -> Instant {
            self.0 + Duration::from_millis(millis)
        }
    }

    fn addr() -> SocketAddr {
        "93.184.216.34:443".parse().unwrap()
    }

    fn fresh_hop(recorder: &TraceRecorder, clock: &Clock, base: u64, tls: bool) {
        let events = [
            (0, TraceEvent::ConnectionRequested { address: "example.com:443".into() }),
            (1, TraceEvent::DnsStart { host: "example.com".into() }),
            (3, TraceEvent::DnsDone { error: None }),
            (3, TraceEvent::ConnectStart { addr: addr() }),
            (8, TraceEvent::ConnectDone { addr: addr(), error: None }),
        ];
        for (offset, event) in events {
            recorder.on_event(clock.at(base + offset), event);
        }
        if tls {
            recorder.on_event(clock.at(base + 8), TraceEvent::TlsStart);
            recorder.on_event(clock.at(base + 20), TraceEvent::TlsDone { error: None });
        }
        recorder.on_event(clock.at(base + 20), TraceEvent::ConnectionEstablished { reused: false });
        recorder.on_event(clock.at(base + 21), TraceEvent::RequestWritten);
        recorder.on_event(clock.at(base + 40), TraceEvent::FirstResponseByte);
    }

    #[test]
    fn single_fresh_connection() {
        let clock = Clock(Instant::now());
        let recorder = TraceRecorder::new();
        fresh_hop(&recorder, &clock, 0, true);

        let traces = recorder.into_traces();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.address, "example.com:443");
        assert_eq!(trace.start, Some(clock.at(0)));
        assert!(trace.tls);
        assert_eq!(trace.time_dns(), Duration::from_millis(2));
        assert_eq!(trace.time_connect(), Duration::from_millis(5));
        assert_eq!(trace.time_tls(), Duration::from_millis(12));
        assert_eq!(trace.time_wait(), Duration::from_millis(19));
    }

    #[test]
    fn one_trace_per_established_connection_in_order() {
        let clock = Clock(Instant::now());
        let recorder = TraceRecorder::new();
        fresh_hop(&recorder, &clock, 0, false);
        fresh_hop(&recorder, &clock, 100, false);
        fresh_hop(&recorder, &clock, 200, true);

        let traces = recorder.traces();
        assert_eq!(traces.len(), 3);
        assert_eq!(traces[0].start, Some(clock.at(0)));
        assert_eq!(traces[1].start, Some(clock.at(100)));
        assert_eq!(traces[2].start, Some(clock.at(200)));
        assert!(!traces[0].tls);
        assert!(traces[2].tls);
    }

    #[test]
    fn requested_without_established_is_not_listed() {
        let clock = Clock(Instant::now());
        let recorder = TraceRecorder::new();
        recorder.on_event(
            clock.at(0),
            TraceEvent::ConnectionRequested { address: "nowhere.invalid:80".into() },
        );
        recorder.on_event(clock.at(1), TraceEvent::DnsStart { host: "nowhere.invalid".into() });
        recorder.on_event(
            clock.at(2),
            TraceEvent::DnsDone { error: Some("no such host".into()) },
        );
        assert!(recorder.is_empty());
    }

    #[test]
    fn reused_connection_starts_fresh_trace() {
        let clock = Clock(Instant::now());
        let recorder = TraceRecorder::new();
        recorder.on_event(
            clock.at(0),
            TraceEvent::ConnectionRequested { address: "127.0.0.1:8080".into() },
        );
        recorder.on_event(clock.at(2), TraceEvent::ConnectionEstablished { reused: true });
        recorder.on_event(clock.at(3), TraceEvent::RequestWritten);
        recorder.on_event(clock.at(9), TraceEvent::FirstResponseByte);

        let traces = recorder.into_traces();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.address, "127.0.0.1:8080");
        assert_eq!(trace.start, Some(clock.at(2)));
        assert_eq!(trace.time_dns(), Duration::ZERO);
        assert_eq!(trace.time_connect(), Duration::ZERO);
        assert_eq!(trace.time_tls(), Duration::ZERO);
        assert_eq!(trace.time_wait(), Duration::from_millis(6));
    }

    #[test]
    fn reused_connection_still_takes_late_dial_events() {
        let clock = Clock(Instant::now());
        let recorder = TraceRecorder::new();
        recorder.on_event(
            clock.at(0),
            TraceEvent::ConnectionRequested { address: "example.com:80".into() },
        );
        recorder.on_event(clock.at(1), TraceEvent::ConnectionEstablished { reused: true });
        recorder.on_event(clock.at(2), TraceEvent::DnsStart { host: "example.com".into() });
        recorder.on_event(clock.at(5), TraceEvent::DnsDone { error: None });
        recorder.on_event(clock.at(5), TraceEvent::ConnectStart { addr: addr() });
        recorder.on_event(clock.at(7), TraceEvent::ConnectDone { addr: addr(), error: None });

        let traces = recorder.into_traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].start, Some(clock.at(1)));
        assert_eq!(traces[0].time_dns(), Duration::from_millis(3));
        assert_eq!(traces[0].time_connect(), Duration::from_millis(2));
    }

    #[test]
    fn last_connect_attempt_wins() {
        let clock = Clock(Instant::now());
        let recorder = TraceRecorder::new();
        let refused: SocketAddr = "[::1]:80".parse().unwrap();
        recorder.on_event(clock.at(0), TraceEvent::ConnectionRequested { address: "localhost:80".into() });
        recorder.on_event(clock.at(1), TraceEvent::ConnectStart { addr: refused });
        recorder.on_event(
            clock.at(2),
            TraceEvent::ConnectDone { addr: refused, error: Some("connection refused".into()) },
        );
        recorder.on_event(clock.at(2), TraceEvent::ConnectStart { addr: addr() });
        recorder.on_event(clock.at(6), TraceEvent::ConnectDone { addr: addr(), error: None });
        recorder.on_event(clock.at(6), TraceEvent::ConnectionEstablished { reused: false });

        let traces = recorder.into_traces();
        assert_eq!(traces[0].time_connect(), Duration::from_millis(4));
    }

    #[test]
    fn events_without_open_connection_are_ignored() {
        let recorder = TraceRecorder::new();
        recorder.record(TraceEvent::TlsStart);
        recorder.record(TraceEvent::FirstResponseByte);
        assert!(recorder.is_empty());
    }
}
