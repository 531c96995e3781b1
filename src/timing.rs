use crate::response::stats::Stats;
use std::fmt;
use std::time::{Duration, Instant};

/// Timestamps collected for one hop of a request.
///
/// A `None` stamp means the phase never happened on this connection (no DNS
/// lookup for an IP literal, no handshake over plain http, nothing at all on
/// a reused connection). Durations touching an unset stamp are zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Trace {
    pub address: String,
    pub start: Option<Instant>,
    pub tls: bool,
    pub tls_start: Option<Instant>,
    pub tls_end: Option<Instant>,
    pub dns_start: Option<Instant>,
    pub dns_end: Option<Instant>,
    pub tcp_start: Option<Instant>,
    pub tcp_end: Option<Instant>,
    pub request_written: Option<Instant>,
    pub first_byte: Option<Instant>,
}

pub(crate) static EMPTY_TRACE: Trace = Trace {
    address: String::new(),
    start: None,
    tls: false,
    tls_start: None,
    tls_end: None,
    dns_start: None,
    dns_end: None,
    tcp_start: None,
    tcp_end: None,
    request_written: None,
    first_byte: None,
};

pub(crate) fn span(from: Option<Instant>, to: Option<Instant>) -> Duration {
    match (from, to) {
        (Some(from), Some(to)) => to.saturating_duration_since(from),
        _ => Duration::ZERO,
    }
}

impl Trace {
    pub fn new(address: impl Into<String>, start: Instant) -> Self {
        Self {
            address: address.into(),
            start: Some(start),
            ..Self::default()
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn start(&self) -> Option<Instant> {
        self.start
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn time_tls(&self) -> Duration {
        if !self.tls {
            return Duration::ZERO;
        }
        span(self.tls_start, self.tls_end)
    }

    pub fn time_dns(&self) -> Duration {
        span(self.dns_start, self.dns_end)
    }

    pub fn time_connect(&self) -> Duration {
        span(self.tcp_start, self.tcp_end)
    }

    /// Server wait: request fully written until the first response byte.
    pub fn time_wait(&self) -> Duration {
        span(self.request_written, self.first_byte)
    }

    pub fn time_first_byte(&self) -> Duration {
        span(self.start, self.first_byte)
    }

    pub fn time_response(&self, now: Instant) -> Duration {
        span(self.request_written, Some(now))
    }

    pub fn time_total(&self, now: Instant) -> Duration {
        span(self.start, Some(now))
    }

    pub fn time_download(&self, now: Instant) -> Duration {
        span(self.first_byte, Some(now))
    }

    pub fn stats(&self) -> Stats {
        self.stats_at(Instant::now())
    }

    /// Per-hop breakdown. Response-level fields (status, headers, sizes)
    /// stay empty.
    pub fn stats_at(&self, now: Instant) -> Stats {
        Stats {
            tls: self.tls(),
            time_tls: self.time_tls(),
            time_dns: self.time_dns(),
            time_wait: self.time_wait(),
            time_response: self.time_response(now),
            time_connect: self.time_connect(),
            time_first_byte: self.time_first_byte(),
            time_total: self.time_total(now),
            time_download: self.time_download(now),
            ..Stats::default()
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Connection {}:", self.address)?;
        writeln!(f, "  DNS lookup:      {:>10.3} ms", ms(self.time_dns()))?;
        writeln!(f, "  TCP connect:     {:>10.3} ms", ms(self.time_connect()))?;
        if self.tls {
            writeln!(f, "  TLS handshake:   {:>10.3} ms", ms(self.time_tls()))?;
        } else {
            writeln!(f, "  TLS handshake:   N/A")?;
        }
        writeln!(f, "  Server wait:     {:>10.3} ms", ms(self.time_wait()))?;
        Ok(())
    }
}

pub(crate) fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
