use crate::response::stats::{header_record, header_wire_size, Stats};
use crate::timing::{span, Trace, EMPTY_TRACE};
use http::{HeaderMap, StatusCode};
use std::time::{Duration, Instant};

/// A completed request: final status and headers, the drained body size and
/// the hop traces.
///
/// Connection-level timings are read from the last hop. `now`-relative
/// timings (`time_total`, `time_response`, `time_download`) keep growing
/// across calls; the rest are fixed once the request is done.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    header: HeaderMap,
    header_size: usize,
    body_size: u64,
    traces: Vec<Trace>,
}

impl Response {
    pub fn new(status: StatusCode, header: HeaderMap, body_size: u64, traces: Vec<Trace>) -> Self {
        let header_size = header_wire_size(&header);
        Self {
            status,
            header,
            header_size,
            body_size,
            traces,
        }
    }

    fn last(&self) -> &Trace {
        self.traces.last().unwrap_or(&EMPTY_TRACE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self) -> &HeaderMap {
        &self.header
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn tls(&self) -> bool {
        self.last().tls()
    }

    pub fn time_tls(&self) -> Duration {
        self.last().time_tls()
    }

    pub fn time_dns(&self) -> Duration {
        self.last().time_dns()
    }

    pub fn time_connect(&self) -> Duration {
        self.last().time_connect()
    }

    pub fn time_wait(&self) -> Duration {
        self.last().time_wait()
    }

    pub fn time_first_byte(&self) -> Duration {
        self.last().time_first_byte()
    }

    pub fn time_response(&self, now: Instant) -> Duration {
        self.last().time_response(now)
    }

    pub fn time_total(&self, now: Instant) -> Duration {
        self.last().time_total(now)
    }

    pub fn time_download(&self, now: Instant) -> Duration {
        self.last().time_download(now)
    }

    pub fn redirects(&self) -> usize {
        self.traces.len().saturating_sub(1)
    }

    /// Time between the first and the last hop starting.
    pub fn time_redirects(&self) -> Duration {
        match self.traces.as_slice() {
            [first, .., last] => span(first.start, last.start),
            _ => Duration::ZERO,
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> Stats {
        let traces = if self.traces.len() > 1 {
            self.traces.iter().map(|t| t.stats_at(now)).collect()
        } else {
            Vec::new()
        };

        Stats {
            status: self.status.as_u16(),
            tls: self.tls(),
            time_tls: self.time_tls(),
            time_dns: self.time_dns(),
            header: header_record(&self.header),
            header_size: self.header_size,
            body_size: self.body_size,
            time_wait: self.time_wait(),
            time_response: self.time_response(now),
            time_connect: self.time_connect(),
            time_first_byte: self.time_first_byte(),
            redirects: self.redirects(),
            time_redirects: self.time_redirects(),
            time_total: self.time_total(now),
            time_download: self.time_download(now),
            traces,
        }
    }
}
