use crate::timing::ms;
use http::HeaderMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Timing and size report for one logical request.
///
/// Durations serialize as integer nanoseconds. `traces` holds one entry per
/// hop and is left out when the request needed a single connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub status: u16,
    pub tls: bool,
    #[serde(serialize_with = "nanos")]
    pub time_tls: Duration,
    #[serde(serialize_with = "nanos")]
    pub time_dns: Duration,
    pub header: BTreeMap<String, Vec<String>>,
    pub header_size: usize,
    pub body_size: u64,
    #[serde(serialize_with = "nanos")]
    pub time_wait: Duration,
    #[serde(serialize_with = "nanos")]
    pub time_response: Duration,
    #[serde(serialize_with = "nanos")]
    pub time_connect: Duration,
    #[serde(serialize_with = "nanos")]
    pub time_first_byte: Duration,
    pub redirects: usize,
    #[serde(serialize_with = "nanos")]
    pub time_redirects: Duration,
    #[serde(serialize_with = "nanos")]
    pub time_total: Duration,
    #[serde(serialize_with = "nanos")]
    pub time_download: Duration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<Stats>,
}

fn nanos<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

/// Size of the header block in `Name: value\r\n` wire form.
pub fn header_wire_size(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + 2 + value.len() + 2)
        .sum()
}

/// Header set keyed by canonical name (`content-type` → `Content-Type`),
/// values in arrival order.
pub fn header_record(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut record: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        record
            .entry(canonical_header_name(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    record
}

pub fn canonical_header_name(name: &str) -> String {
    let mut canonical = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            canonical.push(c.to_ascii_uppercase());
        } else {
            canonical.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    canonical
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status:            {}", self.status)?;
        writeln!(f, "Header size:       {:>10} bytes", self.header_size)?;
        writeln!(f, "Body size:         {:>10} bytes", self.body_size)?;
        writeln!(f, "Redirects:         {:>10}", self.redirects)?;
        writeln!(f, "\nTime breakdown:")?;
        write_breakdown(f, self)?;
        writeln!(f, "  Redirects:       {:>10.3} ms", ms(self.time_redirects))?;

        for (i, hop) in self.traces.iter().enumerate() {
            writeln!(f, "\nHop {}:", i + 1)?;
            write_breakdown(f, hop)?;
        }
        Ok(())
    }
}

fn write_breakdown(f: &mut fmt::Formatter<'_>, stats: &Stats) -> fmt::Result {
    writeln!(f, "  DNS lookup:      {:>10.3} ms", ms(stats.time_dns))?;
    writeln!(f, "  TCP connect:     {:>10.3} ms", ms(stats.time_connect))?;
    if stats.tls {
        writeln!(f, "  TLS handshake:   {:>10.3} ms", ms(stats.time_tls))?;
    } else {
        writeln!(f, "  TLS handshake:   N/A")?;
    }
    writeln!(f, "  Server wait:     {:>10.3} ms", ms(stats.time_wait))?;
    writeln!(f, "  First byte:      {:>10.3} ms", ms(stats.time_first_byte))?;
    writeln!(f, "  Download:        {:>10.3} ms", ms(stats.time_download))?;
    writeln!(f, "  Total time:      {:>10.3} ms", ms(stats.time_total))
}
