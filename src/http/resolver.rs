use crate::error::TransportError;
use crate::trace::{TraceEvent, TraceListener};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Resolves `host` for a dial on `port`.
///
/// IP literals are returned as is and produce no DNS events. Names are looked
/// up on the blocking pool through the system resolver.
pub async fn resolve(
    host: &str,
    port: u16,
    listener: &dyn TraceListener,
) -> Result<Vec<SocketAddr>, TransportError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    debug!("Resolving DNS for: {}", host);
    listener.record(TraceEvent::DnsStart {
        host: host.to_string(),
    });

    let lookup_host = host.to_string();
    let lookup = tokio::task::spawn_blocking(move || (lookup_host.as_str(), port).to_socket_addrs())
        .await
        .unwrap_or_else(|join_error| Err(std::io::Error::other(join_error)));

    let addresses: Vec<SocketAddr> = match lookup {
        Ok(addrs) => addrs.collect(),
        Err(source) => {
            listener.record(TraceEvent::DnsDone {
                error: Some(source.to_string()),
            });
            return Err(TransportError::Dns {
                host: host.to_string(),
                source,
            });
        }
    };

    if addresses.is_empty() {
        listener.record(TraceEvent::DnsDone {
            error: Some("no addresses".to_string()),
        });
        return Err(TransportError::NoAddresses(host.to_string()));
    }
    listener.record(TraceEvent::DnsDone { error: None });

    for (i, addr) in addresses.iter().enumerate() {
        if i == 0 {
            debug!("Resolved IP: {}", addr.ip());
        } else {
            trace!("Resolved IP (alternative): {}", addr.ip());
        }
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceRecorder;

    #[tokio::test]
    async fn ip_literal_skips_lookup() {
        let recorder = TraceRecorder::new();
        recorder.record(TraceEvent::ConnectionRequested {
            address: "127.0.0.1:8080".into(),
        });
        let addrs = resolve("127.0.0.1", 8080, &recorder).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);

        recorder.record(TraceEvent::ConnectionEstablished { reused: false });
        let traces = recorder.into_traces();
        assert_eq!(traces[0].dns_start, None);
        assert_eq!(traces[0].dns_end, None);
    }

    #[tokio::test]
    async fn ipv6_literal_skips_lookup() {
        let recorder = TraceRecorder::new();
        let addrs = resolve("::1", 443, &recorder).await.unwrap();
        assert_eq!(addrs, vec!["[::1]:443".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn unknown_name_is_a_dns_error() {
        let recorder = TraceRecorder::new();
        let err = resolve("does-not-exist.invalid", 80, &recorder)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Dns { .. } | TransportError::NoAddresses(_)
        ));
    }
}
