use crate::cli::app_config::{Cli, OutputFormat};
use bytes::Bytes;
use clap::Parser;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::HeaderMap;
use reqstat::{Client, ClientConfig, ProxyPolicy, Stats};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub async fn main_with_error() -> Result<(), anyhow::Error> {
    let cli: Cli = Cli::parse();

    do_request(cli).await
}

async fn do_request(cli: Cli) -> Result<(), anyhow::Error> {
    let log_level = match cli.verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy()
        .add_directive("rustls=warn".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_max_level(log_level)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = Client::new(client_config(&cli)?)?;
    let mut headers = parse_headers(&cli.headers)?;
    if let Some(user_agent) = cli.user_agent_option.as_deref() {
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    }
    let body = cli.body_option.clone().map(Bytes::from);

    let response = client
        .request(&cli.method, &cli.url, Some(&headers), body)
        .await?;
    for (i, trace) in response.traces().iter().enumerate() {
        debug!("Hop {}: {}", i + 1, trace);
    }

    render(&response.stats(), cli.format)
}

fn client_config(cli: &Cli) -> Result<ClientConfig, anyhow::Error> {
    let seconds = |value: f64, flag: &str| {
        Duration::try_from_secs_f64(value).map_err(|e| anyhow!("invalid {}: {}", flag, e))
    };
    Ok(ClientConfig {
        timeout: seconds(cli.timeout, "--timeout")?,
        connect_timeout: seconds(cli.connect_timeout, "--connect-timeout")?,
        tls_handshake_timeout: seconds(cli.tls_timeout, "--tls-timeout")?,
        max_redirects: cli.max_redirects,
        keep_alive: cli.keep_alive,
        proxy: if cli.noproxy {
            ProxyPolicy::None
        } else {
            ProxyPolicy::FromEnv
        },
        insecure: cli.skip_certificate_validate,
        ca_file: cli.certificate_path_option.clone(),
        ..ClientConfig::default()
    })
}

/// Parses `Name: value` lines. Repeated names keep every value in order.
pub fn parse_headers(lines: &[String]) -> Result<HeaderMap, anyhow::Error> {
    let mut header_map = HeaderMap::new();
    for x in lines {
        let split: Vec<&str> = x.splitn(2, ':').collect();
        if split.len() == 2 {
            header_map.append(
                HeaderName::from_str(split[0].trim())?,
                HeaderValue::from_str(split[1].trim())?,
            );
        } else {
            return Err(anyhow!("header error: '{}'", x));
        }
    }
    Ok(header_map)
}

fn render(stats: &Stats, format: OutputFormat) -> Result<(), anyhow::Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stats)?),
        OutputFormat::Text => print!("{}", stats),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lines() {
        let headers = parse_headers(&[
            "Accept: text/html".to_string(),
            "X-Probe:1".to_string(),
            "X-Probe: 2".to_string(),
        ])
        .unwrap();
        assert_eq!(headers["accept"], "text/html");
        let probes: Vec<_> = headers.get_all("x-probe").iter().collect();
        assert_eq!(probes, vec!["1", "2"]);
    }

    #[test]
    fn malformed_header_line() {
        let err = parse_headers(&["no-colon-here".to_string()]).unwrap_err();
        assert!(err.to_string().contains("header error"));
    }

    #[test]
    fn cli_maps_to_client_config() {
        let cli = Cli::try_parse_from([
            "reqstat",
            "--timeout",
            "2.5",
            "--keep-alive",
            "--noproxy",
            "--max-redirects",
            "1",
            "http://example.com",
        ])
        .unwrap();
        let config = client_config(&cli).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert!(config.keep_alive);
        assert_eq!(config.proxy, ProxyPolicy::None);
        assert_eq!(config.max_redirects, 1);
    }

    #[test]
    fn huge_timeout_is_accepted() {
        let cli = Cli::try_parse_from(["reqstat", "--timeout", "1e19", "http://example.com"]).unwrap();
        let config = client_config(&cli).unwrap();
        assert!(config.timeout > Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["reqstat", "--timeout=-1", "http://example.com"]).unwrap();
        assert!(client_config(&cli).is_err());
    }
}
