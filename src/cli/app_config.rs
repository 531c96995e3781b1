use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// The request url,like http://www.google.com
    pub url: String,
    ///  Specify request method to use
    #[arg(short = 'X', long = "request", value_name = "method", default_value = "GET")]
    pub method: String,
    /// HTTP request body.
    #[arg(short = 'd', long = "data", value_name = "data")]
    pub body_option: Option<String>,
    /// The http headers, like "Accept: text/html".
    #[arg(short = 'H', long = "header", value_name = "name: value")]
    pub headers: Vec<String>,
    ///  Send User-Agent <name> to server
    #[arg(short = 'A', long = "user-agent", value_name = "name")]
    pub user_agent_option: Option<String>,
    /// The pem path.
    #[arg(short = 'c', long = "cacert", value_name = "file")]
    pub certificate_path_option: Option<PathBuf>,
    /// Allow insecure server connections
    #[arg(short = 'k', long = "insecure")]
    pub skip_certificate_validate: bool,
    /// Maximum number of redirects to follow
    #[arg(long = "max-redirects", value_name = "num", default_value_t = 5)]
    pub max_redirects: usize,
    /// Maximum time in seconds for the whole request
    #[arg(long = "timeout", value_name = "seconds", default_value_t = 10.0)]
    pub timeout: f64,
    /// Maximum time in seconds for each TCP connect
    #[arg(long = "connect-timeout", value_name = "seconds", default_value_t = 5.0)]
    pub connect_timeout: f64,
    /// Maximum time in seconds for each TLS handshake
    #[arg(long = "tls-timeout", value_name = "seconds", default_value_t = 5.0)]
    pub tls_timeout: f64,
    /// Reuse connections between hops to the same host
    #[arg(long = "keep-alive")]
    pub keep_alive: bool,
    /// Ignore proxy environment variables
    #[arg(long = "noproxy")]
    pub noproxy: bool,
    /// Report format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
    ///  Make the operation more talkative
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["reqstat", "http://example.com"]).unwrap();
        assert_eq!(cli.method, "GET");
        assert_eq!(cli.max_redirects, 5);
        assert_eq!(cli.timeout, 10.0);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(!cli.keep_alive);
        assert_eq!(cli.verbosity, 0);
    }

    #[test]
    fn flags() {
        let cli = Cli::try_parse_from([
            "reqstat",
            "-X",
            "POST",
            "-d",
            "a=1",
            "-H",
            "Accept: text/html",
            "-H",
            "X-Probe: 1",
            "-k",
            "--max-redirects",
            "2",
            "-f",
            "text",
            "-vv",
            "https://example.com",
        ])
        .unwrap();
        assert_eq!(cli.method, "POST");
        assert_eq!(cli.body_option.as_deref(), Some("a=1"));
        assert_eq!(cli.headers.len(), 2);
        assert!(cli.skip_certificate_validate);
        assert_eq!(cli.max_redirects, 2);
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.verbosity, 2);
    }
}
