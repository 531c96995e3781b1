pub mod cert_verifier;
pub mod config;

pub use config::build_tls_config;
