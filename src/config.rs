use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::server::{ServerOptions, DEFAULT_OUTBOUND_CAPACITY};

/// Real-time chat server with presence.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Config {
    /// Address to bind to
    #[clap(short = 'H', long, env = "LOBBY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,
    /// Port to listen on
    #[clap(short, long, env = "LOBBY_PORT", default_value = "2052")]
    pub port: u16,
    /// Directory served for every path that is not /api or /ws
    #[clap(long, env = "LOBBY_STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,
    /// PEM certificate; TLS is enabled when both cert and key load
    #[clap(long, env = "LOBBY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key
    #[clap(long, env = "LOBBY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
    /// Messages buffered per connection before it is dropped as too slow
    #[clap(long, env = "LOBBY_OUTBOUND_QUEUE", default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_queue: usize,
    /// Only accept joins from connections carrying a login cookie
    #[clap(long, env = "LOBBY_REQUIRE_AUTH")]
    pub require_auth: bool,
    /// Login session lifetime in seconds
    #[clap(long, env = "LOBBY_SESSION_TTL", default_value = "86400")]
    pub session_ttl: u64,
    /// Mark the session cookie Secure
    #[clap(long, env = "LOBBY_SECURE_COOKIES")]
    pub secure_cookies: bool,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            outbound_capacity: self.outbound_queue.max(1),
            require_auth: self.require_auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["lobby"]).unwrap();
        assert_eq!(config.addr().port(), 2052);
        assert!(config.tls_paths().is_none());
        assert_eq!(config.session_ttl(), Duration::from_secs(86400));
        assert!(!config.server_options().require_auth);
    }

    #[test]
    fn tls_needs_both_files() {
        let config = Config::try_parse_from(["lobby", "--tls-cert", "cert.pem"]).unwrap();
        assert!(config.tls_paths().is_none());

        let args = ["lobby", "--tls-cert", "cert.pem", "--tls-key", "key.pem"];
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(
            config.tls_paths(),
            Some((Path::new("cert.pem"), Path::new("key.pem")))
        );
    }

    #[test]
    fn queue_capacity_is_never_zero() {
        let args = ["lobby", "--outbound-queue", "0", "--require-auth"];
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.server_options().outbound_capacity, 1);
        assert!(config.server_options().require_auth);
    }
}
