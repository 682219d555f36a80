use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub allowed_origins: Vec<String>,
}

pub struct RealtimeConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:3001,http://localhost:3002";

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "4000".to_string())
                    .parse()
                    .expect("Invalid SERVER_PORT"),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    tracing::warn!("JWT_SECRET not set, using development secret");
                    "codepair-dev-secret".to_string()
                }),
                token_ttl_secs: env::var("TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .expect("Invalid TOKEN_TTL_SECS"),
                allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_ORIGINS.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            realtime: RealtimeConfig {
                heartbeat_interval: Duration::from_secs(
                    env::var("HEARTBEAT_INTERVAL_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .expect("Invalid HEARTBEAT_INTERVAL_SECS"),
                ),
                client_timeout: Duration::from_secs(
                    env::var("CLIENT_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "60".to_string())
                        .parse()
                        .expect("Invalid CLIENT_TIMEOUT_SECS"),
                ),
            },
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(host: &str, port: u16) -> Config {
        Config {
            server: ServerConfig {
                host: host.to_string(),
                port,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
                token_ttl_secs: 3600,
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            realtime: RealtimeConfig {
                heartbeat_interval: Duration::from_secs(30),
                client_timeout: Duration::from_secs(60),
            },
        }
    }

    #[test]
    fn test_parse_localhost() {
        let config = test_config("localhost", 4000);
        assert_eq!(config.bind_address(), ([127, 0, 0, 1], 4000));
    }

    #[test]
    fn test_parse_ipv4_address() {
        let config = test_config("192.168.1.1", 3000);
        assert_eq!(config.bind_address(), ([192, 168, 1, 1], 3000));
    }

    #[test]
    fn test_parse_all_interfaces() {
        let config = test_config("0.0.0.0", 4000);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 4000));
    }

    #[test]
    fn test_parse_invalid_hostname_defaults_to_all() {
        let config = test_config("invalid-hostname", 9000);
        assert_eq!(config.bind_address(), ([0, 0, 0, 0], 9000));
    }

    #[test]
    fn test_default_origins_parse() {
        let origins: Vec<String> = DEFAULT_ORIGINS
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
        assert_eq!(origins.len(), 3);
        assert!(origins.contains(&"http://localhost:3000".to_string()));
    }
}
