use std::{
    env,
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tokio_util::codec::LengthDelimitedCodec;

use crate::{errors::RpcError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME_LENGTH, DEFAULT_TIMEOUT};

pub const DEFAULT_REGISTRY_PORT: u16 = 1211;
pub const DEFAULT_SERVICE_PORT: u16 = 12172;
pub const DEFAULT_SERVICE_NAME: &str = "CalculatorService";

pub const REGISTRY_ADDR_ENV: &str = "CALCNET_REGISTRY_ADDR";
pub const SERVICE_ADDR_ENV: &str = "CALCNET_SERVICE_ADDR";
pub const SERVICE_NAME_ENV: &str = "CALCNET_SERVICE_NAME";
pub const CALL_TIMEOUT_ENV: &str = "CALCNET_CALL_TIMEOUT_MS";

/// Transport settings shared by servers and clients.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub bind_address: String,

    /// Upper bound on waiting for a response.
    pub call_timeout: Duration,

    pub connect_timeout: Duration,

    pub max_frame_length: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:0")
    }
}

impl RpcConfig {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            call_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    pub(crate) fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.max_frame_length)
            .new_codec()
    }
}

/// Where the calculator is published and served.
///
/// Passed to [`crate::host::ServiceHost::start`] and used to build the
/// [`Endpoint`]s clients connect through. Port `0` binds an ephemeral port.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub registry_addr: SocketAddr,
    pub service_addr: SocketAddr,
    pub service_name: String,
    pub rpc: RpcConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self::new(
            SocketAddr::new(localhost, DEFAULT_REGISTRY_PORT),
            SocketAddr::new(localhost, DEFAULT_SERVICE_PORT),
            DEFAULT_SERVICE_NAME,
        )
    }
}

impl ServiceConfig {
    pub fn new(
        registry_addr: SocketAddr,
        service_addr: SocketAddr,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            registry_addr,
            service_addr,
            service_name: service_name.into(),
            rpc: RpcConfig::default(),
        }
    }

    /// Loopback addresses on OS-assigned ports.
    pub fn ephemeral() -> Self {
        let any_port = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        Self::new(any_port, any_port, DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_rpc_config(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    /// Defaults overridden by the `CALCNET_*` environment variables.
    pub fn from_env() -> Result<Self, RpcError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RpcError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(REGISTRY_ADDR_ENV) {
            config.registry_addr = parse_addr(REGISTRY_ADDR_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SERVICE_ADDR_ENV) {
            config.service_addr = parse_addr(SERVICE_ADDR_ENV, &raw)?;
        }
        if let Some(name) = lookup(SERVICE_NAME_ENV) {
            config.service_name = name.trim().to_string();
        }
        if let Some(raw) = lookup(CALL_TIMEOUT_ENV) {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                RpcError::ConfigError(format!("{CALL_TIMEOUT_ENV}={raw}: {e}"))
            })?;
            config.rpc.call_timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RpcError> {
        if self.service_name.is_empty() {
            return Err(RpcError::ConfigError("Service name must not be empty".into()));
        }
        if self.service_name.contains('/') {
            return Err(RpcError::ConfigError(format!(
                "Service name must not contain '/': {}",
                self.service_name
            )));
        }
        if self.registry_addr.port() != 0 && self.registry_addr == self.service_addr {
            return Err(RpcError::ConfigError(format!(
                "Registry and service must use distinct ports, both set to {}",
                self.registry_addr
            )));
        }
        if self.rpc.call_timeout.is_zero() {
            return Err(RpcError::ConfigError("Call timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn registry_endpoint(&self) -> Endpoint {
        Endpoint::registry(self.registry_addr, self.service_name.clone())
    }

    pub fn direct_endpoint(&self) -> Endpoint {
        Endpoint::direct(self.service_addr)
    }
}

fn parse_addr(key: &str, raw: &str) -> Result<SocketAddr, RpcError> {
    raw.trim()
        .parse()
        .map_err(|e| RpcError::ConfigError(format!("{key}={raw}: {e}")))
}

/// How a client reaches the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Resolve `name` through the registry at `registry_addr` first.
    Registry {
        registry_addr: SocketAddr,
        name: String,
    },
    /// Connect straight to the service.
    Direct { addr: SocketAddr },
}

impl Endpoint {
    pub fn registry(registry_addr: SocketAddr, name: impl Into<String>) -> Self {
        Endpoint::Registry {
            registry_addr,
            name: name.into(),
        }
    }

    pub fn direct(addr: SocketAddr) -> Self {
        Endpoint::Direct { addr }
    }

    /// The first address a client contacts.
    pub fn contact_addr(&self) -> SocketAddr {
        match self {
            Endpoint::Registry { registry_addr, .. } => *registry_addr,
            Endpoint::Direct { addr } => *addr,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Registry {
                registry_addr,
                name,
            } => write!(f, "registry://{registry_addr}/{name}"),
            Endpoint::Direct { addr } => write!(f, "direct://{addr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointParseError {
    #[error("missing '<scheme>://' prefix")]
    MissingScheme,

    #[error("unknown scheme '{0}', expected 'registry' or 'direct'")]
    UnknownScheme(String),

    #[error("registry endpoint needs a service name after the address")]
    MissingName,

    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    /// Parses `registry://<ip>:<port>/<name>` or `direct://<ip>:<port>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .trim()
            .split_once("://")
            .ok_or(EndpointParseError::MissingScheme)?;

        match scheme {
            "registry" => {
                let (addr, name) = rest
                    .split_once('/')
                    .ok_or(EndpointParseError::MissingName)?;
                if name.is_empty() {
                    return Err(EndpointParseError::MissingName);
                }
                Ok(Endpoint::registry(parse_endpoint_addr(addr)?, name))
            }
            "direct" => {
                // The service name after the address is optional here.
                let addr = rest.split('/').next().unwrap_or(rest);
                Ok(Endpoint::direct(parse_endpoint_addr(addr)?))
            }
            other => Err(EndpointParseError::UnknownScheme(other.to_string())),
        }
    }
}

fn parse_endpoint_addr(raw: &str) -> Result<SocketAddr, EndpointParseError> {
    raw.parse()
        .map_err(|_| EndpointParseError::InvalidAddress(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_uses_well_known_ports() {
        let config = ServiceConfig::default();
        assert_eq!(config.registry_addr.port(), 1211);
        assert_eq!(config.service_addr.port(), 12172);
        assert_eq!(config.service_name, "CalculatorService");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoints_follow_the_config() {
        let config = ServiceConfig::default();
        assert_eq!(
            config.registry_endpoint().to_string(),
            "registry://127.0.0.1:1211/CalculatorService"
        );
        assert_eq!(config.direct_endpoint().to_string(), "direct://127.0.0.1:12172");
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            (REGISTRY_ADDR_ENV, "0.0.0.0:2000"),
            (SERVICE_ADDR_ENV, "0.0.0.0:2001"),
            (SERVICE_NAME_ENV, " Adder "),
            (CALL_TIMEOUT_ENV, "250"),
        ]))
        .unwrap();

        assert_eq!(config.registry_addr, "0.0.0.0:2000".parse().unwrap());
        assert_eq!(config.service_addr, "0.0.0.0:2001".parse().unwrap());
        assert_eq!(config.service_name, "Adder");
        assert_eq!(config.rpc.call_timeout, Duration::from_millis(250));
    }

    #[test]
    fn env_rejects_bad_values() {
        let bad_addr = ServiceConfig::from_lookup(lookup_from(&[(REGISTRY_ADDR_ENV, "nope")]));
        assert!(matches!(bad_addr, Err(RpcError::ConfigError(_))));

        let bad_timeout = ServiceConfig::from_lookup(lookup_from(&[(CALL_TIMEOUT_ENV, "soon")]));
        assert!(matches!(bad_timeout, Err(RpcError::ConfigError(_))));

        let zero_timeout = ServiceConfig::from_lookup(lookup_from(&[(CALL_TIMEOUT_ENV, "0")]));
        assert!(matches!(zero_timeout, Err(RpcError::ConfigError(_))));
    }

    #[test]
    fn validate_rejects_shared_port_and_empty_name() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let shared = ServiceConfig::new(addr, addr, "Calc");
        assert!(shared.validate().is_err());

        let unnamed = ServiceConfig::ephemeral().with_service_name("");
        assert!(unnamed.validate().is_err());

        // Two ephemeral ports are fine: the OS hands out different ones.
        assert!(ServiceConfig::ephemeral().validate().is_ok());
    }

    #[test]
    fn endpoint_parses_registry_url() {
        let endpoint: Endpoint = "registry://127.0.0.1:1211/CalculatorService".parse().unwrap();
        assert_eq!(
            endpoint,
            Endpoint::registry("127.0.0.1:1211".parse().unwrap(), "CalculatorService")
        );
        assert_eq!(endpoint.contact_addr().port(), 1211);
    }

    #[test]
    fn endpoint_parses_direct_url_with_or_without_name() {
        let expected = Endpoint::direct("[::1]:12172".parse().unwrap());
        assert_eq!("direct://[::1]:12172".parse::<Endpoint>().unwrap(), expected);
        assert_eq!(
            "direct://[::1]:12172/CalculatorService".parse::<Endpoint>().unwrap(),
            expected
        );
    }

    #[test]
    fn endpoint_parse_errors() {
        assert_eq!(
            "127.0.0.1:1211".parse::<Endpoint>(),
            Err(EndpointParseError::MissingScheme)
        );
        assert_eq!(
            "rmi://127.0.0.1:1211/Calc".parse::<Endpoint>(),
            Err(EndpointParseError::UnknownScheme("rmi".into()))
        );
        assert_eq!(
            "registry://127.0.0.1:1211".parse::<Endpoint>(),
            Err(EndpointParseError::MissingName)
        );
        assert_eq!(
            "registry://127.0.0.1:1211/".parse::<Endpoint>(),
            Err(EndpointParseError::MissingName)
        );
        assert_eq!(
            "direct://localhost:1".parse::<Endpoint>(),
            Err(EndpointParseError::InvalidAddress("localhost:1".into()))
        );
    }
}
