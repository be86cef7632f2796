use std::net::{IpAddr, ToSocketAddrs};

use crate::error::{Error, Result};

/// A deployment target. Sessions may only be opened against a resolved host.
#[derive(Debug, Clone)]
pub struct Host {
    hostname: String,
    addr: Option<IpAddr>,
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Host {
            hostname: hostname.into(),
            addr: None,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_resolved(&self) -> bool {
        self.addr.is_some()
    }

    /// Resolve the hostname via DNS. An unresolvable target host is a fatal
    /// configuration error and must be caught before any remote mutation.
    pub fn resolve(&mut self) -> Result<IpAddr> {
        if self.hostname.is_empty() {
            return Err(Error::config("target hostname is not configured"));
        }

        let mut addrs = (self.hostname.as_str(), 22)
            .to_socket_addrs()
            .map_err(|e| {
                Error::config(format!("hostname '{}' does not resolve: {}", self.hostname, e))
            })?;

        match addrs.next() {
            Some(addr) => {
                self.addr = Some(addr.ip());
                Ok(addr.ip())
            }
            None => Err(Error::config(format!(
                "hostname '{}' does not resolve to any address",
                self.hostname
            ))),
        }
    }
}
