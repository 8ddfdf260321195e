use std::fmt;
use std::net::IpAddr;

/// An IP address and transport port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub ip: IpAddr,
    pub port: u16,
}

impl Address {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

/// Formats as `ip:port`, without brackets for IPv6.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_ipv6_display() {
        let addr = Address::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 5060);
        assert_eq!(addr.to_string(), "::1:5060");
    }
}
