//! OCPP subprotocol negotiation
//!
//! During the WebSocket handshake the charge point advertises the
//! subprotocols it speaks in `Sec-WebSocket-Protocol`. The negotiator picks
//! the first configured one the client offers.

/// Configured subprotocols in preference order. Empty accepts every client.
#[derive(Debug, Clone)]
pub struct SubprotocolNegotiator {
    supported: Vec<String>,
}

/// Result of one negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Echo this token back in the handshake response.
    Selected(String),
    /// Accept without a subprotocol header.
    NoneOffered,
    /// The client offered only tokens we do not speak; accepted anyway.
    Unsupported,
}

impl SubprotocolNegotiator {
    pub fn new(supported: Vec<String>) -> Self {
        Self { supported }
    }

    pub fn accepts_all(&self) -> bool {
        self.supported.is_empty()
    }

    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    /// Negotiate against a raw `Sec-WebSocket-Protocol` header value.
    pub fn negotiate(&self, requested: &str) -> Negotiation {
        let offered: Vec<&str> = requested
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if offered.is_empty() {
            return Negotiation::NoneOffered;
        }
        if self.accepts_all() {
            return Negotiation::Selected(offered[0].to_string());
        }

        self.supported
            .iter()
            .find(|s| offered.iter().any(|p| p.eq_ignore_ascii_case(s)))
            .map(|s| Negotiation::Selected(s.clone()))
            .unwrap_or(Negotiation::Unsupported)
    }
}
