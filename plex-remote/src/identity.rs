//! Controller identity and protocol header names.

use std::collections::BTreeMap;

use uuid::Uuid;

pub const CLIENT_IDENTIFIER_HEADER: &str = "X-Plex-Client-Identifier";
pub const DEVICE_NAME_HEADER: &str = "X-Plex-Device-Name";
pub const TARGET_CLIENT_IDENTIFIER_HEADER: &str = "X-Plex-Target-Client-Identifier";
pub const TOKEN_HEADER: &str = "X-Plex-Token";
pub const ACCEPT_HEADER: &str = "Accept";

/// Request headers keyed by name.
pub type Headers = BTreeMap<String, String>;

/// Flatten headers into the pair list the transport takes.
pub(crate) fn header_pairs(headers: &Headers) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// How this controller presents itself to players.
///
/// The client identifier is a UUIDv5 in the DNS namespace derived from the
/// display name, so the same name always yields the same identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    client_identifier: String,
    name: String,
    port: u16,
}

impl RemoteIdentity {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        let client_identifier = Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string();
        Self {
            client_identifier,
            name,
            port,
        }
    }

    pub fn client_identifier(&self) -> &str {
        &self.client_identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listener port the controller asked for (0 means OS-assigned).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `X-Plex-Client-Identifier` and `X-Plex-Device-Name` for this remote.
    pub fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(
            CLIENT_IDENTIFIER_HEADER.to_string(),
            self.client_identifier.clone(),
        );
        headers.insert(DEVICE_NAME_HEADER.to_string(), self.name.clone());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_uuid5_of_name() {
        let identity = RemoteIdentity::new("python.org", 8000);
        assert_eq!(
            identity.client_identifier(),
            "886313e1-3b8a-5372-9b90-0c9aee199e5d"
        );
    }

    #[test]
    fn test_identifier_is_stable() {
        let a = RemoteIdentity::new("Living Room Remote", 8000);
        let b = RemoteIdentity::new("Living Room Remote", 9000);
        let c = RemoteIdentity::new("Kitchen Remote", 8000);

        assert_eq!(a.client_identifier(), b.client_identifier());
        assert_ne!(a.client_identifier(), c.client_identifier());
    }

    #[test]
    fn test_headers() {
        let identity = RemoteIdentity::new("Couch", 8000);
        let headers = identity.headers();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[DEVICE_NAME_HEADER], "Couch");
        assert_eq!(headers[CLIENT_IDENTIFIER_HEADER], identity.client_identifier());
        assert_eq!(header_pairs(&headers).len(), 2);
    }
}
