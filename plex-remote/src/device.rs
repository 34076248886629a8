//! Devices, their connections and capability roles.
//!
//! A [`Device`] describes a player or media server as advertised in a
//! `<Device>` resource element: identity, access token and the list of
//! [`Connection`]s it can be reached on. Its [`DeviceRole`] is resolved once
//! from the `provides` attribute and never changes afterwards.

use http_client::{HttpClient, HttpResponse, Method};
use xmltree::{Element, XMLNode};

use crate::error::DeviceError;
use crate::identity::{header_pairs, Headers, TOKEN_HEADER};

/// What a device provides, resolved from its `provides` capability list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    None,
    Server,
    Player,
    ServerAndPlayer,
}

impl DeviceRole {
    /// Resolve a comma-separated capability list such as `"server,player"`.
    ///
    /// Unknown capabilities are ignored.
    pub fn from_provides(provides: &str) -> Self {
        let mut server = false;
        let mut player = false;
        for capability in provides.split(',').map(str::trim) {
            match capability {
                "server" => server = true,
                "player" => player = true,
                _ => {}
            }
        }
        match (server, player) {
            (true, true) => DeviceRole::ServerAndPlayer,
            (true, false) => DeviceRole::Server,
            (false, true) => DeviceRole::Player,
            (false, false) => DeviceRole::None,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, DeviceRole::Server | DeviceRole::ServerAndPlayer)
    }

    pub fn is_player(&self) -> bool {
        matches!(self, DeviceRole::Player | DeviceRole::ServerAndPlayer)
    }
}

/// One way of reaching a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// `http` or `https`
    pub protocol: String,
    pub address: String,
    pub port: u16,
    /// Full URI as advertised, used when HTTPS is required
    pub uri: String,
    pub local: bool,
}

impl Connection {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        let protocol = protocol.into();
        let address = address.into();
        let uri = format!("{protocol}://{address}:{port}");
        Self {
            protocol,
            address,
            port,
            uri,
            local: true,
        }
    }

    /// Build a connection from a base URL such as `http://10.0.0.5:32400`.
    pub fn from_url(raw: &str) -> Option<Self> {
        let parsed = url::Url::parse(raw).ok()?;
        let address = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        let mut connection = Self::new(parsed.scheme(), address, port);
        connection.uri = raw.trim_end_matches('/').to_string();
        Some(connection)
    }

    /// Parse a `<Connection>` element.
    pub fn from_element(element: &Element) -> Option<Self> {
        let attr = |name: &str| element.attributes.get(name).cloned();

        let protocol = attr("protocol").unwrap_or_else(|| "http".to_string());
        let address = attr("address")?;
        let port = attr("port")?.parse().ok()?;
        let uri = attr("uri").unwrap_or_else(|| format!("{protocol}://{address}:{port}"));
        let local = attr("local").map(|v| v == "1").unwrap_or(false);

        Some(Self {
            protocol,
            address,
            port,
            uri,
            local,
        })
    }

    /// Base URL for requests. Secure connections use the advertised URI.
    pub fn base_url(&self, secure: bool) -> String {
        if secure {
            self.uri.clone()
        } else {
            format!("http://{}:{}", self.address, self.port)
        }
    }

    /// Probe the connection with the device token.
    pub fn test(&self, http: &HttpClient, token: Option<&str>, secure: bool) -> bool {
        let headers: Vec<(String, String)> = token
            .map(|t| vec![(TOKEN_HEADER.to_string(), t.to_string())])
            .unwrap_or_default();

        match http.send(Method::Get, &self.base_url(secure), &headers, &[]) {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::debug!(uri = %self.uri, error = %e, "connection probe failed");
                false
            }
        }
    }
}

/// A player or server
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub product: String,
    /// Unique identifier of the device
    pub client_identifier: String,
    pub access_token: Option<String>,
    pub https_required: bool,
    pub owned: bool,
    pub presence: bool,
    role: DeviceRole,
    connections: Vec<Connection>,
    active: Option<Connection>,
}

impl Device {
    /// Describe a device by hand, without any connections.
    pub fn new(
        name: impl Into<String>,
        client_identifier: impl Into<String>,
        role: DeviceRole,
    ) -> Self {
        Self {
            name: name.into(),
            product: String::new(),
            client_identifier: client_identifier.into(),
            access_token: None,
            https_required: false,
            owned: false,
            presence: true,
            role,
            connections: Vec::new(),
            active: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    /// Use `connection` without probing it.
    pub fn with_active_connection(mut self, connection: Connection) -> Self {
        if !self.connections.contains(&connection) {
            self.connections.push(connection.clone());
        }
        self.active = Some(connection);
        self
    }

    /// Parse a `<Device>` resource element and its `<Connection>` children.
    pub fn from_element(element: &Element) -> Result<Self, DeviceError> {
        let attr = |name: &str| element.attributes.get(name).cloned();
        let flag = |name: &str| attr(name).map(|v| v == "1").unwrap_or(false);

        let client_identifier = attr("clientIdentifier").ok_or_else(|| {
            DeviceError::Malformed("Device element without clientIdentifier".to_string())
        })?;

        let connections = element
            .children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(child) if child.name == "Connection" => {
                    Connection::from_element(child)
                }
                _ => None,
            })
            .collect();

        Ok(Self {
            name: attr("name").unwrap_or_default(),
            product: attr("product").unwrap_or_default(),
            client_identifier,
            access_token: attr("accessToken"),
            https_required: flag("httpsRequired"),
            owned: flag("owned"),
            presence: flag("presence"),
            role: DeviceRole::from_provides(&attr("provides").unwrap_or_default()),
            connections,
            active: None,
        })
    }

    /// Parse every `<Device>` in a resources `<MediaContainer>` document.
    pub fn parse_resources(xml: &str) -> Result<Vec<Self>, DeviceError> {
        let root = Element::parse(xml.as_bytes())
            .map_err(|e| DeviceError::Malformed(e.to_string()))?;

        root.children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(child) if child.name == "Device" => Some(Self::from_element(child)),
                _ => None,
            })
            .collect()
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn active_connection(&self) -> Option<&Connection> {
        self.active.as_ref()
    }

    /// Probe each connection in order and keep the first that answers.
    pub fn connect(&mut self, http: &HttpClient) -> Result<&Connection, DeviceError> {
        let token = self.access_token.as_deref();
        let secure = self.https_required;

        self.active = self
            .connections
            .iter()
            .find(|conn| conn.test(http, token, secure))
            .cloned();

        match &self.active {
            Some(conn) => {
                tracing::debug!(device = %self.name, uri = %conn.uri, "connected");
                Ok(conn)
            }
            None => Err(DeviceError::NoReachableConnection {
                name: self.name.clone(),
                count: self.connections.len(),
            }),
        }
    }

    /// `X-Plex-Token` for this device, if it has one.
    pub fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        if let Some(token) = &self.access_token {
            headers.insert(TOKEN_HEADER.to_string(), token.clone());
        }
        headers
    }

    /// Base URL of the active connection.
    pub fn base_url(&self) -> Result<String, DeviceError> {
        self.active
            .as_ref()
            .map(|conn| conn.base_url(self.https_required))
            .ok_or_else(|| DeviceError::NoActiveConnection(self.name.clone()))
    }

    /// Send a request to `endpoint` on the active connection.
    ///
    /// The device token is added unless `headers` already carries one.
    pub fn request(
        &self,
        http: &HttpClient,
        method: Method,
        endpoint: &str,
        headers: &Headers,
        params: &[(String, String)],
    ) -> Result<HttpResponse, DeviceError> {
        let url = format!("{}{}", self.base_url()?, endpoint);

        let mut headers = headers.clone();
        if !headers.contains_key(TOKEN_HEADER) {
            headers.extend(self.headers());
        }

        tracing::debug!(device = %self.name, %method, %url, "request");

        let response = http
            .send(method, &url, &header_pairs(&headers), params)
            .map_err(|source| {
                tracing::error!(device = %self.name, error = %source, "error connecting");
                DeviceError::Http {
                    name: self.name.clone(),
                    source,
                }
            })?;

        tracing::debug!(device = %self.name, status = response.status, "response");
        Ok(response)
    }
}
