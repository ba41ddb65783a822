mod legacy_server;
mod regular_server;

use crate::{
    share::{create_tcp_socket, parse_i32_lossy},
    Conf, Result, StatErr,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::net::{Shutdown, TcpStream};

/// Status of a Java Edition server, from either the modern or the legacy ping.
///
/// Decoding is lenient: every field is optional, a `null` or mistyped value
/// falls back to its default, unknown keys are ignored and the document as
/// sent by the server is kept in [PingResult::raw].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PingResult {
    /// Server version. Includes version name and protocol number.
    #[serde(deserialize_with = "lenient")]
    pub version: Version,
    /// Online / max players and an optional sample.
    #[serde(deserialize_with = "lenient")]
    pub players: Players,
    /// MOTD. Either a plain string or a chat component, kept as sent.
    pub description: Value,
    /// Server icon as a `data:image/png;base64,` URI.
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(
        rename = "enforcesSecureChat",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub enforces_secure_chat: Option<bool>,
    #[serde(
        rename = "previewsChat",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub previews_chat: Option<bool>,
    /// Forge 1.13+ mod list.
    #[serde(rename = "forgeData", skip_serializing_if = "Option::is_none")]
    pub forge_data: Option<Value>,
    /// FML (pre 1.13) mod list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modinfo: Option<Value>,
    /// Whole status document. For legacy pings this is the decoded kick text.
    #[serde(skip)]
    pub raw: Value,
}

impl PingResult {
    pub fn protocol_version(&self) -> i32 {
        self.version.protocol
    }

    pub fn version_name(&self) -> &str {
        &self.version.name
    }

    pub fn motd(&self) -> &Value {
        &self.description
    }

    pub fn players_online(&self) -> i32 {
        self.players.online
    }

    pub fn players_max(&self) -> i32 {
        self.players.max
    }

    pub fn player_samples(&self) -> Option<&[Player]> {
        self.players.sample.as_deref()
    }

    pub fn favicon(&self) -> Option<&str> {
        self.favicon.as_deref()
    }
}

impl std::fmt::Display for PingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Version {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub protocol: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Players {
    #[serde(deserialize_with = "lenient_i32")]
    pub max: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub online: i32,
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<Player>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Player {
    #[serde(deserialize_with = "lenient")]
    pub name: String,
    #[serde(deserialize_with = "lenient")]
    pub id: String,
}

/// Take any JSON value, keep it only if it has the expected shape.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;

    Ok(T::deserialize(value).unwrap_or_default())
}

/// Numbers are clamped into i32, numeric strings are parsed, anything else is 0.
fn lenient_i32<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(num) => match num.as_i64() {
            Some(n) => i32::try_from(n).unwrap_or(if n < 0 { i32::MIN } else { i32::MAX }),
            // u64 beyond i64, or a float; float to int casts saturate.
            None => num.as_f64().map(|f| f as i32).unwrap_or(i32::MAX),
        },
        Value::String(s) => parse_i32_lossy(&s),
        _ => 0,
    })
}

/// Server List Ping client over one TCP connection.
///
/// The socket is owned exclusively by the client. It is released by
/// [SlpClient::close], on drop, and on every failed exchange.
#[derive(Debug)]
pub struct SlpClient {
    conf: Conf,
    socket: Option<TcpStream>,
}

impl SlpClient {
    /// Create a client for `conf` without opening a socket.
    pub fn new(conf: &Conf) -> Self {
        Self {
            conf: conf.clone(),
            socket: None,
        }
    }

    /// Create a client and open its TCP connection.
    pub fn connect(conf: &Conf) -> Result<Self> {
        let mut client = Self::new(conf);

        client.open()?;

        Ok(client)
    }

    /// Open the TCP connection, replacing any previous one.
    pub fn open(&mut self) -> Result<()> {
        self.close();
        self.socket = Some(create_tcp_socket(&self.conf)?);

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn conf(&self) -> &Conf {
        &self.conf
    }

    /// Modern (1.7+) handshake and status request.
    ///
    /// `Ok(None)` is returned when the server answers with a status packet
    /// too small to hold a status document.
    pub fn query(&mut self) -> Result<Option<PingResult>> {
        let conf = self.conf.clone();

        self.exchange(|socket| regular_server::get_server_status(socket, &conf))
    }

    /// Legacy ping for servers predating 1.7.
    ///
    /// `Ok(None)` is returned when the answer is not a kick packet.
    pub fn query_old_pre17(&mut self) -> Result<Option<PingResult>> {
        self.exchange(legacy_server::get_legacy_server_status)
    }

    /// Release the socket. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            // The peer may already be gone; dropping the stream closes it either way.
            let _ = socket.shutdown(Shutdown::Both);
            tracing::debug!(target_addr = %self.conf, "slp socket closed");
        }
    }

    fn exchange<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TcpStream) -> Result<T>,
    {
        let socket = match self.socket.as_mut() {
            Some(socket) => socket,
            None => {
                return Err(StatErr::ConnectionErr(format!(
                    "Socket to {} is not connected",
                    self.conf
                )));
            }
        };

        let result = f(socket);

        if let Err(err) = &result {
            tracing::debug!(target_addr = %self.conf, error = %err, "slp exchange failed");
            self.close();
        }

        result
    }
}

impl Drop for SlpClient {
    fn drop(&mut self) {
        self.close();
    }
}
