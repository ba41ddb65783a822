use crate::{
    share::{bufs_to_str, create_udp_socket, parse_i32_lossy, split_bufs},
    Conf, Result, StatErr,
};
use serde::Serialize;
use std::net::UdpSocket;

const MAGIC_BYTES: [u8; 2] = [0xFE, 0xFD];
/// Client chosen session id echoed by the server in every response.
const SESSION_ID: [u8; 4] = [0x01, 0x02, 0x03, 0x04];
const PADDING_BYTES: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
/// Type byte plus session id.
const RESPONSE_HEADER_LEN: usize = 5;
/// "splitnum\0" followed by two bytes of padding.
const STAT_PREFIX_LEN: usize = 11;
const PLAYER_SECTION: &[u8] = b"\x00\x00\x01player_\x00\x00";
/// Trailing NUL pair closing the player list.
const PLAYER_SECTION_END_LEN: usize = 2;
const MAX_DATAGRAM_LEN: usize = 65_535;
const DEFAULT_SOFTWARE: &str = "Vanilla";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketType {
    Handshake,
    Stat,
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        match packet_type {
            PacketType::Handshake => 0x09,
            PacketType::Stat => 0x00,
        }
    }
}

/// Where the two step exchange currently stands.
enum QueryStage {
    Challenge,
    Status { token: [u8; 4] },
}

/// Keys of the full-stat block that are kept. Everything else is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoKey {
    HostName,
    GameType,
    Version,
    Plugins,
    Map,
    Players,
    MaxPlayers,
    HostPort,
    HostIp,
}

impl InfoKey {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "hostname" => Some(Self::HostName),
            "gametype" => Some(Self::GameType),
            "version" => Some(Self::Version),
            "plugins" => Some(Self::Plugins),
            "map" => Some(Self::Map),
            "numplayers" => Some(Self::Players),
            "maxplayers" => Some(Self::MaxPlayers),
            "hostport" => Some(Self::HostPort),
            "hostip" => Some(Self::HostIp),
            _ => None,
        }
    }
}

/// Server info returned by a [full stat](https://wiki.vg/Query#Full_stat) request.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// MOTD.
    pub hostname: String,
    /// Always `SMP` on vanilla servers.
    pub game_type: String,
    pub version: String,
    /// Server software, the part of the plugin string before `": "`.
    /// `Vanilla` when no plugin string is sent.
    pub software: String,
    /// Individual plugin descriptors, e.g. `WorldEdit 7.2.15`.
    pub plugins: Vec<String>,
    /// Plugin string as sent by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_plugins: Option<String>,
    pub map: String,
    pub players: i32,
    pub max_players: i32,
    pub host_port: i32,
    pub host_ip: String,
}

impl std::fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

/// UT3/GameSpot [Query](https://wiki.vg/Query) client.
///
/// [QueryClient::connect] runs the whole challenge and full-stat exchange and
/// keeps the result until the next successful call.
#[derive(Debug, Default)]
pub struct QueryClient {
    socket: Option<UdpSocket>,
    info: Option<ServerInfo>,
    players: Option<Vec<String>>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query `host:port` with a timeout in whole seconds.
    ///
    /// A negative timeout is a [StatErr::InvalidArgument]; 0 disables it.
    pub fn connect_to(&mut self, host: &str, port: u16, timeout_secs: i64) -> Result<()> {
        let conf = Conf::create_with_port(host, port).with_timeout_secs(timeout_secs)?;

        self.connect(&conf)
    }

    /// Run the challenge handshake and the full-stat request against `conf`.
    ///
    /// The socket is closed before returning, on success and on failure.
    pub fn connect(&mut self, conf: &Conf) -> Result<()> {
        self.close();

        let socket = self.socket.insert(create_udp_socket(conf)?);
        let result = run_query(socket);

        self.close();

        let (info, players) = result.map_err(|err| {
            tracing::debug!(target_addr = %conf, error = %err, "query failed");
            err
        })?;

        tracing::debug!(
            target_addr = %conf,
            players = players.len(),
            software = %info.software,
            "query finished"
        );
        self.info = Some(info);
        self.players = Some(players);

        Ok(())
    }

    /// Info of the last successful query, `None` before the first one.
    pub fn get_info(&self) -> Option<&ServerInfo> {
        self.info.as_ref()
    }

    /// Players of the last successful query, `None` before the first one.
    pub fn get_players(&self) -> Option<&[String]> {
        self.players.as_deref()
    }

    /// Release the socket. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::trace!("query socket closed");
        }
    }
}

impl Drop for QueryClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_query(socket: &UdpSocket) -> Result<(ServerInfo, Vec<String>)> {
    let mut stage = QueryStage::Challenge;

    loop {
        stage = match stage {
            QueryStage::Challenge => {
                let payload = write_data(socket, PacketType::Handshake, &[])?;
                let token = parse_challenge_token(&payload)?;

                tracing::debug!(token = i32::from_be_bytes(token), "query challenge received");
                QueryStage::Status { token }
            }
            QueryStage::Status { token } => {
                let payload = write_data(socket, PacketType::Stat, &[token, PADDING_BYTES].concat())?;

                return parse_full_stat(&payload);
            }
        };
    }
}

fn build_request(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let type_byte: u8 = packet_type.into();

    [
        MAGIC_BYTES.as_slice(),
        &[type_byte],
        SESSION_ID.as_slice(),
        payload,
    ]
    .concat()
}

/// Send one request and return the response payload behind the 5 byte header.
fn write_data(socket: &UdpSocket, packet_type: PacketType, payload: &[u8]) -> Result<Vec<u8>> {
    let request = build_request(packet_type, payload);
    let written = socket.send(&request)?;

    if written != request.len() {
        return Err(StatErr::ProtocolErr(format!(
            "Failed to write on socket, {} of {} bytes sent",
            written,
            request.len()
        )));
    }

    let mut bufs = vec![0u8; MAX_DATAGRAM_LEN];
    let len = socket.recv(&mut bufs)?;

    tracing::trace!(?packet_type, len, "query response received");
    check_response(&bufs[..len], packet_type).map(<[u8]>::to_vec)
}

fn check_response(bufs: &[u8], packet_type: PacketType) -> Result<&[u8]> {
    if bufs.len() < RESPONSE_HEADER_LEN {
        return Err(StatErr::ProtocolErr(format!(
            "Query response too short, expected at least {} bytes, but got {}",
            RESPONSE_HEADER_LEN,
            bufs.len()
        )));
    }

    let expected: u8 = packet_type.into();

    if bufs[0] != expected {
        return Err(StatErr::ProtocolErr(format!(
            "Query response type mismatch, expected 0x{:02X}, but got 0x{:02X}",
            expected, bufs[0]
        )));
    }

    Ok(&bufs[RESPONSE_HEADER_LEN..])
}

/// The challenge comes back as a NUL terminated decimal string and is
/// echoed as a big-endian int32.
fn parse_challenge_token(payload: &[u8]) -> Result<[u8; 4]> {
    let token_str = bufs_to_str(payload);
    let token_str = token_str.trim_end_matches('\0').trim();

    match token_str.parse::<i64>() {
        Ok(token) => Ok((token as i32).to_be_bytes()),
        Err(_) => Err(StatErr::ProtocolErr(format!(
            "Failed to receive challenge, got: {:?}",
            token_str
        ))),
    }
}

fn parse_full_stat(payload: &[u8]) -> Result<(ServerInfo, Vec<String>)> {
    if payload.len() < STAT_PREFIX_LEN {
        return Err(StatErr::ProtocolErr("Failed to receive status.".into()));
    }

    let sections = split_bufs(&payload[STAT_PREFIX_LEN..], PLAYER_SECTION);

    if sections.len() != 2 {
        return Err(StatErr::ProtocolErr(format!(
            "Failed to parse server's response, expected 2 sections, but got {}",
            sections.len()
        )));
    }

    let info = parse_info_section(sections[0])?;
    let player_section = &sections[1][..sections[1].len().saturating_sub(PLAYER_SECTION_END_LEN)];
    let players = if player_section.is_empty() {
        Vec::new()
    } else {
        split_bufs(player_section, b"\x00")
            .into_iter()
            .map(bufs_to_str)
            .collect()
    };

    Ok((info, players))
}

fn parse_info_section(section: &[u8]) -> Result<ServerInfo> {
    let mut info = ServerInfo::default();
    let mut players = None;
    let mut max_players = None;
    let mut host_port = None;
    let mut plugins = String::new();

    for pair in split_bufs(section, b"\x00").chunks(2) {
        let key = match InfoKey::from_key(&bufs_to_str(pair[0])) {
            Some(key) => key,
            None => continue,
        };
        let value = pair.get(1).map(|v| bufs_to_str(v)).unwrap_or_default();

        match key {
            InfoKey::HostName => info.hostname = value,
            InfoKey::GameType => info.game_type = value,
            InfoKey::Version => info.version = value,
            InfoKey::Plugins => plugins = value,
            InfoKey::Map => info.map = value,
            InfoKey::Players => players = Some(value),
            InfoKey::MaxPlayers => max_players = Some(value),
            InfoKey::HostPort => host_port = Some(value),
            InfoKey::HostIp => info.host_ip = value,
        }
    }

    let require = |value: Option<String>, key: &str| -> Result<i32> {
        match value {
            Some(v) => Ok(parse_i32_lossy(&v)),
            None => Err(StatErr::ProtocolErr(format!(
                "Query response is missing the {} key",
                key
            ))),
        }
    };

    info.players = require(players, "numplayers")?;
    info.max_players = require(max_players, "maxplayers")?;
    info.host_port = require(host_port, "hostport")?;

    // Plugin format: [SERVER_MOD_NAME[: PLUGIN_NAME(; PLUGIN_NAME...)]]
    if plugins.is_empty() {
        info.software = DEFAULT_SOFTWARE.into();
    } else {
        let mut parts = plugins.splitn(2, ": ");

        info.software = parts.next().unwrap_or_default().into();
        if let Some(list) = parts.next() {
            info.plugins = list.split("; ").map(String::from).collect();
        }
        info.raw_plugins = Some(plugins);
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_payload(kv: &[(&str, &str)], players: &[&str]) -> Vec<u8> {
        let mut bufs = b"splitnum\x00\x80\x00".to_vec();

        for (k, v) in kv {
            bufs.extend_from_slice(k.as_bytes());
            bufs.push(0);
            bufs.extend_from_slice(v.as_bytes());
            bufs.push(0);
        }
        bufs.extend_from_slice(b"\x00\x01player_\x00\x00");
        for p in players {
            bufs.extend_from_slice(p.as_bytes());
            bufs.push(0);
        }
        bufs.push(0);
        bufs
    }

    fn vanilla_kv(plugins: &str) -> Vec<(&str, &str)> {
        vec![
            ("hostname", "A Minecraft Server"),
            ("gametype", "SMP"),
            ("game_id", "MINECRAFT"),
            ("version", "1.20.4"),
            ("plugins", plugins),
            ("map", "world"),
            ("numplayers", "2"),
            ("maxplayers", "20"),
            ("hostport", "25565"),
            ("hostip", "127.0.0.1"),
        ]
    }

    #[test]
    fn request_layout() {
        assert_eq!(
            build_request(PacketType::Handshake, &[]),
            vec![0xFE, 0xFD, 0x09, 0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(
            build_request(PacketType::Stat, &[0x00, 0x91, 0x29, 0x3B, 0, 0, 0, 0]),
            vec![0xFE, 0xFD, 0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x91, 0x29, 0x3B, 0, 0, 0, 0]
        );
    }

    #[test]
    fn response_type_must_match() {
        let bufs = [0x00, 0x01, 0x02, 0x03, 0x04, b'1', 0x00];

        assert!(matches!(
            check_response(&bufs, PacketType::Handshake),
            Err(StatErr::ProtocolErr(_))
        ));
        assert_eq!(check_response(&bufs, PacketType::Stat).unwrap(), &[b'1', 0x00]);
    }

    #[test]
    fn response_too_short() {
        assert!(matches!(
            check_response(&[0x09, 0x01, 0x02, 0x03], PacketType::Handshake),
            Err(StatErr::ProtocolErr(_))
        ));
    }

    #[test]
    fn challenge_token() {
        assert_eq!(parse_challenge_token(b"9513307\x00").unwrap(), [0x00, 0x91, 0x29, 0x5B]);
        assert_eq!(parse_challenge_token(b"-1\x00").unwrap(), [0xFF; 4]);
        assert!(matches!(parse_challenge_token(b"\x00"), Err(StatErr::ProtocolErr(_))));
        assert!(matches!(parse_challenge_token(b"abc\x00"), Err(StatErr::ProtocolErr(_))));
    }

    #[test]
    fn vanilla_full_stat() {
        let payload = stat_payload(&vanilla_kv(""), &["Notch", "jeb_"]);
        let (info, players) = parse_full_stat(&payload).unwrap();

        assert_eq!(info.hostname, "A Minecraft Server");
        assert_eq!(info.game_type, "SMP");
        assert_eq!(info.version, "1.20.4");
        assert_eq!(info.software, "Vanilla");
        assert!(info.plugins.is_empty());
        assert!(info.raw_plugins.is_none());
        assert_eq!(info.map, "world");
        assert_eq!(info.players, 2);
        assert_eq!(info.max_players, 20);
        assert_eq!(info.host_port, 25565);
        assert_eq!(info.host_ip, "127.0.0.1");
        assert_eq!(players, vec!["Notch", "jeb_"]);
    }

    #[test]
    fn plugin_string_is_split() {
        let raw = "Paper on 1.20.4: WorldEdit 7.2.15; EssentialsX 2.20.1";
        let payload = stat_payload(&vanilla_kv(raw), &[]);
        let (info, players) = parse_full_stat(&payload).unwrap();

        assert_eq!(info.software, "Paper on 1.20.4");
        assert_eq!(info.plugins, vec!["WorldEdit 7.2.15", "EssentialsX 2.20.1"]);
        assert_eq!(info.raw_plugins.as_deref(), Some(raw));
        assert!(players.is_empty());
    }

    #[test]
    fn plugin_string_without_list() {
        let payload = stat_payload(&vanilla_kv("CraftBukkit"), &[]);
        let (info, _) = parse_full_stat(&payload).unwrap();

        assert_eq!(info.software, "CraftBukkit");
        assert!(info.plugins.is_empty());
        assert_eq!(info.raw_plugins.as_deref(), Some("CraftBukkit"));
    }

    #[test]
    fn permissive_values() {
        let mut kv = vanilla_kv("");
        kv[6] = ("numplayers", "lots");
        kv.push(("whatever", "ignored"));
        let (info, _) = parse_full_stat(&stat_payload(&kv, &[])).unwrap();

        assert_eq!(info.players, 0);
        assert_eq!(info.host_ip, "127.0.0.1");
    }

    #[test]
    fn oversized_counts_saturate() {
        let mut kv = vanilla_kv("");
        kv[6] = ("numplayers", "4294967297");
        kv[7] = ("maxplayers", "3000000000");
        let (info, _) = parse_full_stat(&stat_payload(&kv, &[])).unwrap();

        assert_eq!(info.players, i32::MAX);
        assert_eq!(info.max_players, i32::MAX);
    }

    #[test]
    fn missing_required_key() {
        let kv = vanilla_kv("")
            .into_iter()
            .filter(|(k, _)| *k != "maxplayers")
            .collect::<Vec<_>>();

        assert!(matches!(
            parse_full_stat(&stat_payload(&kv, &[])),
            Err(StatErr::ProtocolErr(_))
        ));
    }

    #[test]
    fn missing_player_section() {
        let mut payload = b"splitnum\x00\x80\x00".to_vec();
        payload.extend_from_slice(b"hostname\x00A\x00\x00");

        assert!(matches!(parse_full_stat(&payload), Err(StatErr::ProtocolErr(_))));
        assert!(matches!(parse_full_stat(b"short"), Err(StatErr::ProtocolErr(_))));
    }

    #[test]
    fn latin1_motd() {
        let mut kv = vanilla_kv("");
        kv.remove(0);
        let mut payload = stat_payload(&kv, &[]);
        // Insert a raw Latin-1 "§a" hostname right after the prefix.
        let mut hostname = b"hostname\x00\xA7aHi\x00".to_vec();
        let tail = payload.split_off(STAT_PREFIX_LEN);

        payload.append(&mut hostname);
        payload.extend_from_slice(&tail);

        let (info, _) = parse_full_stat(&payload).unwrap();

        assert_eq!(info.hostname, "§aHi");
    }

    #[test]
    fn accessors_before_query() {
        let mut client = QueryClient::new();

        assert!(client.get_info().is_none());
        assert!(client.get_players().is_none());
        client.close();
        client.close();
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let mut client = QueryClient::new();

        assert!(matches!(
            client.connect_to("127.0.0.1", 25565, -3),
            Err(StatErr::InvalidArgument(_))
        ));
    }
}
