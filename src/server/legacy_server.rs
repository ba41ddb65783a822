use super::{PingResult, Players, Version};
use crate::{
    share::{bufs_to_utf16_str, parse_i32_lossy},
    Result, StatErr,
};
use serde_json::Value;
use std::io::{Read, Write};

const LEGACY_PING: [u8; 2] = [0xFE, 0x01];
const KICK_PACKET_ID: u8 = 0xFF;
/// Packet id plus the u16 string length.
const KICK_HEADER_LEN: usize = 3;
const MAX_RESPONSE_LEN: usize = 512;
/// Version reported by servers that only speak the pre-1.4 dialect.
const PRE_14_VERSION: &str = "1.3";

/// Server [before 1.7](https://wiki.vg/Server_List_Ping#1.6)
pub fn get_legacy_server_status<S: Read + Write>(socket: &mut S) -> Result<Option<PingResult>> {
    let mut bufs = [0u8; MAX_RESPONSE_LEN];

    socket.write_all(&LEGACY_PING)?;
    socket.flush()?;

    let len = socket.read(&mut bufs)?;

    tracing::trace!(len, "legacy ping response read");

    process_legacy_server_bufs(&bufs[..len])
}

/// Decode a kick packet answering the legacy ping.
///
/// Anything that is not a kick packet yields `Ok(None)`.
pub fn process_legacy_server_bufs(bufs: &[u8]) -> Result<Option<PingResult>> {
    if bufs.len() < 4 || bufs[0] != KICK_PACKET_ID {
        tracing::warn!(
            len = bufs.len(),
            first = ?bufs.first(),
            "legacy ping response is not a kick packet, server unavailable"
        );
        return Ok(None);
    }

    let res_str = bufs_to_utf16_str(&bufs[KICK_HEADER_LEN..]);

    parse_kick_message(&res_str).map(Some)
}

fn parse_kick_message(res_str: &str) -> Result<PingResult> {
    // 1.4+ servers start the message with "§1" and separate the fields with NUL:
    //
    // §1, protocol version, server version, MOTD, online players, max players
    if res_str.starts_with("§1") {
        let fields = res_str.split('\0').collect::<Vec<_>>();

        if fields.len() < 6 {
            return Err(StatErr::ProtocolErr(format!(
                "Legacy ping response must hold 6 fields, but got {}",
                fields.len()
            )));
        }

        return Ok(build_legacy_server(
            parse_i32_lossy(fields[1]),
            fields[2],
            fields[3],
            parse_i32_lossy(fields[4]),
            parse_i32_lossy(fields[5]),
            res_str,
        ));
    }

    // Beta 1.8 to 1.3: MOTD§online§max
    let mut fields = res_str.split('§');
    let motd = fields.next().unwrap_or_default();
    let online = fields.next().map(parse_i32_lossy).unwrap_or(0);
    let max = fields.next().map(parse_i32_lossy).unwrap_or(0);

    Ok(build_legacy_server(0, PRE_14_VERSION, motd, online, max, res_str))
}

fn build_legacy_server(
    protocol: i32,
    version: &str,
    motd: &str,
    online: i32,
    max: i32,
    raw: &str,
) -> PingResult {
    PingResult {
        version: Version {
            name: version.into(),
            protocol,
        },
        players: Players {
            max,
            online,
            sample: None,
        },
        description: Value::String(motd.into()),
        raw: Value::String(raw.into()),
        ..Default::default()
    }
}
