use super::PingResult;
use crate::{
    varint::{encode_varint, read_varint},
    Conf, Result, StatErr,
};
use serde_json::Value;
use std::io::{ErrorKind, Read, Write};

/// Only the status state is requested, so any protocol number is accepted.
const HANDSHAKE_PROTOCOL_VERSION: i32 = 0x04;
const NEXT_STATE_STATUS: i32 = 0x01;
const PACKET_ID: i32 = 0x00;
/// Anything shorter cannot carry a status document.
const MIN_STATUS_PACKET_LEN: i32 = 10;

pub fn get_server_status<S: Read + Write>(socket: &mut S, conf: &Conf) -> Result<Option<PingResult>> {
    let hand_shake_packet = build_handshake_packet(&conf.host, conf.port);
    let status_request_packet = build_status_request_packet();

    socket.write_all(&hand_shake_packet)?;
    socket.write_all(&status_request_packet)?;
    socket.flush()?;
    tracing::debug!(target_addr = %conf, "slp handshake and status request sent");

    read_status_response(socket)
}

/// Build handshake packet buffer.
pub fn build_handshake_packet(host: &str, port: u16) -> Vec<u8> {
    let mut packet = Vec::<u8>::new();
    let mut packet_data = Vec::<u8>::new();
    let server_addr_bytes = host.as_bytes();

    packet_data.append(&mut encode_varint(PACKET_ID));
    packet_data.append(&mut encode_varint(HANDSHAKE_PROTOCOL_VERSION));
    // Server address
    //
    // UTF-8 string prefixed with its size in bytes as a VarInt.
    packet_data.append(&mut encode_varint(server_addr_bytes.len() as i32));
    packet_data.extend_from_slice(server_addr_bytes);
    packet_data.extend_from_slice(&port.to_be_bytes());
    packet_data.append(&mut encode_varint(NEXT_STATE_STATUS));

    // Build [packet](https://wiki.vg/Protocol#Packet_format)
    packet.append(&mut encode_varint(packet_data.len() as i32));
    packet.append(&mut packet_data);

    packet
}

/// Build status request packet buffer.
pub fn build_status_request_packet() -> Vec<u8> {
    let mut packet = Vec::<u8>::new();

    packet.append(&mut encode_varint(1));
    packet.append(&mut encode_varint(PACKET_ID));

    packet
}

fn read_status_response<R: Read>(reader: &mut R) -> Result<Option<PingResult>> {
    let packet_len = read_varint(reader)?;

    if packet_len < MIN_STATUS_PACKET_LEN {
        tracing::warn!(packet_len, "status response too short, server unavailable");
        return Ok(None);
    }

    // Packet id, always 0 for a status response.
    let mut packet_id = [0u8; 1];

    if let Err(err) = reader.read_exact(&mut packet_id) {
        return match err.kind() {
            ErrorKind::UnexpectedEof => Err(StatErr::ProtocolErr(
                "Server closed the connection before the packet id".into(),
            )),
            _ => Err(err.into()),
        };
    }

    let data_len = read_varint(reader)?;
    let mut data_buffer = Vec::new();

    if data_len > 0 {
        Read::by_ref(reader)
            .take(data_len as u64)
            .read_to_end(&mut data_buffer)?;
    }

    tracing::trace!(packet_len, data_len, received = data_buffer.len(), "status response read");

    if data_buffer.is_empty() {
        return Err(StatErr::ProtocolErr("Server didn't return any data".into()));
    }

    parse_status_json(&data_buffer).map(Some)
}

/// Parse a status JSON document into a [PingResult].
pub fn parse_status_json(data: &[u8]) -> Result<PingResult> {
    let raw = serde_json::from_slice::<Value>(data)?;
    let mut result = serde_json::from_value::<PingResult>(raw.clone())?;

    result.raw = raw;

    Ok(result)
}
