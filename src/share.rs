use crate::{Conf, Result, StatErr};
use std::{
    net::{IpAddr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::Duration,
};

fn resolve(conf: &Conf) -> Result<Vec<SocketAddr>> {
    let addrs = conf
        .to_socket_addrs()
        .map_err(|err| StatErr::ConnectionErr(format!("Failed to resolve {}: {}", conf, err)))?
        .collect::<Vec<_>>();

    if addrs.is_empty() {
        return Err(StatErr::ConnectionErr(format!(
            "{} did not resolve to any address",
            conf
        )));
    }

    Ok(addrs)
}

/// Open a TCP stream to `conf` with symmetric read/write timeouts.
pub fn create_tcp_socket(conf: &Conf) -> Result<TcpStream> {
    let timeout = conf.socket_conf.timeout;
    let mut last_err = None;

    for addr in resolve(conf)? {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };

        match attempt {
            Ok(socket) => {
                socket.set_read_timeout(timeout)?;
                socket.set_write_timeout(timeout)?;
                tracing::debug!(%addr, ?timeout, "tcp socket connected");

                return Ok(socket);
            }
            Err(err) => {
                tracing::debug!(%addr, error = %err, "tcp connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(StatErr::ConnectionErr(format!(
        "Failed to connect or create a socket for {}: {}",
        conf,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Open a UDP association with `conf`. No packet is exchanged here.
pub fn create_udp_socket(conf: &Conf) -> Result<UdpSocket> {
    let socket_conf = &conf.socket_conf;
    let target = pick_udp_target(&resolve(conf)?).ok_or_else(|| {
        StatErr::ConnectionErr(format!("{} did not resolve to any address", conf))
    })?;
    // The local address has to match the family of the target.
    let local_ip = match target {
        SocketAddr::V4(_) => IpAddr::V4(socket_conf.rep_udp_ipv4),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };

    let socket = UdpSocket::bind((local_ip, socket_conf.rep_udp_port))
        .map_err(|err| StatErr::ConnectionErr(format!("Could not create socket: {}", err)))?;

    socket
        .connect(target)
        .map_err(|err| StatErr::ConnectionErr(format!("Could not create socket: {}", err)))?;
    socket.set_read_timeout(socket_conf.timeout)?;
    socket.set_write_timeout(socket_conf.timeout)?;
    tracing::debug!(%target, timeout = ?socket_conf.timeout, "udp socket associated");

    Ok(socket)
}

/// First IPv4 address if there is one, the first address otherwise.
///
/// UDP has no connect attempt to fall back on, and `localhost` often
/// resolves to `::1` first while servers listen on IPv4 only.
fn pick_udp_target(addrs: &[SocketAddr]) -> Option<SocketAddr> {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Map a whole-second timeout to what std sockets accept.
///
/// Negative values are rejected, 0 disables the timeout.
pub fn timeout_from_secs(secs: i64) -> Result<Option<Duration>> {
    match secs {
        s if s < 0 => Err(StatErr::InvalidArgument(format!(
            "Timeout must be a non-negative integer, but got: {}",
            s
        ))),
        0 => Ok(None),
        s => Ok(Some(Duration::from_secs(s as u64))),
    }
}

/// Decode UTF-16BE bytes. A dangling odd byte is dropped.
pub fn bufs_to_utf16_str(bufs: &[u8]) -> String {
    String::from_utf16_lossy(
        bufs.chunks_exact(2)
            .map(|x| u16::from_be_bytes([x[0], x[1]]))
            .collect::<Vec<_>>()
            .as_slice(),
    )
}

/// Decode a string sent by the Query protocol.
///
/// Servers write `server.properties` values as-is, so `§` and friends may
/// arrive as raw Latin-1 bytes. Valid UTF-8 is kept, anything else is read
/// byte-per-char as Latin-1.
pub fn bufs_to_str(bufs: &[u8]) -> String {
    match std::str::from_utf8(bufs) {
        Ok(s) => s.to_owned(),
        Err(_) => bufs.iter().map(|&b| b as char).collect(),
    }
}

/// Split `bufs` on every occurrence of `delimiter`.
pub fn split_bufs<'a>(bufs: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut idx = 0;

    if delimiter.is_empty() {
        return vec![bufs];
    }

    while idx + delimiter.len() <= bufs.len() {
        if &bufs[idx..idx + delimiter.len()] == delimiter {
            parts.push(&bufs[start..idx]);
            idx += delimiter.len();
            start = idx;
        } else {
            idx += 1;
        }
    }

    parts.push(&bufs[start..]);
    parts
}

/// Permissive integer parsing: leading whitespace, an optional sign and
/// the longest run of digits. Anything unparseable is 0, overflow saturates.
pub fn parse_int_lossy(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut result = 0i64;

    for c in digits.chars() {
        match c.to_digit(10) {
            Some(d) => {
                result = result.saturating_mul(10).saturating_add(d as i64);
            }
            None => break,
        }
    }

    if negative {
        -result
    } else {
        result
    }
}

/// [parse_int_lossy] clamped into the i32 range.
pub fn parse_i32_lossy(s: &str) -> i32 {
    let num = parse_int_lossy(s);

    i32::try_from(num).unwrap_or(if num < 0 { i32::MIN } else { i32::MAX })
}
