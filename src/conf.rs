use crate::{
    query::{QueryClient, ServerInfo},
    server::{PingResult, SlpClient},
    share::timeout_from_secs,
    Result, StatErr,
};
use std::{
    net::{Ipv4Addr, SocketAddr, ToSocketAddrs},
    time::Duration,
};

/// Default port of a Java Edition server, used for both SLP and Query.
pub const DEFAULT_PORT: u16 = 25565;
/// Default symmetric socket timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Target server address and connection settings.
#[derive(Debug, Clone)]
pub struct Conf {
    /// Server IP address or a domain name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// See [SocketConf].
    pub socket_conf: SocketConf,
}

/// Additional socket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConf {
    /// Timeout applied to connect, every read and every write.
    /// `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Local address the UDP socket binds to for IPv4 targets.
    /// The default value is [Ipv4Addr::UNSPECIFIED].
    pub rep_udp_ipv4: Ipv4Addr,
    /// Local port the UDP socket binds to. The default 0 picks an ephemeral port.
    pub rep_udp_port: u16,
}

impl Default for SocketConf {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            rep_udp_ipv4: Ipv4Addr::UNSPECIFIED,
            rep_udp_port: 0,
        }
    }
}

impl ToSocketAddrs for Conf {
    type Iter = std::vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        (&*self.host, self.port).to_socket_addrs()
    }
}

impl std::fmt::Display for Conf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Conf {
    /// Create a connection configuration using the default port(25565).
    ///
    /// # Examples
    ///
    /// ```
    /// # use mcstat::{Conf, SocketConf};
    /// #
    /// let conf = Conf::create("www.example.com");
    /// #
    /// # assert_eq!(conf.host, "www.example.com");
    /// # assert_eq!(conf.port, 25565);
    /// # assert_eq!(conf.socket_conf, SocketConf::default());
    /// ```
    pub fn create(host: &str) -> Self {
        Self::create_with_port(host, DEFAULT_PORT)
    }

    /// Create a connection configuration using the specified port.
    ///
    /// # Example
    ///
    /// ```
    /// # use mcstat::Conf;
    /// #
    /// let conf = Conf::create_with_port("www.example.com", 25575);
    /// #
    /// # assert_eq!(conf.port, 25575);
    /// ```
    pub fn create_with_port(host: &str, port: u16) -> Self {
        Self {
            host: host.trim().into(),
            port,
            socket_conf: SocketConf::default(),
        }
    }

    /// Create a connection configuration from a `host:port` string.
    ///
    /// If the string does not split into exactly two parts, or the port
    /// cannot be converted to [u16], a [StatErr::InvalidArgument] is returned.
    ///
    /// # Example
    ///
    /// ```
    /// # use mcstat::{Conf, StatErr};
    /// #
    /// # fn main() -> Result<(), StatErr> {
    ///     let conf = Conf::create_from_str("www.example.com:25565")?;
    /// #
    /// #   assert_eq!(conf.host, "www.example.com");
    /// #   assert_eq!(conf.port, 25565);
    /// #
    /// #   assert!(Conf::create_from_str("25565").is_err());
    /// #   assert!(Conf::create_from_str("www.example.com:-1").is_err());
    /// #   Ok(())
    /// # }
    /// ```
    pub fn create_from_str(addr: &str) -> Result<Self> {
        let addr_split = addr.split(':').map(|x| x.trim()).collect::<Vec<_>>();

        if addr_split.len() != 2 || addr_split[0].is_empty() {
            return Err(StatErr::InvalidArgument(format!(
                "Invalid socket address syntax: {}",
                addr
            )));
        }

        match addr_split[1].parse::<u16>() {
            Ok(port) => Ok(Self::create_with_port(addr_split[0], port)),
            Err(_) => Err(StatErr::InvalidArgument(format!(
                "Invalid port: {}",
                addr_split[1]
            ))),
        }
    }

    /// Set the symmetric socket timeout in whole seconds.
    ///
    /// Negative values are a [StatErr::InvalidArgument]; 0 disables the timeout.
    ///
    /// ```
    /// # use mcstat::{Conf, StatErr};
    /// # use std::time::Duration;
    /// #
    /// let conf = Conf::create("www.example.com").with_timeout_secs(2).unwrap();
    /// assert_eq!(conf.socket_conf.timeout, Some(Duration::from_secs(2)));
    ///
    /// assert!(matches!(
    ///     Conf::create("www.example.com").with_timeout_secs(-1),
    ///     Err(StatErr::InvalidArgument(_))
    /// ));
    /// ```
    pub fn with_timeout_secs(mut self, secs: i64) -> Result<Self> {
        self.socket_conf.timeout = timeout_from_secs(secs)?;

        Ok(self)
    }

    /// Ping a modern (1.7+) Java Edition server once using
    /// [Server List Ping](https://wiki.vg/Server_List_Ping#Current_.281.7.2B.29).
    ///
    /// `Ok(None)` means the server answered with no usable status.
    ///
    /// ```no_run
    /// use mcstat::{Conf, StatErr};
    ///
    /// fn main() -> Result<(), StatErr> {
    ///     if let Some(status) = Conf::create("www.example.com").get_server_status()? {
    ///         println!("{}", status);
    ///     }
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn get_server_status(&self) -> Result<Option<PingResult>> {
        let mut client = SlpClient::connect(self)?;
        let status = client.query();

        client.close();
        status
    }

    /// Ping a pre-1.7 Java Edition server once with the legacy `0xFE 0x01` ping.
    pub fn get_legacy_server_status(&self) -> Result<Option<PingResult>> {
        let mut client = SlpClient::connect(self)?;
        let status = client.query_old_pre17();

        client.close();
        status
    }

    /// Run one full-stat exchange using the [Query](https://wiki.vg/Query) protocol.
    ///
    /// The server needs `enable-query=true`. Returns the server info and the
    /// player list, which is empty when nobody is online.
    pub fn query_full(&self) -> Result<(ServerInfo, Vec<String>)> {
        let mut client = QueryClient::new();

        client.connect(self)?;

        let info = client.get_info().cloned().ok_or_else(|| {
            StatErr::ProtocolErr("Query finished without server info".into())
        })?;
        let players = client.get_players().map(<[String]>::to_vec).unwrap_or_default();

        Ok((info, players))
    }
}
