use std::{
    fs::File,
    io::{self, Read, Write},
    net::{IpAddr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::Format;

/// Network knobs for endpoint opening, built once at startup and
/// read-only for the run.
#[derive(Debug, Default, Clone)]
pub struct NetConfig {
    ///
    /// Addresses bound to local interfaces; an endpoint whose address
    /// appears here plays the "local" role of the rendezvous.
    ///
    pub local_addrs: Vec<IpAddr>,
    ///
    /// Treat every address as remote, even a local one.
    ///
    pub force_remote: bool,
    ///
    /// Receive timeout for the rendezvous wait and the streaming
    /// receive; `None` blocks indefinitely.
    ///
    pub timeout: Option<Duration>,
}

impl NetConfig {
    /// Enumerate the local interface addresses, once per process.
    pub fn detect(force_remote: bool, timeout: Option<Duration>) -> Result<Self> {
        let local_addrs = if_addrs::get_if_addrs()
            .context("enumerating network interfaces")?
            .into_iter()
            .map(|iface| iface.ip())
            .collect();

        Ok(Self {
            local_addrs,
            force_remote,
            timeout,
        })
    }

    fn is_local(&self, addr: SocketAddrV4) -> bool {
        !self.force_remote && self.local_addrs.contains(&IpAddr::V4(*addr.ip()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

/// Where records are read from.
pub enum Source {
    Stream(Box<dyn Read>),
    Socket(UdpSocket),
}

/// Where records are written to.
pub enum Sink {
    Stream(Box<dyn Write>),
    Socket(UdpSocket),
}

pub struct Input {
    pub source: Source,
    pub format: Format,
    /// The resolved session address for a network input; recorded in
    /// the dump header when capturing.
    pub addr: Option<SocketAddrV4>,
}

pub struct Output {
    pub sink: Sink,
    pub format: Format,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
            Self::Socket(socket) => f.debug_tuple("Socket").field(socket).finish(),
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
            Self::Socket(socket) => f.debug_tuple("Socket").field(socket).finish(),
        }
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("source", &self.source)
            .field("format", &self.format)
            .field("addr", &self.addr)
            .finish()
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("sink", &self.sink)
            .field("format", &self.format)
            .finish()
    }
}

/// Open an input endpoint and resolve its record format.
///
/// `-` is stdin (dump by default), `addr:port` a UDP session (always
/// the net format), anything else a file whose suffix picks the
/// default format.
pub fn open_input(target: &str, format: Option<Format>, net: &NetConfig) -> Result<Input> {
    if let Some((host, port)) = parse_net_target(target)? {
        if let Some(format) = format {
            if format != Format::Net {
                bail!("only net input allowed for {target}");
            }
        }

        let addr = resolve(&host, port)?;
        let socket = open_socket(addr, Mode::Read, net)?;
        return Ok(Input {
            source: Source::Socket(socket),
            format: Format::Net,
            addr: Some(addr),
        });
    }

    if format == Some(Format::Net) {
        bail!("net input requires an addr:port target, not {target}");
    }

    if target == "-" {
        return Ok(Input {
            source: Source::Stream(Box::new(io::stdin())),
            format: format.unwrap_or(Format::Dump),
            addr: None,
        });
    }

    let file = File::open(target).with_context(|| format!("opening {target}"))?;
    Ok(Input {
        source: Source::Stream(Box::new(file)),
        format: format
            .or_else(|| Format::from_suffix(target))
            .unwrap_or(Format::Dump),
        addr: None,
    })
}

/// Open an output endpoint and resolve its record format.
///
/// Defaults mirror `open_input`, except that stdout and suffix-less
/// files fall back to the text format.
pub fn open_output(target: &str, format: Option<Format>, net: &NetConfig) -> Result<Output> {
    if let Some((host, port)) = parse_net_target(target)? {
        if let Some(format) = format {
            if format != Format::Net {
                bail!("only net output allowed for {target}");
            }
        }

        let addr = resolve(&host, port)?;
        let socket = open_socket(addr, Mode::Write, net)?;
        return Ok(Output {
            sink: Sink::Socket(socket),
            format: Format::Net,
        });
    }

    if format == Some(Format::Net) {
        bail!("net output requires an addr:port target, not {target}");
    }

    if target == "-" {
        return Ok(Output {
            sink: Sink::Stream(Box::new(io::stdout())),
            format: format.unwrap_or(Format::Text),
        });
    }

    let file = File::create(target).with_context(|| format!("creating {target}"))?;
    Ok(Output {
        sink: Sink::Stream(Box::new(file)),
        format: format
            .or_else(|| Format::from_suffix(target))
            .unwrap_or(Format::Text),
    })
}

/// Split an `addr:port` target. A target whose last colon is followed
/// by something non-numeric is a filesystem path; one that ends in
/// digits claims to be a network target, and a port of 0 or beyond
/// 65535 is then a setup error rather than a silent path.
fn parse_net_target(target: &str) -> Result<Option<(String, u16)>> {
    let Some((host, port)) = target.rsplit_once(':') else {
        return Ok(None);
    };

    if port.is_empty() || !port.bytes().all(|byte| byte.is_ascii_digit()) {
        return Ok(None);
    }

    let Ok(port) = port.parse::<u16>() else {
        bail!("port out of range in {target}");
    };
    if port == 0 {
        bail!("port number 0 in {target}");
    }

    Ok(Some((
        if host.is_empty() {
            "0.0.0.0".to_string()
        } else {
            host.to_string()
        },
        port,
    )))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddrV4> {
    let addrs = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolving '{host}'"))?;

    for addr in addrs {
        if let SocketAddr::V4(addr) = addr {
            return Ok(addr);
        }
    }

    bail!("'{host}' did not resolve to an ipv4 address");
}

/// Open a UDP endpoint and negotiate the session roles.
///
/// A local address is bound whether it reads or writes: an input
/// receives on it directly, an output must first receive a datagram on
/// it to learn where to send. A remote address is connected; a remote
/// input additionally sends a single probe byte so the peer's
/// wait-for-the-first-datagram unblocks.
fn open_socket(addr: SocketAddrV4, mode: Mode, net: &NetConfig) -> Result<UdpSocket> {
    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("creating socket")?;
    socket.set_reuse_address(true).context("setting reuseaddr")?;
    if let Some(timeout) = net.timeout {
        socket.set_read_timeout(Some(timeout))?;
    }

    if net.is_local(addr) {
        socket
            .bind(&SocketAddr::V4(addr).into())
            .with_context(|| format!("binding {addr}"))?;

        let socket: UdpSocket = socket.into();
        log::info!("udp endpoint bound: addr={addr}, role=local");

        if mode == Mode::Write {
            let mut probe = [0u8; 8];
            let (_, peer) = socket
                .recv_from(&mut probe)
                .context("waiting for the first datagram")?;

            socket
                .connect(peer)
                .with_context(|| format!("connecting to {peer}"))?;

            log::info!("first datagram received: peer={peer}");
        }

        Ok(socket)
    } else {
        socket
            .connect(&SocketAddr::V4(addr).into())
            .with_context(|| format!("connecting to {addr}"))?;

        let socket: UdpSocket = socket.into();
        log::info!("udp endpoint connected: addr={addr}, role=remote");

        if mode == Mode::Read && socket.send(b"1").context("sending rendezvous probe")? != 1 {
            bail!("rendezvous probe not sent");
        }

        Ok(socket)
    }
}
