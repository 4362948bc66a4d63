use std::{
    io::{ErrorKind, Read, Write},
    net::{Ipv4Addr, SocketAddrV4, UdpSocket},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use codec::{
    dump::{self, DumpHeader, PacketHeader},
    rtp::RtpHeader,
};

use crate::{
    config::Format,
    pacer::Pacer,
    session::{Input, Output, Sink, Source},
};

/// Big enough for any datagram the supported captures carry.
const BUF_LEN: usize = 8192;

/// One read-transform-write loop for a (input, output) format pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    DumpToNet,
    DumpToRaw,
    DumpToText,
    NetToDump,
    NetToNet,
    NetToRaw,
    NetToText,
}

impl Pipeline {
    /// The converter for a format pair; `None` where no conversion
    /// exists (raw and txt are output-only, dump to dump is a no-op).
    pub fn select(input: Format, output: Format) -> Option<Self> {
        Some(match (input, output) {
            (Format::Dump, Format::Net) => Self::DumpToNet,
            (Format::Dump, Format::Raw) => Self::DumpToRaw,
            (Format::Dump, Format::Text) => Self::DumpToText,
            (Format::Net, Format::Dump) => Self::NetToDump,
            (Format::Net, Format::Net) => Self::NetToNet,
            (Format::Net, Format::Raw) => Self::NetToRaw,
            (Format::Net, Format::Text) => Self::NetToText,
            _ => return None,
        })
    }

    /// Stream records from `input` to `output` until end of stream.
    ///
    /// Returns `Ok(true)` only if every record streamed cleanly;
    /// per-record failures are logged, skipped and remembered. Only a
    /// structural failure (untrustworthy framing) is an `Err`.
    pub fn run(self, input: Input, output: Output, mut pacer: Pacer) -> Result<bool> {
        let Input { source, addr, .. } = input;

        match (self, source, output.sink) {
            (Self::DumpToNet, Source::Stream(mut r), Sink::Socket(socket)) => {
                dump_to_net(&mut *r, &socket, &mut pacer)
            }
            (Self::DumpToRaw, Source::Stream(mut r), Sink::Stream(mut w)) => {
                dump_to_raw(&mut *r, &mut *w)
            }
            (Self::DumpToText, Source::Stream(mut r), Sink::Stream(mut w)) => {
                dump_to_text(&mut *r, &mut *w)
            }
            (Self::NetToDump, Source::Socket(socket), Sink::Stream(mut w)) => {
                net_to_dump(&socket, &mut *w, addr)
            }
            (Self::NetToNet, Source::Socket(input), Sink::Socket(output)) => {
                net_to_net(&input, &output)
            }
            (Self::NetToRaw, Source::Socket(socket), Sink::Stream(mut w)) => {
                net_to_raw(&socket, &mut *w)
            }
            (Self::NetToText, Source::Socket(socket), Sink::Stream(mut w)) => {
                net_to_text(&socket, &mut *w)
            }
            _ => bail!("endpoint does not match the negotiated format"),
        }
    }
}

/// Magic line and file header of a dump input, with the advisory
/// consistency check between the two.
fn read_dump_prologue(reader: &mut dyn Read) -> Result<DumpHeader> {
    let (addr, port) = dump::read_magic_line(reader).context("reading dump magic line")?;
    let header = DumpHeader::read(reader).context("reading dump header")?;

    if !header.check(addr, port) {
        log::warn!(
            "dump header is inconsistent: line={}/{}, header={}/{}",
            addr,
            port,
            header.addr,
            header.port,
        );
    }

    log::info!(
        "dump of {}:{} starts on {}:{}",
        header.addr,
        header.port,
        header.sec,
        header.usec,
    );

    Ok(header)
}

/// One datagram, or `None` when the stream ended: a zero-length
/// datagram reads as termination, and so does the configured receive
/// timeout expiring.
fn recv_next(socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<usize>> {
    match socket.recv(buf) {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            log::info!("receive timeout reached, ending stream");
            Ok(None)
        }
        Err(e) => Err(e).context("receiving rtp"),
    }
}

/// Replay a dump over the network with realistic inter-packet gaps.
fn dump_to_net(reader: &mut dyn Read, socket: &UdpSocket, pacer: &mut Pacer) -> Result<bool> {
    read_dump_prologue(reader)?;

    let mut clean = true;
    let mut buf = Vec::with_capacity(BUF_LEN);
    while let Some(pkt) = dump::read_record(reader, &mut buf).context("reading dump record")? {
        if pkt.is_rtcp() {
            // a zero-length send is indistinguishable from stream
            // termination for some receivers, so RTCP records are
            // never forwarded
            log::debug!("skipping rtcp record: msec={}", pkt.msec);
            continue;
        }

        // replaying garbage timing from a header we cannot trust is
        // worse than stopping: a parse failure is fatal here
        let rtp = RtpHeader::parse(&buf).context("parsing rtp header")?;

        if let Err(e) = pacer.pace(pkt.msec, rtp.timestamp(), rtp.payload_type()) {
            log::warn!("packet timing failed, sending now: err={e}");
            clean = false;
        }

        let data = if buf.len() < pkt.plen as usize {
            log::warn!("{} bytes of rtp payload missing", pkt.plen as usize - buf.len());
            clean = false;
            &buf[..]
        } else {
            &buf[..pkt.plen as usize]
        };

        match socket.send(data) {
            Ok(sent) if sent == data.len() => {}
            Ok(sent) => {
                log::error!("only sent {sent} < {} bytes of rtp", data.len());
                clean = false;
            }
            Err(e) => {
                log::error!("error sending {} bytes of rtp: err={e}", data.len());
                clean = false;
            }
        }
    }

    Ok(clean)
}

/// Strip headers from a dump, leaving the concatenated payload.
fn dump_to_raw(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<bool> {
    read_dump_prologue(reader)?;

    let mut clean = true;
    let mut buf = Vec::with_capacity(BUF_LEN);
    while let Some(pkt) = dump::read_record(reader, &mut buf).context("reading dump record")? {
        if pkt.is_rtcp() {
            continue;
        }

        let rtp = match RtpHeader::parse(&buf) {
            Ok(rtp) => rtp,
            Err(e) => {
                log::error!("error parsing rtp header: err={e}");
                clean = false;
                continue;
            }
        };

        if pkt.data_len() < pkt.plen as usize {
            log::warn!(
                "{} bytes of rtp payload missing",
                pkt.plen as usize - pkt.data_len(),
            );
        }

        if let Err(e) = writer.write_all(rtp.payload()) {
            log::error!("error writing {} bytes of payload: err={e}", rtp.payload().len());
            clean = false;
        }
    }

    Ok(clean)
}

/// Print a dump as a trace, one line per record plus the parsed RTP
/// header for RTP records.
fn dump_to_text(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<bool> {
    let header = read_dump_prologue(reader)?;
    writeln!(
        writer,
        "dump of {}:{} starts on {}:{}",
        header.addr, header.port, header.sec, header.usec,
    )
    .context("writing trace header")?;

    let mut clean = true;
    let mut buf = Vec::with_capacity(BUF_LEN);
    while let Some(pkt) = dump::read_record(reader, &mut buf).context("reading dump record")? {
        if pkt.is_rtcp() {
            if let Err(e) = writeln!(writer, "{:08} RTCP", pkt.msec) {
                log::error!("error writing trace line: err={e}");
                clean = false;
            }

            continue;
        }

        let line = match RtpHeader::parse(&buf) {
            Ok(rtp) => format!(
                "{:08} RTP  {} bytes ({} captured)\n{rtp}",
                pkt.msec,
                pkt.plen,
                pkt.data_len(),
            ),
            Err(e) => {
                log::error!("error parsing rtp header: err={e}");
                clean = false;
                continue;
            }
        };

        if let Err(e) = writeln!(writer, "{line}") {
            log::error!("error writing trace line: err={e}");
            clean = false;
        }
    }

    Ok(clean)
}

/// Capture a live session into a dump file.
fn net_to_dump(
    socket: &UdpSocket,
    writer: &mut dyn Write,
    addr: Option<SocketAddrV4>,
) -> Result<bool> {
    let start = Instant::now();
    let (addr, port) = match addr {
        Some(addr) => (*addr.ip(), addr.port()),
        None => (Ipv4Addr::UNSPECIFIED, 0),
    };

    dump::write_magic_line(writer, addr, port).context("writing dump magic line")?;
    DumpHeader::now(addr, port)
        .write(writer)
        .context("writing dump header")?;

    let mut clean = true;
    let mut buf = [0u8; BUF_LEN];
    while let Some(size) = recv_next(socket, &mut buf)? {
        log::debug!("{size} bytes of rtp received");

        if let Err(e) = RtpHeader::parse(&buf[..size]) {
            log::error!("error parsing rtp header: err={e}");
            clean = false;
            continue;
        }

        let msec = start.elapsed().as_millis() as u32;
        if let Err(e) = PacketHeader::new(size as u16, msec).write(writer) {
            log::error!("error writing packet header: err={e}");
            clean = false;
            continue;
        }

        if let Err(e) = writer.write_all(&buf[..size]) {
            log::error!("error writing {size} bytes of rtp: err={e}");
            clean = false;
        }
    }

    Ok(clean)
}

/// Relay between two sessions as fast as records arrive; no pacing.
fn net_to_net(input: &UdpSocket, output: &UdpSocket) -> Result<bool> {
    let mut clean = true;
    let mut buf = [0u8; BUF_LEN];
    while let Some(size) = recv_next(input, &mut buf)? {
        log::debug!("{size} bytes of rtp received");

        if let Err(e) = RtpHeader::parse(&buf[..size]) {
            log::error!("error parsing rtp header: err={e}");
            clean = false;
            continue;
        }

        match output.send(&buf[..size]) {
            Ok(sent) if sent == size => {}
            Ok(sent) => {
                log::error!("only sent {sent} < {size} bytes of rtp");
                clean = false;
            }
            Err(e) => {
                log::error!("error sending {size} bytes of rtp: err={e}");
                clean = false;
            }
        }
    }

    Ok(clean)
}

/// Strip headers from a live session, writing the payload bytes.
fn net_to_raw(socket: &UdpSocket, writer: &mut dyn Write) -> Result<bool> {
    let mut clean = true;
    let mut buf = [0u8; BUF_LEN];
    while let Some(size) = recv_next(socket, &mut buf)? {
        log::debug!("{size} bytes of rtp received");

        let rtp = match RtpHeader::parse(&buf[..size]) {
            Ok(rtp) => rtp,
            Err(e) => {
                log::error!("error parsing rtp header: err={e}");
                clean = false;
                continue;
            }
        };

        if let Err(e) = writer.write_all(rtp.payload()) {
            log::error!("error writing {} bytes of payload: err={e}", rtp.payload().len());
            clean = false;
        }
    }

    Ok(clean)
}

/// Print a live session as a trace.
fn net_to_text(socket: &UdpSocket, writer: &mut dyn Write) -> Result<bool> {
    let start = Instant::now();

    let mut clean = true;
    let mut buf = [0u8; BUF_LEN];
    while let Some(size) = recv_next(socket, &mut buf)? {
        let line = match RtpHeader::parse(&buf[..size]) {
            Ok(rtp) => format!(
                "{:08} RTP  {size} bytes\n{rtp}",
                start.elapsed().as_millis() as u32,
            ),
            Err(e) => {
                log::error!("error parsing rtp header: err={e}");
                clean = false;
                continue;
            }
        };

        if let Err(e) = writeln!(writer, "{line}") {
            log::error!("error writing trace line: err={e}");
            clean = false;
        }
    }

    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converter_selection() {
        assert_eq!(
            Pipeline::select(Format::Dump, Format::Net),
            Some(Pipeline::DumpToNet)
        );
        assert_eq!(
            Pipeline::select(Format::Net, Format::Dump),
            Some(Pipeline::NetToDump)
        );
        assert_eq!(
            Pipeline::select(Format::Net, Format::Net),
            Some(Pipeline::NetToNet)
        );

        // raw and txt never produce records
        assert_eq!(Pipeline::select(Format::Raw, Format::Dump), None);
        assert_eq!(Pipeline::select(Format::Text, Format::Net), None);

        // copying a dump is not a conversion
        assert_eq!(Pipeline::select(Format::Dump, Format::Dump), None);
    }
}
