use std::{
    io::{ErrorKind, Read, Write},
    net::Ipv4Addr,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::{BufMut, BytesMut};

use super::Error;

/// Magic prefix of a dump file; the addr/port and a newline follow.
pub const MAGIC: &[u8] = b"#!rtpplay1.0 ";

/// Size of the binary file header that follows the magic line.
pub const DUMP_HEADER_SIZE: usize = 16;

/// Size of the header that precedes every captured packet.
pub const PACKET_HEADER_SIZE: usize = 8;

fn eof_as_short(e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::ShortRead
    } else {
        Error::Io(e)
    }
}

/// Read the magic line and return the addr/port it announces.
///
/// The line is consumed byte by byte so that the stream position after
/// return is exactly the first byte of the binary file header; a
/// buffered line reader would overshoot.
///
/// # Test
///
/// ```
/// use std::io::Cursor;
/// use rtpflow_codec::dump::read_magic_line;
///
/// let mut cursor = Cursor::new(&b"#!rtpplay1.0 10.0.0.1/5004\nrest"[..]);
/// let (addr, port) = read_magic_line(&mut cursor).unwrap();
///
/// assert_eq!(addr, "10.0.0.1".parse::<std::net::Ipv4Addr>().unwrap());
/// assert_eq!(port, 5004);
/// assert_eq!(cursor.position(), 27);
/// ```
pub fn read_magic_line<R: Read + ?Sized>(reader: &mut R) -> Result<(Ipv4Addr, u16), Error> {
    let mut magic = [0u8; 13];
    reader.read_exact(&mut magic).map_err(|_| Error::BadMagic)?;
    if magic != MAGIC {
        return Err(Error::BadMagic);
    }

    let mut line = Vec::with_capacity(32);
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).map_err(|_| Error::BadMagic)?;
        if byte[0] == b'\n' {
            break;
        }

        line.push(byte[0]);
        if line.len() > 64 {
            return Err(Error::BadMagic);
        }
    }

    let line = std::str::from_utf8(&line).map_err(|_| Error::BadAddress)?;
    let (addr, port) = line.split_once('/').ok_or(Error::BadAddress)?;
    let addr = addr.parse::<Ipv4Addr>().map_err(|_| Error::BadAddress)?;
    let port = match port.parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => return Err(Error::BadPort),
    };

    Ok((addr, port))
}

/// Write the magic line for the given addr/port.
///
/// A dump taken from a session whose address is unknown carries
/// `0.0.0.0/0`.
pub fn write_magic_line<W: Write + ?Sized>(
    writer: &mut W,
    addr: Ipv4Addr,
    port: u16,
) -> Result<usize, Error> {
    let line = format!("#!rtpplay1.0 {addr}/{port}\n");
    writer.write_all(line.as_bytes())?;
    Ok(line.len())
}

/// The binary file header.
///
/// Records the wall-clock start of the capture and the network
/// address/port of the captured session. On the wire every field is
/// big-endian; this struct always holds host-order values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpHeader {
    pub sec: u32,
    pub usec: u32,
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl DumpHeader {
    /// Header for a capture starting now.
    pub fn now(addr: Ipv4Addr, port: u16) -> Self {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            sec: start.as_secs() as u32,
            usec: start.subsec_micros(),
            addr,
            port,
        }
    }

    /// # Test
    ///
    /// ```
    /// use std::io::Cursor;
    /// use rtpflow_codec::dump::DumpHeader;
    ///
    /// let header = DumpHeader {
    ///     sec: 1,
    ///     usec: 2,
    ///     addr: "10.0.0.1".parse().unwrap(),
    ///     port: 5004,
    /// };
    ///
    /// let mut buf = Vec::new();
    /// header.write(&mut buf).unwrap();
    ///
    /// assert_eq!(
    ///     buf,
    ///     [0, 0, 0, 1, 0, 0, 0, 2, 10, 0, 0, 1, 0x13, 0x8c, 0, 0]
    /// );
    ///
    /// let back = DumpHeader::read(&mut Cursor::new(&buf)).unwrap();
    /// assert_eq!(back, header);
    /// ```
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self, Error> {
        let mut buf = [0u8; DUMP_HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(eof_as_short)?;

        Ok(Self {
            sec: u32::from_be_bytes(buf[0..4].try_into()?),
            usec: u32::from_be_bytes(buf[4..8].try_into()?),
            addr: Ipv4Addr::from(u32::from_be_bytes(buf[8..12].try_into()?)),
            port: u16::from_be_bytes(buf[12..14].try_into()?),
        })
    }

    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        let mut buf = BytesMut::with_capacity(DUMP_HEADER_SIZE);
        buf.put_u32(self.sec);
        buf.put_u32(self.usec);
        buf.put_u32(u32::from(self.addr));
        buf.put_u16(self.port);
        buf.put_u16(0);

        writer.write_all(&buf)?;
        Ok(DUMP_HEADER_SIZE)
    }

    /// Advisory cross-check against the addr/port of the magic line.
    /// A mismatch flags the file as inconsistent but never stops a
    /// replay.
    pub fn check(&self, addr: Ipv4Addr, port: u16) -> bool {
        self.addr == addr && self.port == port
    }
}

/// The header preceding every captured packet.
///
/// `dlen` counts the stored bytes including this header; `plen` is the
/// original wire length of the RTP packet. `dlen - 8 < plen` means the
/// capture truncated the payload. `plen == 0` marks an RTCP record,
/// which is detected but never decoded. `msec` is the offset since
/// dump start in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub dlen: u16,
    pub plen: u16,
    pub msec: u32,
}

impl PacketHeader {
    /// Header for a fully captured packet of `plen` bytes.
    pub fn new(plen: u16, msec: u32) -> Self {
        Self {
            dlen: plen + PACKET_HEADER_SIZE as u16,
            plen,
            msec,
        }
    }

    /// Number of packet bytes stored after this header.
    pub fn data_len(&self) -> usize {
        self.dlen as usize - PACKET_HEADER_SIZE
    }

    /// An RTCP record carries no RTP wire length.
    pub fn is_rtcp(&self) -> bool {
        self.plen == 0
    }

    /// Read one packet header.
    ///
    /// A clean zero-byte read is the regular end of the stream and
    /// returns `Ok(None)`; anything between one byte and a full header
    /// is a short read and the stream is no longer trustworthy.
    ///
    /// # Test
    ///
    /// ```
    /// use std::io::Cursor;
    /// use rtpflow_codec::dump::PacketHeader;
    ///
    /// let buf = [0x00, 0x0c, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04];
    /// let header = PacketHeader::read(&mut Cursor::new(&buf))
    ///     .unwrap()
    ///     .unwrap();
    ///
    /// assert_eq!(header, PacketHeader::new(4, 0x01020304));
    /// assert_eq!(header.data_len(), 4);
    ///
    /// assert!(PacketHeader::read(&mut Cursor::new(&[])).unwrap().is_none());
    /// ```
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Self>, Error> {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        let mut have = 0;
        while have < PACKET_HEADER_SIZE {
            let read = reader.read(&mut buf[have..])?;
            if read == 0 {
                return if have == 0 {
                    Ok(None)
                } else {
                    Err(Error::ShortRead)
                };
            }

            have += read;
        }

        let header = Self {
            dlen: u16::from_be_bytes(buf[0..2].try_into()?),
            plen: u16::from_be_bytes(buf[2..4].try_into()?),
            msec: u32::from_be_bytes(buf[4..8].try_into()?),
        };

        if (header.dlen as usize) < PACKET_HEADER_SIZE {
            return Err(Error::Malformed);
        }

        Ok(Some(header))
    }

    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, Error> {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
        buf.put_u16(self.dlen);
        buf.put_u16(self.plen);
        buf.put_u32(self.msec);

        writer.write_all(&buf)?;
        Ok(PACKET_HEADER_SIZE)
    }
}

/// Read one whole record: the packet header, then exactly
/// `dlen - 8` stored packet bytes into `buf`.
///
/// `Ok(None)` is the regular end of the stream. A payload shorter than
/// the header declares is a hard error; the framing of everything that
/// follows would be garbage.
pub fn read_record<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<PacketHeader>, Error> {
    let Some(header) = PacketHeader::read(reader)? else {
        return Ok(None);
    };

    buf.resize(header.data_len(), 0);
    reader.read_exact(buf).map_err(eof_as_short)?;
    Ok(Some(header))
}
