use super::Error;

/// Size of the fixed part of the RTP header.
pub const RTP_HEADER_SIZE: usize = 12;

/// The RTP version of RFC 3550.
pub const RTP_VERSION: u8 = 2;

const VERSION_MASK: u8 = 0b1100_0000;
const PADDING_MASK: u8 = 0b0010_0000;
const EXTENSION_MASK: u8 = 0b0001_0000;
const CSRC_COUNT_MASK: u8 = 0b0000_1111;
const MARKER_MASK: u8 = 0b1000_0000;
const PAYLOAD_TYPE_MASK: u8 = 0b0111_1111;

/// A borrowed view over the RTP header at the start of a packet.
///
/// ```bash
///   0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Parsing never copies: the view maps field accessors onto the
/// caller's buffer and computes the total header length. The caller
/// must pass the true captured length so the CSRC list and the
/// optional extension can be bound-checked against it.
#[derive(Debug, Clone, Copy)]
pub struct RtpHeader<'a> {
    bytes: &'a [u8],
    size: usize,
}

impl<'a> RtpHeader<'a> {
    /// Parse and bound-check the header of `bytes`.
    ///
    /// The total header length is `12 + 4 * cc`, plus `4 + 4 * elen`
    /// when the extension bit is set. A header that declares more
    /// CSRCs or extension words than the buffer holds is `Malformed`;
    /// a truncated capture must never be read past its end.
    ///
    /// # Test
    ///
    /// ```
    /// use rtpflow_codec::rtp::RtpHeader;
    ///
    /// let buf = [
    ///     0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00,
    ///     0x00, 0x2a, 0xde, 0xad, 0xbe, 0xef,
    /// ];
    ///
    /// let rtp = RtpHeader::parse(&buf).unwrap();
    ///
    /// assert_eq!(rtp.version(), 2);
    /// assert_eq!(rtp.size(), 12);
    /// assert_eq!(rtp.sequence_number(), 1);
    /// assert_eq!(rtp.timestamp(), 100);
    /// assert_eq!(rtp.ssrc(), 42);
    /// assert_eq!(rtp.payload(), &[0xde, 0xad, 0xbe, 0xef]);
    /// ```
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        if bytes.len() < RTP_HEADER_SIZE {
            return Err(Error::Malformed);
        }

        let csrc_count = (bytes[0] & CSRC_COUNT_MASK) as usize;
        let mut size = RTP_HEADER_SIZE + csrc_count * 4;
        if size > bytes.len() {
            return Err(Error::Malformed);
        }

        if bytes[0] & EXTENSION_MASK != 0 {
            if size + 4 > bytes.len() {
                return Err(Error::Malformed);
            }

            let words = u16::from_be_bytes(bytes[size + 2..size + 4].try_into()?) as usize;
            size += 4 + words * 4;
            if size > bytes.len() {
                return Err(Error::Malformed);
            }
        }

        Ok(Self { bytes, size })
    }

    /// Total header length: fixed header, CSRC list and extension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The bytes following the header, as much as was captured.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[self.size..]
    }

    pub fn version(&self) -> u8 {
        (self.bytes[0] & VERSION_MASK) >> 6
    }

    pub fn padding(&self) -> bool {
        self.bytes[0] & PADDING_MASK != 0
    }

    pub fn extension(&self) -> bool {
        self.bytes[0] & EXTENSION_MASK != 0
    }

    pub fn csrc_count(&self) -> u8 {
        self.bytes[0] & CSRC_COUNT_MASK
    }

    pub fn marker(&self) -> bool {
        self.bytes[1] & MARKER_MASK != 0
    }

    pub fn payload_type(&self) -> u8 {
        self.bytes[1] & PAYLOAD_TYPE_MASK
    }

    pub fn sequence_number(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    pub fn ssrc(&self) -> u32 {
        u32::from_be_bytes([self.bytes[8], self.bytes[9], self.bytes[10], self.bytes[11]])
    }

    /// The CSRC identifiers, `cc` of them.
    pub fn csrc(&self) -> impl Iterator<Item = u32> + 'a {
        self.bytes[RTP_HEADER_SIZE..RTP_HEADER_SIZE + self.csrc_count() as usize * 4]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
    }

    /// Profile id and length in words of the header extension, if the
    /// extension bit is set.
    pub fn extension_header(&self) -> Option<(u16, u16)> {
        if !self.extension() {
            return None;
        }

        let at = RTP_HEADER_SIZE + self.csrc_count() as usize * 4;
        Some((
            u16::from_be_bytes([self.bytes[at], self.bytes[at + 1]]),
            u16::from_be_bytes([self.bytes[at + 2], self.bytes[at + 3]]),
        ))
    }
}

/// One-line trace of the header, the format of the text output.
impl std::fmt::Display for RtpHeader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            " {} version {}, ts {}, seq {}, ssrc {:#x}, pt {}",
            if self.marker() { '*' } else { ' ' },
            self.version(),
            self.timestamp(),
            self.sequence_number(),
            self.ssrc(),
            self.payload_type(),
        )
    }
}
