/// One static payload-type assignment of RFC 3551 section 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadType {
    /// Encoding name.
    pub encoding: &'static str,
    /// Sampling rate (audio) or clock rate (video); 0 where the
    /// assignment is reserved/unassigned or the rate is not meaningful
    /// for pacing.
    pub rate: u32,
    /// Audio channels; 0 for video.
    pub channels: u8,
}

const fn pt(encoding: &'static str, rate: u32, channels: u8) -> PayloadType {
    PayloadType {
        encoding,
        rate,
        channels,
    }
}

/// The static assignments 0..=34.
#[rustfmt::skip]
pub static PAYLOAD_TYPES: [PayloadType; 35] = [
    pt("PCMU",        8000, 1),
    pt("reserved",       0, 0),
    pt("reserved",       0, 0),
    pt("GSM",         8000, 1),
    pt("G723",        8000, 1),
    pt("DVI4",        8000, 1),
    pt("DVI4",       16000, 1),
    pt("LPC",         8000, 1),
    pt("PCMA",        8000, 1),
    pt("G722",        8000, 1),
    pt("L16",        44100, 2),
    pt("L16",        44100, 1),
    pt("QCELP",       8000, 1),
    pt("CN",          8000, 0),
    pt("MPA",        90000, 0),
    pt("G728",        8000, 1),
    pt("DVI4",       11025, 1),
    pt("DVI4",       22050, 1),
    pt("G729",        8000, 1),
    pt("reserved",       0, 0),
    pt("unassigned",     0, 0),
    pt("unassigned",     0, 0),
    pt("unassigned",     0, 0),
    pt("unassigned",     0, 0),
    pt("unassigned",     0, 0),
    pt("CelB",       90000, 0),
    pt("JPEG",       90000, 0),
    pt("unassigned",     0, 0),
    pt("nv",         90000, 0),
    pt("unassigned",     0, 0),
    pt("unassigned",     0, 0),
    pt("H261",       90000, 0),
    pt("MPV",        90000, 0),
    pt("MP2T",       90000, 0),
    pt("H263",       90000, 0),
];

/// Look up a payload-type number.
///
/// # Test
///
/// ```
/// use rtpflow_codec::payload;
///
/// let pcmu = payload::lookup(0).unwrap();
/// assert_eq!(pcmu.encoding, "PCMU");
/// assert_eq!(pcmu.rate, 8000);
///
/// assert!(payload::lookup(96).is_none());
/// ```
pub fn lookup(pt: u8) -> Option<&'static PayloadType> {
    PAYLOAD_TYPES.get(pt as usize)
}
