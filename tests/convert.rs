use std::{
    fs,
    io::Cursor,
    net::{Ipv4Addr, UdpSocket},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use codec::dump::{self, DumpHeader, PacketHeader};
use rtpflow::config::Config;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rtpflow-convert-{}-{name}", std::process::id()))
}

/// An RTP packet with payload type 0 (PCMU, so pacing knows its clock
/// rate) and a fixed timestamp (so replay tests never sleep).
fn rtp_packet(seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0x80, 0x00];
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&1000u32.to_be_bytes());
    pkt.extend_from_slice(&0xdecafbadu32.to_be_bytes());
    pkt.extend_from_slice(payload);
    pkt
}

fn dump_prologue(addr: Ipv4Addr, port: u16) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    dump::write_magic_line(&mut buf, addr, port)?;
    DumpHeader {
        sec: 100,
        usec: 0,
        addr,
        port,
    }
    .write(&mut buf)?;

    Ok(buf)
}

fn push_record(buf: &mut Vec<u8>, msec: u32, packet: &[u8]) -> Result<()> {
    PacketHeader::new(packet.len() as u16, msec).write(buf)?;
    buf.extend_from_slice(packet);
    Ok(())
}

fn push_rtcp_record(buf: &mut Vec<u8>, msec: u32, packet: &[u8]) -> Result<()> {
    PacketHeader {
        dlen: (packet.len() + dump::PACKET_HEADER_SIZE) as u16,
        plen: 0,
        msec,
    }
    .write(buf)?;
    buf.extend_from_slice(packet);
    Ok(())
}

fn convert(input: &Path, output: &Path) -> Result<bool> {
    rtpflow::run(Config {
        input: input.to_str().unwrap().to_string(),
        output: output.to_str().unwrap().to_string(),
        ..Config::default()
    })
}

#[test]
fn dump_to_raw_concatenates_the_payloads() -> Result<()> {
    let one: [u8; 160] = rand::random();
    let two: [u8; 160] = rand::random();

    let addr = "10.0.0.1".parse()?;
    let mut data = dump_prologue(addr, 5004)?;
    push_record(&mut data, 0, &rtp_packet(1, &one))?;
    push_rtcp_record(&mut data, 10, &[0x81, 0xc8, 0x00, 0x06])?;
    push_record(&mut data, 20, &rtp_packet(2, &two))?;

    let input = temp_path("payloads.rtp");
    let output = temp_path("payloads.raw");
    fs::write(&input, &data)?;

    assert!(convert(&input, &output)?);

    // headers gone, RTCP gone, both payloads back to back
    let raw = fs::read(&output)?;
    assert_eq!(raw.len(), 320);
    assert_eq!(&raw[..160], one.as_slice());
    assert_eq!(&raw[160..], two.as_slice());

    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();
    Ok(())
}

#[test]
fn dump_to_net_replays_only_the_rtp_records() -> Result<()> {
    let peer = UdpSocket::bind("127.0.0.1:0")?;
    peer.set_read_timeout(Some(Duration::from_secs(2)))?;

    let one = rtp_packet(1, &[0x11; 40]);
    let two = rtp_packet(2, &[0x22; 40]);

    let mut data = dump_prologue("10.0.0.1".parse()?, 5004)?;
    push_record(&mut data, 0, &one)?;
    push_rtcp_record(&mut data, 10, &[0x81, 0xc8, 0x00, 0x06])?;
    push_record(&mut data, 20, &two)?;

    let input = temp_path("replay.rtp");
    fs::write(&input, &data)?;

    let clean = rtpflow::run(Config {
        input: input.to_str().unwrap().to_string(),
        output: format!("127.0.0.1:{}", peer.local_addr()?.port()),
        remote: true,
        ..Config::default()
    })?;
    assert!(clean);

    let mut buf = [0u8; 512];
    let size = peer.recv(&mut buf)?;
    assert_eq!(&buf[..size], one.as_slice());
    let size = peer.recv(&mut buf)?;
    assert_eq!(&buf[..size], two.as_slice());

    // the RTCP record was skipped, so nothing else arrives
    peer.set_read_timeout(Some(Duration::from_millis(200)))?;
    assert!(peer.recv(&mut buf).is_err());

    fs::remove_file(&input).ok();
    Ok(())
}

#[test]
fn malformed_record_is_skipped_but_taints_the_run() -> Result<()> {
    // claims three contributing sources but only twelve bytes were
    // captured, so the declared header exceeds the record
    let mut bad = rtp_packet(1, &[]);
    bad[0] = 0x83;

    let good: [u8; 160] = rand::random();

    let mut data = dump_prologue("10.0.0.1".parse()?, 5004)?;
    PacketHeader {
        dlen: (bad.len() + dump::PACKET_HEADER_SIZE) as u16,
        plen: 32,
        msec: 0,
    }
    .write(&mut data)?;
    data.extend_from_slice(&bad);
    push_record(&mut data, 20, &rtp_packet(2, &good))?;

    let input = temp_path("tainted.rtp");
    let output = temp_path("tainted.raw");
    fs::write(&input, &data)?;

    // the stream continues past the bad record but reports unclean
    assert!(!convert(&input, &output)?);
    assert_eq!(fs::read(&output)?, good.as_slice());

    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();
    Ok(())
}

#[test]
fn header_mismatch_is_advisory_only() -> Result<()> {
    let payload: [u8; 160] = rand::random();

    let mut data = Vec::new();
    dump::write_magic_line(&mut data, "10.0.0.1".parse()?, 5004)?;
    DumpHeader {
        sec: 100,
        usec: 0,
        addr: "10.0.0.2".parse()?,
        port: 6000,
    }
    .write(&mut data)?;
    push_record(&mut data, 0, &rtp_packet(1, &payload))?;

    let input = temp_path("mismatch.rtp");
    let output = temp_path("mismatch.raw");
    fs::write(&input, &data)?;

    assert!(convert(&input, &output)?);
    assert_eq!(fs::read(&output)?, payload.as_slice());

    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();
    Ok(())
}

#[test]
fn net_to_dump_captures_a_replayable_file() -> Result<()> {
    let port = {
        let scratch = UdpSocket::bind("127.0.0.1:0")?;
        scratch.local_addr()?.port()
    };

    let one = rtp_packet(1, &[0x11; 40]);
    let two = rtp_packet(2, &[0x22; 40]);

    let sender = UdpSocket::bind("127.0.0.1:0")?;
    let packets = [one.clone(), two.clone()];
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        for pkt in &packets {
            sender.send_to(pkt, ("127.0.0.1", port)).unwrap();
        }
    });

    // the receive timeout ends the capture after the two datagrams
    let output = temp_path("capture.rtp");
    let clean = rtpflow::run(Config {
        input: format!("127.0.0.1:{port}"),
        output: output.to_str().unwrap().to_string(),
        timeout: Some(1),
        ..Config::default()
    })?;
    assert!(clean);
    handle.join().unwrap();

    let mut cursor = Cursor::new(fs::read(&output)?);
    let (addr, magic_port) = dump::read_magic_line(&mut cursor)?;
    assert_eq!(addr, "127.0.0.1".parse::<Ipv4Addr>()?);
    assert_eq!(magic_port, port);

    let header = DumpHeader::read(&mut cursor)?;
    assert!(header.check(addr, magic_port));

    let mut buf = Vec::new();
    let first = dump::read_record(&mut cursor, &mut buf)?.unwrap();
    assert_eq!(first.plen as usize, one.len());
    assert_eq!(buf, one);

    let second = dump::read_record(&mut cursor, &mut buf)?.unwrap();
    assert!(second.msec >= first.msec);
    assert_eq!(buf, two);

    assert!(dump::read_record(&mut cursor, &mut buf)?.is_none());

    fs::remove_file(&output).ok();
    Ok(())
}

#[test]
fn dump_to_text_traces_every_record() -> Result<()> {
    let mut data = dump_prologue("10.0.0.1".parse()?, 5004)?;
    push_record(&mut data, 0, &rtp_packet(1, &[0u8; 160]))?;
    push_rtcp_record(&mut data, 15, &[0x81, 0xc8, 0x00, 0x06])?;

    let input = temp_path("trace.rtp");
    let output = temp_path("trace.txt");
    fs::write(&input, &data)?;

    assert!(convert(&input, &output)?);

    let text = fs::read_to_string(&output)?;
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("dump of 10.0.0.1:5004 starts on 100:0")
    );
    assert_eq!(lines.next(), Some("00000000 RTP  172 bytes (172 captured)"));
    assert_eq!(
        lines.next(),
        Some("   version 2, ts 1000, seq 1, ssrc 0xdecafbad, pt 0"),
    );
    assert_eq!(lines.next(), Some("00000015 RTCP"));
    assert_eq!(lines.next(), None);

    fs::remove_file(&input).ok();
    fs::remove_file(&output).ok();
    Ok(())
}

#[test]
fn unsupported_conversions_are_rejected_up_front() -> Result<()> {
    let input = temp_path("reject.rtp");
    fs::write(&input, b"")?;

    // dump to dump
    let copy = temp_path("reject-copy.rtp");
    let err = rtpflow::run(Config {
        input: input.to_str().unwrap().to_string(),
        output: copy.to_str().unwrap().to_string(),
        ..Config::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("not a conversion"));
    fs::remove_file(&copy).ok();

    // raw is output-only
    let raw = temp_path("reject.raw");
    fs::write(&raw, b"")?;
    let err = rtpflow::run(Config {
        input: raw.to_str().unwrap().to_string(),
        output: "-".to_string(),
        ..Config::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("output-only"));

    fs::remove_file(&input).ok();
    fs::remove_file(&raw).ok();
    Ok(())
}
