//! Zone-transfer engine tests against miniature localhost servers.

mod common;

use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use common::{answer, build_response, soa};
use wiredns::wire::{DnsClass, Rdata, RecordType};
use wiredns::xfr::{self, SoaWatcher, XfrOptions};
use wiredns::{inbound_xfr, Error, Name, UdpMode, WireError};

const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.unwrap();
    let mut wire = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut wire).await.unwrap();
    wire
}

async fn write_frame(stream: &mut TcpStream, wire: &[u8]) {
    stream
        .write_all(&(wire.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(wire).await.unwrap();
}

fn ns_answer(target: &str) -> common::TestAnswer {
    answer(
        "example.org",
        RecordType::NS,
        3600,
        Rdata::Ns(Name::from_text(target).unwrap()),
    )
}

/// Serve an AXFR-style transfer split across two framed messages.
async fn axfr_tcp_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let query = read_frame(&mut stream).await;
        let first = build_response(
            &query,
            &[
                answer("example.org", RecordType::SOA, 3600, soa(2024010101)),
                ns_answer("ns1.example.org"),
                ns_answer("ns2.example.org"),
            ],
            false,
        );
        write_frame(&mut stream, &first).await;
        let second = build_response(
            &query,
            &[answer("example.org", RecordType::SOA, 3600, soa(2024010101))],
            false,
        );
        write_frame(&mut stream, &second).await;
    });
    port
}

#[tokio::test]
async fn test_axfr_over_tcp_yields_each_message() {
    let port = axfr_tcp_server().await;
    let zone = Name::from_text("example.org").unwrap();
    let mut stream = xfr::xfr(
        LOCALHOST,
        &zone,
        DnsClass::IN,
        false,
        XfrOptions {
            port,
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let first = stream.next_message().await.unwrap().unwrap();
    assert_eq!(first.answer.len(), 3);
    assert_eq!(first.answer[0].rdtype, RecordType::SOA);
    let second = stream.next_message().await.unwrap().unwrap();
    assert_eq!(second.answer.len(), 1);
    assert!(stream.next_message().await.unwrap().is_none());
}

#[tokio::test]
async fn test_inbound_xfr_drains() {
    let port = axfr_tcp_server().await;
    let mut watcher = SoaWatcher::new(Name::from_text("example.org").unwrap(), DnsClass::IN);
    inbound_xfr(
        LOCALHOST,
        &mut watcher,
        None,
        XfrOptions {
            port,
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_ixfr_udp_up_to_date() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        // a lone SOA means "you are already current"
        let reply = build_response(
            &buf[..len],
            &[answer("example.org", RecordType::SOA, 3600, soa(2024010101))],
            false,
        );
        sock.send_to(&reply, peer).await.unwrap();
    });

    let zone = Name::from_text("example.org").unwrap();
    let mut stream = xfr::xfr(
        LOCALHOST,
        &zone,
        DnsClass::IN,
        true,
        XfrOptions {
            port,
            timeout: Some(Duration::from_secs(5)),
            rdtype: RecordType::IXFR,
            serial: 2024010101,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let only = stream.next_message().await.unwrap().unwrap();
    assert_eq!(only.answer.len(), 1);
    assert!(stream.next_message().await.unwrap().is_none());
}

#[tokio::test]
async fn test_ixfr_udp_falls_back_to_tcp() {
    // UDP replies with something that is not an incremental transfer;
    // the engine must close the socket and restart over TCP
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let udp_sock = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = udp_sock.recv_from(&mut buf).await.unwrap();
        let reply = build_response(&buf[..len], &[ns_answer("ns1.example.org")], false);
        udp_sock.send_to(&reply, peer).await.unwrap();
    });
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let query = read_frame(&mut stream).await;
        let full = build_response(
            &query,
            &[
                answer("example.org", RecordType::SOA, 3600, soa(2024010102)),
                ns_answer("ns1.example.org"),
                answer("example.org", RecordType::SOA, 3600, soa(2024010102)),
            ],
            false,
        );
        write_frame(&mut stream, &full).await;
    });

    let mut watcher = SoaWatcher::new(Name::from_text("example.org").unwrap(), DnsClass::IN);
    let query = xfr::make_query(&watcher, RecordType::IXFR, 2024010101).unwrap();
    let mut stream = xfr::XfrStream::start(
        LOCALHOST,
        Box::new(&mut watcher),
        Some(query),
        XfrOptions {
            port,
            timeout: Some(Duration::from_secs(5)),
            udp_mode: UdpMode::TryFirst,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // the UDP reply that triggered the fallback is not yielded
    let first = stream.next_message().await.unwrap().unwrap();
    assert_eq!(first.answer.len(), 3);
    assert!(stream.next_message().await.unwrap().is_none());
}

#[tokio::test]
async fn test_ixfr_udp_only_surfaces_use_tcp() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        let reply = build_response(&buf[..len], &[ns_answer("ns1.example.org")], false);
        sock.send_to(&reply, peer).await.unwrap();
    });

    let zone = Name::from_text("example.org").unwrap();
    let mut stream = xfr::xfr(
        LOCALHOST,
        &zone,
        DnsClass::IN,
        true,
        XfrOptions {
            port,
            timeout: Some(Duration::from_secs(5)),
            rdtype: RecordType::IXFR,
            serial: 2024010101,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let err = stream.next_message().await.unwrap_err();
    assert!(matches!(err, Error::UseTcp));
}

#[tokio::test]
async fn test_signed_query_requires_final_tsig() {
    let port = axfr_tcp_server().await;
    let mut watcher = SoaWatcher::new(Name::from_text("example.org").unwrap(), DnsClass::IN);
    let mut query = xfr::make_query(&watcher, RecordType::AXFR, 0).unwrap();
    query.attach_tsig(
        Name::from_text("transfer-key").unwrap(),
        Rdata::Tsig {
            algorithm: Name::from_text("hmac-sha256").unwrap(),
            time_signed: 1_700_000_000,
            fudge: 300,
            mac: vec![0xab; 32],
            original_id: query.id,
            error: 0,
            other: Vec::new(),
        },
    );
    let err = inbound_xfr(
        LOCALHOST,
        &mut watcher,
        Some(query),
        XfrOptions {
            port,
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Wire(WireError::MissingTsig)));
}

#[tokio::test]
async fn test_transfer_timeout() {
    // the server sends one message and then goes silent
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let query = read_frame(&mut stream).await;
        let first = build_response(
            &query,
            &[
                answer("example.org", RecordType::SOA, 3600, soa(2024010101)),
                ns_answer("ns1.example.org"),
            ],
            false,
        );
        write_frame(&mut stream, &first).await;
        // keep the connection open without sending the final message
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let zone = Name::from_text("example.org").unwrap();
    let mut stream = xfr::xfr(
        LOCALHOST,
        &zone,
        DnsClass::IN,
        false,
        XfrOptions {
            port,
            timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(stream.next_message().await.unwrap().is_some());
    let err = stream.next_message().await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
}
