//! Transport tests against miniature localhost servers.

mod common;

use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

use common::{answer, build_response};
use wiredns::wire::{DnsClass, Rdata, RecordType};
use wiredns::{tcp, udp, udp_with_fallback, Error, Name, Query, TcpOptions, UdpOptions};

const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

fn a_query(name: &str) -> Query {
    Query::new(Name::from_text(name).unwrap(), RecordType::A, DnsClass::IN)
}

fn a_answer(name: &str) -> common::TestAnswer {
    answer(
        name,
        RecordType::A,
        300,
        Rdata::A("192.0.2.1".parse().unwrap()),
    )
}

async fn udp_server_once(answers_for: &str) -> (u16, tokio::task::JoinHandle<()>) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    let name = answers_for.to_string();
    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        let reply = build_response(&buf[..len], &[a_answer(&name)], false);
        sock.send_to(&reply, peer).await.unwrap();
    });
    (port, handle)
}

#[tokio::test]
async fn test_udp_query() {
    let (port, server) = udp_server_once("www.example.org").await;
    let query = a_query("www.example.org");
    let reply = udp(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.answer.len(), 1);
    assert_eq!(
        reply.answer[0].rdata,
        Some(Rdata::A("192.0.2.1".parse().unwrap()))
    );
    assert!(reply.time.is_some());
    server.await.unwrap();
}

#[tokio::test]
async fn test_udp_timeout() {
    // a server that never answers
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    let query = a_query("www.example.org");
    let err = udp(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_millis(50)),
            port,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn test_udp_truncation_raises() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        let reply = build_response(&buf[..len], &[], true);
        sock.send_to(&reply, peer).await.unwrap();
    });
    let query = a_query("www.example.org");
    let err = udp(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            raise_on_truncation: true,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    // the partial message still identifies itself as our response
    match err {
        Error::Truncated { message } => assert!(query.is_response(&message)),
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_udp_fallback_to_tcp() {
    // TCP and UDP servers share a port number on their own protocols
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let udp_sock = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = udp_sock.recv_from(&mut buf).await.unwrap();
        let reply = build_response(&buf[..len], &[], true);
        udp_sock.send_to(&reply, peer).await.unwrap();
    });
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut wire = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut wire).await.unwrap();
        let reply = build_response(&wire, &[a_answer("www.example.org")], false);
        stream
            .write_all(&(reply.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&reply).await.unwrap();
    });

    let query = a_query("www.example.org");
    let (reply, used_tcp) = udp_with_fallback(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(used_tcp);
    assert_eq!(reply.answer.len(), 1);
}

#[tokio::test]
async fn test_tcp_query() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut wire = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut wire).await.unwrap();
        let reply = build_response(&wire, &[a_answer("www.example.org")], false);
        stream
            .write_all(&(reply.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&reply).await.unwrap();
    });
    let query = a_query("www.example.org");
    let reply = tcp(
        &query,
        LOCALHOST,
        TcpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.answer.len(), 1);
    assert!(query.is_response(&reply));
}

#[tokio::test]
async fn test_udp_unexpected_source_raises() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        // answer from a different socket than the one that was queried
        let rogue = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reply = build_response(&buf[..len], &[a_answer("www.example.org")], false);
        rogue.send_to(&reply, peer).await.unwrap();
    });
    let query = a_query("www.example.org");
    let err = udp(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::UnexpectedSource { .. }));
}

#[tokio::test]
async fn test_udp_unexpected_source_skipped() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        let reply = build_response(&buf[..len], &[a_answer("www.example.org")], false);
        let rogue = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        rogue.send_to(&reply, peer).await.unwrap();
        sock.send_to(&reply, peer).await.unwrap();
    });
    let query = a_query("www.example.org");
    let reply = udp(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            ignore_unexpected: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.answer.len(), 1);
}

#[tokio::test]
async fn test_udp_ignore_errors_skips_mismatched_replies() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        let (len, peer) = sock.recv_from(&mut buf).await.unwrap();
        // junk first, then a reply with the wrong id, then the real one
        sock.send_to(b"not dns", peer).await.unwrap();
        let mut wrong_id = build_response(&buf[..len], &[], false);
        wrong_id[0] ^= 0xff;
        sock.send_to(&wrong_id, peer).await.unwrap();
        let reply = build_response(&buf[..len], &[a_answer("www.example.org")], false);
        sock.send_to(&reply, peer).await.unwrap();
    });
    let query = a_query("www.example.org");
    let reply = udp(
        &query,
        LOCALHOST,
        UdpOptions {
            timeout: Some(Duration::from_secs(5)),
            port,
            ignore_errors: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.answer.len(), 1);
}
