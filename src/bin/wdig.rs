use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use wiredns::wire::{DnsClass, RecordType};
use wiredns::{
    https, tcp, tls, udp_with_fallback, HttpsOptions, Name, Query, TcpOptions, TlsOptions,
    UdpOptions, Verify,
};

#[derive(Debug, Deserialize, Clone)]
struct Config {
    #[serde(default = "default_server")]
    server: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    /// Skip certificate verification for the TLS-based transports.
    #[serde(default)]
    insecure: bool,
    #[serde(default)]
    server_hostname: Option<String>,
}

fn default_server() -> String {
    "8.8.8.8".to_string()
}
fn default_port() -> u16 {
    53
}
fn default_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            insecure: false,
            server_hostname: None,
        }
    }
}

impl Config {
    fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transport {
    Udp,
    Tcp,
    Tls,
    Https,
    Quic,
}

fn parse_rdtype(text: &str) -> anyhow::Result<RecordType> {
    let rdtype = match text.to_ascii_uppercase().as_str() {
        "A" => RecordType::A,
        "AAAA" => RecordType::AAAA,
        "NS" => RecordType::NS,
        "CNAME" => RecordType::CNAME,
        "SOA" => RecordType::SOA,
        "PTR" => RecordType::PTR,
        "MX" => RecordType::MX,
        "TXT" => RecordType::TXT,
        "SRV" => RecordType::SRV,
        "ANY" => RecordType::ANY,
        other => match other.strip_prefix("TYPE") {
            Some(number) => RecordType::from(number.parse::<u16>()?),
            None => anyhow::bail!("unknown record type '{}'", text),
        },
    };
    Ok(rdtype)
}

fn usage() -> ! {
    eprintln!("usage: wdig [--config <file>] [@server] [--tcp|--tls|--https|--quic] <name> [type]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wiredns=info".into()),
        )
        .init();

    let mut config = Config::default();
    let mut transport = Transport::Udp;
    let mut name = None;
    let mut rdtype = RecordType::A;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().unwrap_or_else(|| usage());
                config = Config::load(&path)?;
                info!("Config loaded from {}", path);
            }
            "--udp" => transport = Transport::Udp,
            "--tcp" => transport = Transport::Tcp,
            "--tls" => transport = Transport::Tls,
            "--https" => transport = Transport::Https,
            "--quic" => transport = Transport::Quic,
            server if server.starts_with('@') => config.server = server[1..].to_string(),
            value if name.is_none() => name = Some(value.to_string()),
            value => rdtype = parse_rdtype(value)?,
        }
    }
    let name = name.unwrap_or_else(|| usage());

    let query = Query::new(Name::from_text(&name)?, rdtype, DnsClass::IN);
    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let verify = if config.insecure {
        Verify::Insecure
    } else {
        Verify::Default
    };

    let reply = match transport {
        Transport::Https => {
            https(
                &query,
                &config.server,
                HttpsOptions {
                    timeout,
                    verify,
                    ..Default::default()
                },
            )
            .await?
        }
        _ => {
            let server: IpAddr = config.server.parse().map_err(|_| {
                anyhow::anyhow!("server '{}' is not an IP address", config.server)
            })?;
            match transport {
                Transport::Udp => {
                    let (reply, used_tcp) = udp_with_fallback(
                        &query,
                        server,
                        UdpOptions {
                            timeout,
                            port: config.port,
                            ..Default::default()
                        },
                    )
                    .await?;
                    if used_tcp {
                        info!("reply was truncated, retried over TCP");
                    }
                    reply
                }
                Transport::Tcp => {
                    tcp(
                        &query,
                        server,
                        TcpOptions {
                            timeout,
                            port: config.port,
                            ..Default::default()
                        },
                    )
                    .await?
                }
                Transport::Tls => {
                    tls(
                        &query,
                        server,
                        TlsOptions {
                            timeout,
                            verify,
                            server_hostname: config.server_hostname.clone(),
                            ..Default::default()
                        },
                    )
                    .await?
                }
                Transport::Quic => {
                    #[cfg(feature = "doq")]
                    {
                        wiredns::quic(
                            &query,
                            server,
                            wiredns::QuicOptions {
                                timeout,
                                verify,
                                server_hostname: config.server_hostname.clone(),
                                ..Default::default()
                            },
                        )
                        .await?
                    }
                    #[cfg(not(feature = "doq"))]
                    {
                        return Err(wiredns::Error::NoDoq.into());
                    }
                }
                Transport::Https => unreachable!(),
            }
        }
    };

    if let Some(rtt) = reply.time {
        info!("reply in {:.1} ms", rtt.as_secs_f64() * 1000.0);
    }
    println!("{}", reply.to_text());
    Ok(())
}
