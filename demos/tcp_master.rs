//! TCP master demo: read holding registers from a bridge module.
//!
//! ```bash
//! cargo run --example tcp_master -- 192.168.16.254:8899
//! ```
//!
//! Pass `--envelope` for bridges that expect the "wifi" header.

use std::sync::Arc;

use tokio::sync::Mutex;

use rtulink::{Request, StreamConnection, TcpConnector, Transaction, WifiEnvelope};

#[tokio::main]
async fn main() -> rtulink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtulink=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let addr: std::net::SocketAddr = args
        .next()
        .unwrap_or_else(|| "192.168.16.254:8899".into())
        .parse()
        .expect("address must look like ip:port");
    let enveloped = args.any(|arg| arg == "--envelope");

    let mut connection = StreamConnection::new(TcpConnector::new(addr));
    if enveloped {
        let tail_ip = match addr.ip() {
            std::net::IpAddr::V4(ip) => ip.octets()[3],
            std::net::IpAddr::V6(_) => 0,
        };
        connection = connection.with_envelope(WifiEnvelope::new(tail_ip));
    }
    let connection = Arc::new(Mutex::new(connection));

    let mut transaction = Transaction::new(connection);
    transaction.set_request(Request::read_holding_registers(1, 0x0000, 10));
    transaction.execute().await?;

    if let Some(response) = transaction.response() {
        println!("unit {} fc {:#04x}", response.unit_id(), response.function());
        let data = response.data();
        // First body byte is the register byte count.
        for (i, pair) in data[1..].chunks(2).enumerate() {
            if let [high, low] = pair {
                println!("  reg[{i}] = {}", u16::from_be_bytes([*high, *low]));
            }
        }
    }
    Ok(())
}
