use climate_monitor::status::{create_http_post_request, Status};
use embassy_net::{tcp::TcpSocket, Ipv4Address, Stack};
use embassy_sync::pubsub::WaitResult;
use esp_wifi::wifi::{WifiDevice, WifiStaDevice};

use crate::CHANNELS;

const POST_ENDPOINT_IP: &str = env!("POST_ENDPOINT_IP");
const POST_ENDPOINT_PORT: &str = env!("POST_ENDPOINT_PORT");
const TIMEOUT_SECS: u64 = 30;

/// Mirrors every display status to the configured endpoint. Updates that
/// arrive while the network is down are dropped.
#[embassy_executor::task]
pub async fn post_updates(stack: &'static Stack<WifiDevice<'static, WifiStaDevice>>) {
    let Ok(mut subscriber) = CHANNELS.status.subscriber() else {
        log::error!("No subscriber slot left for status updates");
        return;
    };

    let (Some(endpoint_ip), Ok(endpoint_port)) =
        (parse_ip(POST_ENDPOINT_IP), POST_ENDPOINT_PORT.parse::<u16>())
    else {
        log::error!(
            "Invalid status endpoint {}:{}, not posting updates",
            POST_ENDPOINT_IP,
            POST_ENDPOINT_PORT
        );
        return;
    };

    log::info!(
        "Posting status to IP: {:?} Port: {}",
        endpoint_ip,
        endpoint_port
    );

    loop {
        match subscriber.next_message().await {
            WaitResult::Message(status) => {
                if !stack.is_link_up() || stack.config_v4().is_none() {
                    log::debug!("Network down, status {} not posted", status.state);
                    continue;
                }
                post_data(stack, endpoint_ip, endpoint_port, &status).await;
            }
            WaitResult::Lagged(lag_count) => {
                log::warn!("Status upload lagging, {} updates skipped", lag_count);
            }
        }
    }
}

fn parse_ip(ip: &str) -> Option<Ipv4Address> {
    let mut octets = [0u8; 4];
    let mut parts = ip.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Address::new(octets[0], octets[1], octets[2], octets[3]))
}

async fn post_data(
    stack: &'static Stack<WifiDevice<'static, WifiStaDevice>>,
    ip: Ipv4Address,
    port: u16,
    status: &Status,
) {
    let mut rx_buf = [0; 1024];
    let mut tx_buf = [0; 1024];
    let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
    socket.set_timeout(Some(embassy_time::Duration::from_secs(TIMEOUT_SECS)));

    if let Err(e) = socket.connect((ip, port)).await {
        log::error!("Failed to connect to server: {:?}", e);
        return;
    }

    log::debug!("connected...");

    let Ok(request) = create_http_post_request(status) else {
        log::error!("Failed to create HTTP request");
        return;
    };

    if let Err(e) = write_all(&mut socket, request.as_bytes()).await {
        log::error!("Failed to write to server: {:?}", e);
        return;
    }

    let mut buf = [0; 512];
    let n = match socket.read(&mut buf).await {
        Ok(0) => {
            log::error!("Server closed connection");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            log::error!("Failed to read from server: {:?}", e);
            return;
        }
    };

    log::info!(
        "response from server: {}",
        core::str::from_utf8(&buf[..n])
            .unwrap_or("<non utf8>")
            .lines()
            .next()
            .unwrap_or("")
    );
    socket.close();
}

async fn write_all(socket: &mut TcpSocket<'_>, buf: &[u8]) -> Result<(), embassy_net::tcp::Error> {
    let mut buf = buf;
    while !buf.is_empty() {
        match socket.write(buf).await {
            Ok(0) => return Err(embassy_net::tcp::Error::ConnectionReset),
            Ok(n) => buf = &buf[n..],
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
