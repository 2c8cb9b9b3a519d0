use opentpt::hal::sim::{SimBridge, SimSupply};
use opentpt::Instrument;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

// IEEE 488.2 raw-socket port.
const TCP_PORT: u16 = 5025;

type SimInstrument = Instrument<SimBridge, SimSupply>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("OPEN_TPT instrument simulator");
    println!("=============================");

    // One instrument behind one lock keeps the hardware model serialized:
    // exactly one command is ever in flight, like on the real board.
    let instrument = Arc::new(Mutex::new(SimInstrument::new(
        SimBridge::new(),
        SimSupply::new(),
    )));

    let listener = TcpListener::bind(format!("127.0.0.1:{TCP_PORT}")).await?;
    info!("SCPI server listening on port {}", TCP_PORT);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("client connected: {}", addr);
                let client_instrument = Arc::clone(&instrument);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_instrument).await {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    instrument: Arc<Mutex<SimInstrument>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);

    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                info!("received: {}", trimmed);

                let response = {
                    let mut guard = instrument.lock().await;
                    guard.dispatch(trimmed)
                };

                if let Some(response) = response {
                    writer.write_all(response.as_bytes()).await?;
                    writer.write_all(b"\r\n").await?;
                    info!("sent: {}", &response[..]);
                }
            }
            Err(e) => {
                error!("error reading from client: {}", e);
                break;
            }
        }
    }
    Ok(())
}
