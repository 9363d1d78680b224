// Serves one vibration burst to every relay that connects:
//   haptic-ws-feed [addr] [amplitude] [ratio] [seconds]
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy)]
struct Burst {
    amplitude: i64,
    ratio: f64,
    seconds: u64,
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:8765".to_string());
    let burst = Burst {
        amplitude: args.next().and_then(|a| a.parse().ok()).unwrap_or(150),
        ratio: args.next().and_then(|a| a.parse().ok()).unwrap_or(70.0),
        seconds: args.next().and_then(|a| a.parse().ok()).unwrap_or(3),
    };

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", addr, e);
            std::process::exit(2);
        }
    };
    eprintln!("Listening on ws://{}/ ; point the relay at it with:", addr);
    eprintln!(
        "{}",
        json!({"key": "websocket", "action": "connect", "data": format!("ws://{}/", addr)})
    );

    loop {
        match listener.accept().await {
            Ok((tcp, peer)) => {
                eprintln!("Relay connected from {}", peer);
                tokio::spawn(serve(tcp, burst));
            }
            Err(e) => eprintln!("Accept failed: {}", e),
        }
    }
}

async fn serve(tcp: TcpStream, burst: Burst) {
    let ws = match accept_async(tcp).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WS handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let on = json!({"status": "on", "amplitude": burst.amplitude, "vibration_ratio": burst.ratio});
    if let Err(e) = write.send(Message::Text(on.to_string())).await {
        eprintln!("WS send failed: {}", e);
        return;
    }
    println!("sent {}", on);

    // Keep reading so pings and close frames are answered
    tokio::select! {
        _ = sleep(Duration::from_secs(burst.seconds)) => {}
        _ = async { while let Some(Ok(_)) = read.next().await {} } => {
            eprintln!("Relay went away");
            return;
        }
    }

    let off = json!({"status": "off"});
    match write.send(Message::Text(off.to_string())).await {
        Ok(()) => println!("sent {}", off),
        Err(e) => eprintln!("WS send failed: {}", e),
    }
    let _ = write.send(Message::Close(None)).await;
}
