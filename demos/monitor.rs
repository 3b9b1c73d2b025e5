use daikin_bridge::{DeviceSessionBuilder, MessageLogMode, SessionEvent};
use std::env;

#[tokio::main]
async fn main() -> daikin_bridge::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).expect("usage: monitor <host[:port]> [--log <file>]");
    let log_path = args
        .iter()
        .position(|a| a == "--log")
        .and_then(|i| args.get(i + 1));

    let address = if host.contains(':') {
        format!("ws://{host}")
    } else {
        format!("ws://{host}:81")
    };

    let mut builder = DeviceSessionBuilder::fixed("monitor", address.as_str());
    if let Some(path) = log_path {
        builder = builder.message_log(MessageLogMode::Diffed, path.as_str());
    }
    let session = builder.spawn();
    let mut events = session.subscribe();

    println!("Connecting to {address}...");
    loop {
        match events.recv().await {
            Ok(SessionEvent::Status(status)) => println!("Connection: {status:?}"),
            Ok(SessionEvent::Document(doc)) => {
                println!(
                    "{:.1}\u{00b0}C / {:.1}% RH | mode: {} | fan: {}",
                    doc["currentTemperature"].as_f64().unwrap_or(0.0),
                    doc["currentHumidity"].as_f64().unwrap_or(0.0),
                    doc["targetMode"].as_str().unwrap_or("?"),
                    doc["targetFanSpeed"].as_str().unwrap_or("?"),
                );
            }
            Err(_) => break,
        }
    }
    Ok(())
}
