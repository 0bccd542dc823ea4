//! Push-to-talk demo - drive a voice session from the command line.
//!
//! This example demonstrates:
//! - Starting a client against a project endpoint
//! - Watching connection and dialog state changes
//! - Enabling the turn and streaming synthetic audio
//! - Receiving forwarded server events
//!
//! # Running
//!
//! ```sh
//! VOICEWIRE_SERVER=wss://voice.example.com \
//! VOICEWIRE_PROJECT=my-project \
//! VOICEWIRE_KEY=secret \
//! cargo run --example push-to-talk
//! ```

use std::time::Duration;

use serde_json::json;
use voicewire_client::{Client, ClientEvent, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicewire_client=debug".into()),
        )
        .init();

    let config = Config {
        server: std::env::var("VOICEWIRE_SERVER")?,
        project_id: std::env::var("VOICEWIRE_PROJECT")?,
        ..Config::default()
    };
    let auth = json!({"key": std::env::var("VOICEWIRE_KEY")?});

    let client = Client::start(auth, config)?;
    let mut events = client.take_events().expect("first take");
    let mut states = client.connection_states();

    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            println!("connection: {}", *states.borrow());
        }
    });

    client.turn(true);

    // Stream one second of silence as stand-in microphone input and drain
    // whatever the server replies with.
    let mut playback = vec![0.0f32; 882];
    for _ in 0..50 {
        client.write_audio(&[0.0f32; 882]);
        client.read_audio(&mut playback);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(2), events.recv()).await
    {
        match event {
            ClientEvent::Event { name, payload } => println!("event {}: {}", name, payload),
            ClientEvent::Error(e) => println!("error: {}", e),
        }
    }

    client.turn(false);
    client.stop();
    Ok(())
}
