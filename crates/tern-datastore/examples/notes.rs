//! Store a few notes and list the open ones.
//!
//! Reads `.tern/config.toml` from the current directory (and the user's
//! home), so the same program runs against either backend:
//!
//! ```text
//! cargo run -p tern-datastore --example notes
//! TERN_BACKEND=remote TERN_PROJECT_ID=demo cargo run -p tern-datastore --example notes
//! ```

use serde::{Deserialize, Serialize};
use tern_config::Config;
use tern_datastore::{Client, DatastoreError};
use tern_telemetry::{LogConfig, setup_logging};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct Note {
    text: String,
    done: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(Some(&std::env::current_dir()?))?;
    let log_config = LogConfig::from_config(&config.logging)?;
    if let Err(e) = setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let client = Client::from_config(&config).await?;
    for (text, done) in [("buy milk", false), ("file taxes", true), ("call home", false)] {
        let key = client
            .put(&client.incomplete_key("Note", None)?, &Note { text: text.into(), done })
            .await?;
        info!(%key, "stored note");
    }

    let mut it = client.run(&client.new_query("Note").filter("done", false));
    loop {
        match it.next::<Note>().await {
            Ok((key, note)) => println!("{key}: {}", note.text),
            Err(DatastoreError::Done) => break,
            Err(e) => return Err(e.into()),
        }
    }
    client.close()?;
    Ok(())
}
