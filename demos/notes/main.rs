//! Notes Application Demo
//!
//! This demo shows:
//! - Opening a versioned database and creating its stores
//! - Auto-increment and explicit keys
//! - Bounded enumeration in both directions
//! - A second session blocked by a version bump

use idbkv_core::{
    Config, CursorDirection, Database, DatabaseDescriptor, KeyOptions, KvError, MemoryHost,
    StoreDescriptor, VersionChangePolicy,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A note with tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    title: String,
    content: String,
    tags: Vec<String>,
}

fn note(title: &str, content: &str, tags: &[&str]) -> Note {
    Note {
        title: title.to_string(),
        content: content.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn descriptor(version: u32) -> DatabaseDescriptor {
    DatabaseDescriptor::new("notes_db", version)
        .store(StoreDescriptor::with_options(
            "notes",
            KeyOptions::new().auto_increment(true),
        ))
        .store(StoreDescriptor::new("settings"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Notes Application Demo");
    println!("======================\n");

    let host = MemoryHost::new();
    let config = Config::new().version_change(VersionChangePolicy::Close);
    let mut db = Database::with_config(host.clone(), descriptor(1), config);
    db.open().await?;
    info!(stores = ?db.store_names()?, "database ready");

    let notes = db.store("notes")?;
    let samples = [
        note("Meeting Notes", "Discussed Q4 roadmap and priorities.", &["work", "meeting"]),
        note("Recipe: Pasta", "Boil water, add pasta, cook for 10 minutes.", &["cooking"]),
        note("Book Ideas", "Write about embedded databases.", &["writing", "ideas"]),
        note("Project Checklist", "Setup, implementation, testing, deploy.", &["work"]),
    ];

    println!("Inserting {} notes...", samples.len());
    for sample in &samples {
        let key = notes.put(sample, None).await?;
        println!("  {key} -> {}", sample.title);
    }

    db.use_store("settings")?.set("theme", &"dark").await?;
    let theme: Option<String> = db.get("theme").await?;
    println!("\nTheme setting: {}", theme.unwrap_or_default());

    println!("\nNewest two notes:");
    let newest: Vec<(_, Note)> = notes.enumerate(2, CursorDirection::Prev).await?;
    for (key, note) in &newest {
        println!("  [{key}] {} ({})", note.title, note.tags.join(", "));
    }

    println!("\nWork notes:");
    let all: Vec<(_, Note)> = notes.entries().await?;
    for (key, note) in all.iter().filter(|(_, n)| n.tags.iter().any(|t| t == "work")) {
        println!("  [{key}] {}: {}", note.title, note.content);
    }

    if let Some((key, _)) = newest.first() {
        notes.delete(key.clone()).await?;
        println!("\nDeleted note {key}");
    }

    // A second session asks for version 2. The first handle is configured
    // to give way, so the upgrade proceeds and the first handle closes.
    let mut upgraded = Database::new(
        host.clone(),
        descriptor(2).store(StoreDescriptor::new("archive")),
    );
    upgraded.open().await?;
    println!(
        "\nUpgraded to version {} with stores {:?}",
        upgraded.version(),
        upgraded.store_names()?
    );

    match notes.entries::<Note>().await {
        Err(KvError::NotInitialized { database }) => {
            println!("Old handle on {database} was closed by the upgrade");
        }
        other => println!("Unexpected result from old handle: {other:?}"),
    }

    let remaining: Vec<(_, Note)> = upgraded.store("notes")?.entries().await?;
    println!("{} notes survive the upgrade", remaining.len());

    println!("\nDone.");
    Ok(())
}
