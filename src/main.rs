//! Proofline demo
//!
//! Opens a session on a short text, runs every channel, prints what was
//! found, then accepts the first suggestion and dismisses the next one.
//!
//! ```text
//! proofline [config.yaml] [text...]
//! ```

use std::error::Error;
use std::sync::Arc;

use proofline::{providers_from_config, EngineConfig, RecordingSurface, Session};
use tracing_subscriber::EnvFilter;

const SAMPLE: &str = "Teh report was very unique.\nWe should of checked the grammer before sending it.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1).peekable();
    let mut config = match args.next_if(|arg| arg.ends_with(".yaml") || arg.ends_with(".yml")) {
        Some(path) => EngineConfig::from_file(&path)?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;
    let text: String = {
        let rest: Vec<String> = args.collect();
        if rest.is_empty() {
            SAMPLE.to_string()
        } else {
            rest.join(" ")
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let surface = Arc::new(RecordingSurface::new());
    let session = Session::builder("demo", 1)
        .providers(providers_from_config(&config)?)
        .surface(surface.clone())
        .config(config)
        .open(text)
        .await?;

    session.on_focus()?;
    session.run_until_idle().await?;

    let found = session.suggestions();
    println!("{} suggestion(s) for:\n{}\n", found.len(), session.text());
    for suggestion in &found {
        println!(
            "  [{:>3}..{:<3}] {:<9} {:?} -> {:?}  {}",
            suggestion.range.start,
            suggestion.range.end,
            suggestion.channel.as_str(),
            suggestion.original_text.as_deref().unwrap_or(""),
            suggestion.suggested_text.as_deref().unwrap_or(""),
            suggestion.explanation,
        );
    }

    if let Some(first) = found.first() {
        let outcome = session.accept_suggestion(&first.id, None).await?;
        println!("\naccepted {}:\n{}", first.id, outcome.new_text);
    }
    if let Some(next) = session.suggestions().first() {
        session.dismiss_suggestion(&next.id).await?;
        println!("\ndismissed {}", next.id);
    }

    println!("\n{} suggestion(s) remain", session.suggestions().len());
    if let Some(decorations) = surface.last_decorations() {
        println!("{} decoration(s) on the surface", decorations.len());
    }
    session.close();
    Ok(())
}
