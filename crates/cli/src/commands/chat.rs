//! `nebula chat`: talk to the assistant from the terminal.

use nebula_core::message::{Conversation, ConversationId};
use std::io::Write;
use std::path::Path;
use tracing::warn;

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    if !config.has_api_key() {
        warn!("GOOGLE_API_KEY is not set; the assistant will reply with a support notice");
    }

    let (engine, _event_bus) = super::build_engine(&config).await;

    if let Some(msg) = message {
        // Single message mode
        let conversation = Conversation::new(ConversationId::new());

        eprint!("  Thinking...");
        let outcome = engine.run(conversation, &msg).await?;
        eprint!("\r              \r");
        println!("{}", outcome.response);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Nebula interactive chat");
    println!("  Model: {}", config.chat_model);
    println!("  Ask about Nebula, or paste a job posting URL.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut conversation = Conversation::new(ConversationId::new());
    let stdin = std::io::stdin();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        match engine.run(conversation.clone(), line).await {
            Ok(outcome) => {
                eprint!("\r     \r");
                println!();
                for out_line in outcome.response.lines() {
                    println!("  Nebula > {out_line}");
                }
                println!();
                conversation = outcome.conversation;
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
