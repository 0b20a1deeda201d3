//! Interactive terminal front-end.
//!
//! Presentation only: a readline loop that submits utterances to the
//! orchestrator and renders live [`TurnUpdate`] notifications with colored
//! output. All turn logic lives in the orchestrator.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::capabilities::{self, Business};
use crate::config::Config;
use crate::error::Result;
use crate::geo::{GeoResolver, GeolocationProvider, HttpReverseGeocoder, ReverseGeocoder, StaticPosition};
use crate::orchestrator::{SubmitOutcome, TurnOrchestrator, TurnUpdate};
use crate::store::SledStore;
use crate::title::HttpTitleClient;
use crate::transcript::{Message, MessageContent, Role};

/// Wire the production orchestrator from configuration.
pub fn build_orchestrator(config: &Config) -> Result<TurnOrchestrator> {
    let http = capabilities::build_http_client(Duration::from_secs(
        config.http.request_timeout_seconds,
    ))?;

    let router = Arc::new(capabilities::build_router(&config.endpoints, http.clone()));

    let store = Arc::new(SledStore::new(config.storage.resolve_path()?)?);

    let provider: Arc<dyn GeolocationProvider> = match config.geolocation.static_position {
        Some(coords) => Arc::new(StaticPosition::new(coords)),
        None => Arc::new(StaticPosition::denied()),
    };
    let geocoder: Option<Arc<dyn ReverseGeocoder>> =
        config.geolocation.reverse_geocoder.as_ref().map(|endpoint| {
            Arc::new(HttpReverseGeocoder::new(
                http.clone(),
                endpoint.base_url.clone(),
            )) as Arc<dyn ReverseGeocoder>
        });
    let geo = GeoResolver::new(
        provider,
        geocoder,
        Duration::from_secs(config.geolocation.timeout_seconds),
    );

    let title = Arc::new(HttpTitleClient::new(
        http,
        config.title.clone(),
        store.clone(),
    ));

    Ok(TurnOrchestrator::new(
        router,
        store,
        geo,
        title,
        config.owner_id.clone(),
    ))
}

/// Run the interactive readline loop until the user exits.
pub async fn run_chat(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;

    println!(
        "{}",
        "tern - type a message, or 'exit' to quit".bright_black()
    );

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline(&format!("{} ", "you>".green().bold())) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "exit" || input == "quit" {
                    break;
                }
                rl.add_history_entry(input)?;
                submit_and_render(&orchestrator, input).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Interrupted. Type 'exit' to quit.".bright_black());
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                tracing::error!("readline error: {}", err);
                break;
            }
        }
    }

    println!("{}", "Goodbye.".bright_black());
    Ok(())
}

/// Submit one message, print the response, and exit.
pub async fn run_once(config: Config, message: String) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    submit_and_render(&orchestrator, &message).await;
    Ok(())
}

async fn submit_and_render(orchestrator: &TurnOrchestrator, input: &str) {
    // Tracks how much streamed text is already on screen so only the delta
    // is printed per chunk.
    let mut printed = 0usize;
    let mut streamed = false;

    let outcome = orchestrator
        .submit_with(input, |update| match update {
            TurnUpdate::Status(text) => {
                println!("{}", text.bright_black().italic());
            }
            TurnUpdate::StreamStarted => {
                streamed = true;
                print!("{} ", "tern>".blue().bold());
                let _ = std::io::stdout().flush();
            }
            TurnUpdate::StreamContent(content) => {
                if content.len() > printed {
                    print!("{}", &content[printed..]);
                    printed = content.len();
                    let _ = std::io::stdout().flush();
                }
            }
            TurnUpdate::Message(message) => {
                if message.role == Role::Assistant {
                    if streamed {
                        // The streamed text is already on screen.
                        println!();
                    } else {
                        print_assistant_message(message);
                    }
                }
            }
            TurnUpdate::Phase(_) => {}
        })
        .await;

    if outcome == SubmitOutcome::Busy {
        println!(
            "{}",
            "A response is still in progress; please wait.".yellow()
        );
    }
}

fn print_assistant_message(message: &Message) {
    let prefix = "tern>".blue().bold();
    match &message.content {
        MessageContent::Text { text } => println!("{} {}", prefix, text),
        MessageContent::Structured { kind, payload } => {
            println!("{}", prefix);
            print!("{}", render_structured(kind, payload));
        }
    }
}

/// Render a structured payload for the terminal.
///
/// Business lists get a dedicated list view; other record kinds fall back to
/// labeled key/value lines.
fn render_structured(kind: &str, payload: &serde_json::Value) -> String {
    if kind == "local_businesses" {
        if let Some(businesses) = payload
            .get("businesses")
            .and_then(|v| serde_json::from_value::<Vec<Business>>(v.clone()).ok())
        {
            return render_businesses(&businesses);
        }
    }

    let mut out = format!("  [{}]\n", kind);
    if let Some(fields) = payload.as_object() {
        for (key, value) in fields {
            match value {
                serde_json::Value::Array(items) => {
                    out.push_str(&format!("  {}:\n", key));
                    for item in items {
                        out.push_str(&format!("    - {}\n", display_value(item)));
                    }
                }
                other => out.push_str(&format!("  {}: {}\n", key, display_value(other))),
            }
        }
    }
    out
}

fn render_businesses(businesses: &[Business]) -> String {
    if businesses.is_empty() {
        return "  No matching places found.\n".to_string();
    }
    let mut out = String::new();
    for (index, business) in businesses.iter().enumerate() {
        let mut line = format!("  {}. {}", index + 1, business.name);
        if let Some(rating) = business.rating {
            line.push_str(&format!(" ({:.1}/5)", rating));
        }
        if business.open_now == Some(true) {
            line.push_str(" - open now");
        }
        out.push_str(&line);
        out.push('\n');
        if let Some(address) = &business.address {
            out.push_str(&format!("     {}\n", address));
        }
        if let Some(phone) = &business.phone {
            out.push_str(&format!("     {}\n", phone));
        }
        if let Some(website) = &business.website {
            out.push_str(&format!("     {}\n", website));
        }
    }
    out
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_businesses_list() {
        let businesses = vec![
            Business {
                name: "Luigi's".to_string(),
                address: Some("12 Main St".to_string()),
                phone: None,
                rating: Some(4.5),
                open_now: Some(true),
                website: None,
            },
            Business {
                name: "Santarpio's".to_string(),
                address: None,
                phone: None,
                rating: None,
                open_now: None,
                website: None,
            },
        ];
        let rendered = render_businesses(&businesses);
        assert!(rendered.contains("1. Luigi's (4.5/5) - open now"));
        assert!(rendered.contains("12 Main St"));
        assert!(rendered.contains("2. Santarpio's"));
    }

    #[test]
    fn test_render_businesses_empty() {
        assert!(render_businesses(&[]).contains("No matching places"));
    }

    #[test]
    fn test_render_structured_record() {
        let payload = serde_json::json!({
            "destination": "the airport",
            "distance": "12.4 km",
            "steps": ["Head north", "Take exit 4"],
        });
        let rendered = render_structured("directions", &payload);
        assert!(rendered.contains("[directions]"));
        assert!(rendered.contains("destination: the airport"));
        assert!(rendered.contains("- Head north"));
    }

    #[test]
    fn test_render_structured_business_payload() {
        let payload = serde_json::json!({
            "businesses": [{"name": "Cafe Lumen"}]
        });
        let rendered = render_structured("local_businesses", &payload);
        assert!(rendered.contains("1. Cafe Lumen"));
    }
}
