use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasker_prompts::models::{ActionPromptRequest, CommandRecord, PromptOptions, StepRecord};
use tasker_prompts::{create_prompt_manager, ContextStore, MemoryContextStore, PromptManagerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = PromptManagerConfig::from_env();

    // Seed a session with one completed step
    let store = Arc::new(MemoryContextStore::new());
    let session_id = "demo-session";
    store.start_session(session_id, 3);
    store.set_page_state(session_id, "<html><body><a href=\"/cart\">Cart</a></body></html>");
    store.record_step(
        session_id,
        StepRecord::new(0, "Open https://shop.example.com", true).with_command(
            CommandRecord::new("navigate", true).with_result("Loaded shop.example.com"),
        ),
    );

    let manager = create_prompt_manager(
        config,
        Some(store.clone() as Arc<dyn ContextStore>),
        None,
    )?;

    let request = ActionPromptRequest::new(session_id, 1, "Open the shopping cart", 3)
        .with_options(PromptOptions {
            include_validation: true,
            ..Default::default()
        });
    let prompt = manager.generate_action_prompt(&request).await?;

    tracing::info!(
        "Generated prompt {} with quality {:?}",
        prompt.prompt_id,
        prompt.metadata.quality_score
    );
    println!("{}", serde_json::to_string_pretty(&prompt)?);

    Ok(())
}
