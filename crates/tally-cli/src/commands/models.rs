//! Model listing command

use anyhow::Result;

use tally_core::StatementAnalyzer;

pub async fn cmd_models(analyzer: &StatementAnalyzer) -> Result<()> {
    let dispatcher = analyzer.dispatcher();
    let registry = dispatcher.registry();

    println!("📚 Registry (default: {})\n", registry.default_model().id);
    for model in registry.models() {
        let capabilities: Vec<&str> = model.capabilities.iter().map(String::as_str).collect();
        println!(
            "   {:<34} max input {:>6}  [{}]{}",
            model.id,
            model.max_input_tokens,
            capabilities.join(", "),
            model
                .substitute
                .as_deref()
                .map(|s| format!("  -> {}", s))
                .unwrap_or_default()
        );
    }

    let listings = dispatcher.list_models().await;
    if listings.is_empty() {
        println!("\n⚠️  No provider answered the model listing");
        return Ok(());
    }

    for listing in listings {
        println!("\n🌐 {} ({} models)", listing.provider, listing.models.len());
        for model in &listing.models {
            if let Some(id) = model.get("id").and_then(|v| v.as_str()) {
                println!("   {}", id);
            }
        }
    }
    Ok(())
}
