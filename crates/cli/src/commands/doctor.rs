//! `parley doctor` — Diagnose configuration and collaborator health.

use parley_config::AppConfig;
use parley_core::knowledge::KnowledgeEnricher;
use parley_core::persona::Persona;
use parley_core::store::ConversationStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Parley Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `parley onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — set OPENROUTER_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    let persona = Persona::load(&config.persona_source());
    if persona.loaded_files.is_empty() {
        println!("  ✅ Persona: {} (built-in)", persona.name);
    } else {
        println!("  ✅ Persona: {} ({} file(s))", persona.name, persona.loaded_files.len());
    }

    match parley_store::build_from_config(&config).await {
        Ok(store) => match store.health_check().await {
            Ok(true) => println!("  ✅ Store reachable ({})", store.name()),
            Ok(false) | Err(_) => {
                println!("  ❌ Store opened but health check failed ({})", store.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Store unreachable: {e}");
            issues += 1;
        }
    }

    match parley_knowledge::build_from_config(&config) {
        Ok(None) => println!("  ✅ Knowledge enrichment disabled"),
        Ok(Some(enricher)) => match enricher.health_check().await {
            Ok(true) => println!("  ✅ Knowledge service reachable ({})", config.knowledge.endpoint),
            Ok(false) | Err(_) => {
                println!("  ⚠️  Knowledge service not answering ({})", config.knowledge.endpoint);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Knowledge enricher misconfigured: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
