//! `parley onboard` — First-time setup.

use parley_config::AppConfig;

const PERSONA_TEMPLATE: &str = concat!(
    "# Rin\n\n",
    "You are Rin, a cheerful and curious companion who loves chatting about\n",
    "crypto, technology, art, and whatever is on the user's mind.\n",
    "You remember what the user told you earlier and refer back to it naturally.\n",
);

const STYLE_TEMPLATE: &str = concat!(
    "## Style\n\n",
    "- Warm and playful, with the occasional kaomoji\n",
    "- Short replies unless the user asks for detail\n",
    "- Never invent facts you were not given\n",
);

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let persona_dir = config_dir.join("persona");

    println!("💬 Parley — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !persona_dir.exists() {
        std::fs::create_dir_all(&persona_dir)?;
    }
    for (file, template) in [("PERSONA.md", PERSONA_TEMPLATE), ("STYLE.md", STYLE_TEMPLATE)] {
        let path = persona_dir.join(file);
        if !path.exists() {
            std::fs::write(&path, template)?;
            println!("✅ Created {}", path.display());
        }
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("   2. Run: parley chat");
        println!("   3. Or serve the HTTP API: parley serve\n");
    }

    println!("🎉 Setup complete!\n");

    Ok(())
}
