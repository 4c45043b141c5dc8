// ============================================================================
// echoes-db — CLI inspection tool for the local Echoes persona cache
// ============================================================================
// Usage:
//   echoes-db stats                 Show cache statistics
//   echoes-db list                  List cached personas
//   echoes-db show ID               Show one persona in full
//   echoes-db export --format json  Export the cache as JSON
//   echoes-db seed                  Load the bundled starter personas
//   echoes-db delete ID             Remove a persona from the cache
// ============================================================================

use anyhow::Result;
use clap::{Parser, Subcommand};
use echoes_core::{PersonaDb, PersonaStore};

/// Echoes persona cache inspection tool
#[derive(Parser)]
#[command(name = "echoes-db", version, about = "Inspect and manage the local Echoes persona cache")]
struct Cli {
    /// Path to the cache file (default: ~/.echoes/echoes.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache statistics (persona counts, cloned voices)
    Stats,

    /// List cached personas
    List,

    /// Show one persona in full
    Show {
        /// Persona id
        id: String,
    },

    /// Export the cache contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Load the bundled starter personas into the cache
    Seed,

    /// Remove a persona from the cache
    Delete {
        /// Persona id
        id: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db = PersonaDb::open(cli.db_path.as_deref())?;

    match cli.command {
        Commands::Stats => cmd_stats(&db),
        Commands::List => cmd_list(&db),
        Commands::Show { id } => cmd_show(&db, &id),
        Commands::Export { format } => cmd_export(&db, &format),
        Commands::Seed => cmd_seed(&db),
        Commands::Delete { id } => cmd_delete(&db, &id),
    }
}

fn cmd_stats(db: &PersonaDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Echoes Persona Cache Stats ===");
    println!("Cache: {}", db.path().display());
    println!();
    println!("Personas:      {}", stats.total_personas);
    println!("Cloned voices: {}", stats.with_voice_model);

    Ok(())
}

fn cmd_list(db: &PersonaDb) -> Result<()> {
    let mut personas = db.list_personas()?;
    personas.sort_by(|a, b| a.name.cmp(&b.name));

    if personas.is_empty() {
        println!("No personas cached. Run 'echoes-db seed' to load the starter set.");
        return Ok(());
    }

    for persona in &personas {
        let voice = match &persona.voice_model_id {
            Some(model_id) => format!("voice {}", model_id),
            None => "no voice".to_string(),
        };
        println!("{}  {:20} {}", persona.id, persona.name, voice);
    }

    Ok(())
}

fn cmd_show(db: &PersonaDb, id: &str) -> Result<()> {
    let Some(persona) = db.get_persona(id)? else {
        anyhow::bail!("Persona not found: {}", id);
    };

    println!("Id:          {}", persona.id);
    println!("Name:        {}", persona.name);
    println!("Description: {}", persona.description_prompt);
    println!(
        "Voice model: {}",
        persona.voice_model_id.as_deref().unwrap_or("(none)")
    );
    println!("Audio clips: {}", persona.audio_samples.len());
    for sample in &persona.audio_samples {
        match &sample.label {
            Some(label) => println!("  - {} ({})", sample.url, label),
            None => println!("  - {}", sample.url),
        }
    }
    println!("Seed messages: {}", persona.initial_conversation.len());

    Ok(())
}

fn cmd_export(db: &PersonaDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported export format '{}'. Only json is supported.", format);
    }

    let personas = db.list_personas()?;
    println!("{}", serde_json::to_string_pretty(&personas)?);

    Ok(())
}

fn cmd_seed(db: &PersonaDb) -> Result<()> {
    let store = PersonaStore::bundled()?;
    let personas = store.list();

    for persona in &personas {
        db.store_persona(persona)?;
    }

    println!("Seeded {} personas into {}", personas.len(), db.path().display());
    Ok(())
}

fn cmd_delete(db: &PersonaDb, id: &str) -> Result<()> {
    if db.delete_persona(id)? {
        println!("Deleted persona {}", id);
    } else {
        println!("Persona not found: {}", id);
    }
    Ok(())
}
