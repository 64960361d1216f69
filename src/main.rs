use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rubric_coach::evaluation::{fetch_game_from_api, load_game_data, render_evaluation};
use rubric_coach::library::{filter_rubrics, render_detailed, render_table};
use rubric_coach::{
    create_llm, format_rubric_for_display, CoachError, Config, EvaluationRecord, ExtractionSettings,
    GameEvaluator, RubricExtractor, RubricLibrary, YtDlpSource, LLM,
};
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rubric-coach")]
#[command(version, author = "TigreRoll")]
#[command(about = "Extract AoE IV coaching rubrics from YouTube tutorials and evaluate games against them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to rubric-coach.toml, config/rubric-coach.toml, ~/.config/rubric-coach/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rubric library directory
    #[arg(long, global = true)]
    library_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a rubric from a YouTube tutorial
    Extract {
        /// YouTube video URL
        #[arg(long)]
        url: String,
        /// Custom rubric title
        #[arg(long)]
        title: Option<String>,
        /// Output file (defaults to <library>/<id>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the rubric JSON after saving
        #[arg(short, long)]
        print: bool,
    },
    /// Evaluate a game against a rubric
    Evaluate {
        /// Rubric ID or name
        #[arg(short, long)]
        rubric: String,
        /// Path to game JSON file
        #[arg(short, long)]
        game_data: Option<PathBuf>,
        /// Profile ID (for API fetch)
        #[arg(short, long)]
        profile: Option<String>,
        /// Game ID (for API fetch)
        #[arg(long)]
        game: Option<String>,
        /// Save evaluation to file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
    /// List rubrics in the library
    List {
        /// Filter by archetype, title or id
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },
    /// Show a rubric as Markdown
    Show {
        /// Rubric ID or name
        rubric: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListFormat {
    Table,
    Detailed,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; reports go to stdout, logs to stderr
    let default_filter = if cli.verbose { "rubric_coach=debug,info" } else { "rubric_coach=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.library_dir {
        config.library.dir = dir;
    }
    config.validate()?;
    debug!("{}", config.summary());

    let library = RubricLibrary::new(config.library.dir.clone());

    match cli.command {
        Commands::Extract {
            url,
            title,
            output,
            print,
        } => {
            let llm = connect_llm(&config).await?;
            let prompt = RubricExtractor::load_prompt(&config.extraction.prompt_file).await;
            let extractor = RubricExtractor::new(
                Box::new(YtDlpSource::new(config.downloader.clone())),
                llm,
                prompt,
                ExtractionSettings::from_config(&config),
            );

            let mut rubric = extractor.extract(&url, title.as_deref()).await?;
            library.save(&mut rubric, output.as_deref())?;

            if print {
                println!("\n{}", "=".repeat(60));
                println!("{}", serde_json::to_string_pretty(&rubric)?);
            }

            println!("\n🎉 Done! Rubric ID: {}", rubric.id.as_deref().unwrap_or_default());
        }

        Commands::Evaluate {
            rubric,
            game_data,
            profile,
            game,
            output,
            json,
        } => {
            let rubric = match library.load(&rubric) {
                Ok(rubric) => rubric,
                Err(e @ CoachError::RubricNotFound(_)) => {
                    error!("❌ {}", e);
                    println!("\nAvailable rubrics:");
                    println!("{}", render_table(&library.load_all()));
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            };
            info!("📋 Loaded rubric: {}", rubric.title);

            let game_data = match (game_data, profile, game) {
                (Some(path), _, _) => load_game_data(&path)?,
                (None, Some(profile), Some(game)) => fetch_game_from_api(&profile, &game)?,
                _ => bail!("Provide either --game-data or both --profile and --game"),
            };
            info!(
                "🎮 Loaded game: {} vs {}",
                game_data.player.name.as_deref().unwrap_or("Unknown"),
                game_data.opponent.name.as_deref().unwrap_or("Unknown")
            );

            let evaluator = GameEvaluator::from_config(connect_llm(&config).await?, &config);
            info!("🤖 Evaluating against rubric...");
            let outcome = evaluator.evaluate(&rubric, &game_data).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", render_evaluation(&outcome, &rubric, &game_data));
            }

            if let Some(path) = output {
                EvaluationRecord::new(&rubric, &game_data, outcome).save(&path)?;
            }
        }

        Commands::List { filter, format } => {
            let mut rubrics = library.load_all();
            if let Some(keyword) = filter.as_deref() {
                rubrics = filter_rubrics(rubrics, keyword);
            }

            match format {
                ListFormat::Table => println!("{}", render_table(&rubrics)),
                ListFormat::Detailed => println!("{}", render_detailed(&rubrics)),
            }
        }

        Commands::Show { rubric } => {
            let rubric = library.load(&rubric)?;
            println!("{}", format_rubric_for_display(&rubric));
        }
    }

    Ok(())
}

/// Build the configured LLM client, failing when no provider key is set
async fn connect_llm(config: &Config) -> Result<Box<dyn LLM>> {
    let llm_config = config.llm.resolve().ok_or(CoachError::LlmUnavailable)?;
    let llm = create_llm(&llm_config)?;
    if !llm.is_available().await {
        return Err(CoachError::LlmUnavailable.into());
    }
    Ok(llm)
}
