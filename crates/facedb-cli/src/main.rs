use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facedb::{query, Config, FaceData, FaceStore, ImageSource};
use serde_json::json;

#[derive(Parser)]
#[command(name = "facedb", about = "Tagged face encoding database")]
struct Cli {
    /// TOML config file; FACEDB_* environment variables still override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every tag in the database
    Tags,
    /// Show a stored face
    Show { id: i64 },
    /// Detect faces in an image and store each of them
    Upload {
        image: PathBuf,
        /// Store the image by its local path instead of its contents
        #[arg(long)]
        by_path: bool,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// Compare a stored face against faces with any of the given tags
    Compare {
        id: i64,
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
        #[command(flatten)]
        filter: MatchFilter,
    },
    /// Compare the first face in an image against faces with any of the given tags
    CompareImage {
        image: PathBuf,
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
        #[command(flatten)]
        filter: MatchFilter,
    },
    /// Write a stored face, cropped from its image, as PNG
    Crop {
        id: i64,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct MatchFilter {
    /// Only keep results at or below this distance
    #[arg(long, conflicts_with = "matches")]
    threshold: Option<f64>,
    /// Only keep results within the configured tolerance
    #[arg(long)]
    matches: bool,
}

impl MatchFilter {
    fn threshold(&self, config: &Config) -> Option<f64> {
        if self.matches {
            Some(config.tolerance)
        } else {
            self.threshold
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env(),
    };
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create database directory {}", dir.display()))?;
    }
    let store = FaceStore::open(&config.db_path)
        .with_context(|| format!("open database {}", config.db_path.display()))?;
    tracing::debug!(db = %config.db_path.display(), "database ready");

    run(&store, &config, cli.command)?;
    store.close()?;
    Ok(())
}

fn run(store: &FaceStore, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Tags => {
            let tags = query::get_available_tags(store)?;
            println!("{}", serde_json::to_string_pretty(&tags)?);
        }
        Commands::Show { id } => match store.get_face_by_id(id)? {
            Some(face) => println!("{}", serde_json::to_string_pretty(&face)?),
            None => anyhow::bail!("no face with id {id}"),
        },
        Commands::Upload {
            image,
            by_path,
            description,
            tags,
        } => {
            let extractor = config
                .command_extractor()
                .context("no face extractor configured; set FACEDB_EXTRACTOR")?;
            let source = image_source(image, by_path)?;

            let ids = query::upload_faces_from_image(
                store,
                &extractor,
                &source,
                &description,
                tags.as_slice(),
            )?;
            if ids.is_empty() {
                eprintln!("No faces detected; nothing stored");
            }
            println!("{}", json!({ "face_ids": ids }));
        }
        Commands::Compare { id, tags, filter } => {
            let results = query::compare_stored_face_against_tags(store, id, tags.as_slice())?;
            print_results(results, filter.threshold(config))?;
        }
        Commands::CompareImage {
            image,
            tags,
            filter,
        } => {
            let extractor = config
                .command_extractor()
                .context("no face extractor configured; set FACEDB_EXTRACTOR")?;
            let source = image_source(image, false)?;

            let results = query::compare_face_from_image_against_tags(
                store,
                &extractor,
                &source,
                tags.as_slice(),
            )?;
            print_results(results, filter.threshold(config))?;
        }
        Commands::Crop { id, output } => {
            let png = query::cropped_face_image(store, id)?
                .with_context(|| format!("face {id} has no stored image to crop"))?;
            std::fs::write(&output, png)
                .with_context(|| format!("write {}", output.display()))?;
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}

fn image_source(image: PathBuf, by_path: bool) -> Result<ImageSource> {
    if by_path {
        let path = image
            .canonicalize()
            .with_context(|| format!("resolve {}", image.display()))?;
        Ok(ImageSource::Path(path))
    } else {
        let bytes = std::fs::read(&image).with_context(|| format!("read {}", image.display()))?;
        Ok(ImageSource::Bytes(bytes))
    }
}

fn print_results(results: Vec<(FaceData, f64)>, threshold: Option<f64>) -> Result<()> {
    let results = match threshold {
        Some(t) => facedb::within_threshold(results, t),
        None => results,
    };

    let rows: Vec<_> = results
        .iter()
        .map(|(face, distance)| {
            json!({
                "face_id": face.id,
                "image_id": face.image_id(),
                "location": face.location,
                "description": face.description,
                "tags": face.tags,
                "distance": distance,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
