use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::attendance::parse_date;
use rollcall_core::{
    decode_image, load_gallery, AttendanceLog, FeatureExtractor, Matcher, OnnxExtractor,
    SkipReason, ToleranceMatcher,
};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the enrollment directory and report what would be recognized
    Scan {
        /// Directory of `<name>.<ext>` enrollment images
        #[arg(short, long, default_value = "data/known_faces")]
        known: PathBuf,
        /// Directory holding the ONNX face models
        #[arg(short, long, default_value = "models")]
        models: PathBuf,
    },
    /// Match every face in an image against the enrollment directory
    Identify {
        image: PathBuf,
        #[arg(short, long, default_value = "data/known_faces")]
        known: PathBuf,
        #[arg(short, long, default_value = "models")]
        models: PathBuf,
        /// Maximum cosine distance accepted as a match
        #[arg(short, long, default_value_t = 0.5)]
        tolerance: f32,
    },
    /// Print or save a day's attendance CSV
    Export {
        #[arg(short, long, default_value = "data/exports")]
        exports: PathBuf,
        /// Day to export as YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Write the CSV here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { known, models } => {
            let mut extractor = load_models(&models)?;
            let gallery = load_gallery(&known, &mut extractor);

            if cli.json {
                let names: Vec<&str> = gallery.faces.iter().map(|f| f.name.as_str()).collect();
                println!(
                    "{}",
                    json!({ "known": names, "report": gallery.report })
                );
            } else {
                println!("{} known face(s) in {}", gallery.report.loaded, known.display());
                for face in &gallery.faces {
                    println!("  {:<24} {}", face.name, face.source.display());
                }
                for skipped in &gallery.report.skipped {
                    println!("  skipped {}: {}", skipped.path.display(), describe(&skipped.reason));
                }
            }
        }
        Commands::Identify {
            image,
            known,
            models,
            tolerance,
        } => {
            if !(tolerance > 0.0 && tolerance <= 2.0) {
                bail!("tolerance must be in (0, 2], got {tolerance}");
            }
            let mut extractor = load_models(&models)?;
            let gallery = load_gallery(&known, &mut extractor);
            for skipped in &gallery.report.skipped {
                tracing::warn!(
                    path = %skipped.path.display(),
                    reason = %describe(&skipped.reason),
                    "enrollment image skipped"
                );
            }
            if gallery.faces.is_empty() {
                tracing::warn!(dir = %known.display(), "no known faces; every face will be unknown");
            }

            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let decoded = decode_image(&bytes).with_context(|| format!("decoding {}", image.display()))?;
            let faces = extractor.extract(&decoded)?;

            let matches: Vec<_> = faces
                .iter()
                .map(|face| {
                    let result = ToleranceMatcher.find(&face.embedding, &gallery.faces, tolerance);
                    (face, result)
                })
                .collect();

            if cli.json {
                let rows: Vec<_> = matches
                    .iter()
                    .map(|(face, result)| {
                        json!({
                            "name": result.name,
                            "distance": result.distance,
                            "location": face.location,
                        })
                    })
                    .collect();
                println!("{}", json!({ "faces": rows }));
            } else if matches.is_empty() {
                println!("No faces detected");
            } else {
                for (face, result) in &matches {
                    let b = &face.location;
                    println!(
                        "{:<24} distance {:.3}  at ({:.0}, {:.0}) {:.0}x{:.0}",
                        result.name.as_deref().unwrap_or("Unknown"),
                        result.distance,
                        b.x,
                        b.y,
                        b.width,
                        b.height
                    );
                }
            }
        }
        Commands::Export { exports, date, out } => {
            let log = AttendanceLog::open(&exports)?;
            let date = match date {
                Some(raw) => parse_date(&raw).with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))?,
                None => log.today(),
            };

            if cli.json {
                let rows: Vec<_> = log
                    .records(date)?
                    .into_iter()
                    .map(|r| json!({ "name": r.name, "time": r.timestamp.time().to_string() }))
                    .collect();
                println!("{}", json!({ "date": date.to_string(), "records": rows }));
                return Ok(());
            }

            let Some(bytes) = log.export(date)? else {
                bail!("no attendance recorded for {date}");
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Wrote {}", path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
    }

    Ok(())
}

fn load_models(dir: &std::path::Path) -> Result<OnnxExtractor> {
    let extractor = OnnxExtractor::load(dir)
        .with_context(|| format!("loading face models from {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), "face models loaded");
    Ok(extractor)
}

fn describe(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Unreadable(e) => format!("unreadable ({e})"),
        SkipReason::NoFace => "no face found".to_string(),
        SkipReason::ExtractFailed(e) => format!("extraction failed ({e})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_skip_reasons_read_naturally() {
        assert_eq!(describe(&SkipReason::NoFace), "no face found");
        assert_eq!(
            describe(&SkipReason::Unreadable("bad header".into())),
            "unreadable (bad header)"
        );
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_identify_defaults() {
        let cli = Cli::parse_from(["rollcall", "identify", "class.jpg"]);
        match cli.command {
            Commands::Identify { tolerance, known, .. } => {
                assert_eq!(tolerance, 0.5);
                assert_eq!(known, PathBuf::from("data/known_faces"));
            }
            _ => panic!("expected identify"),
        }
    }

    #[test]
    fn test_json_flag_after_subcommand() {
        let cli = Cli::parse_from(["rollcall", "export", "--date", "2026-10-16", "--json"]);
        assert!(cli.json);
    }
}
