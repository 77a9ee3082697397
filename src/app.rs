//! Command dispatch for the `dedupe` binary.
//!
//! [`run_app`] loads configuration, opens the catalog and runs one
//! subcommand, returning the process exit code. Errors come back as
//! `anyhow` errors with context; `main` turns them into exit codes.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::catalog::{Catalog, ScanSession, ScanStats, SessionId, VolumeId, VolumeInfo};
use crate::classify::{Classifier, MinSizes};
use crate::cli::{
    Cli, Commands, DuplicatesArgs, ListArgs, OutputFormat, ResumeArgs, ScanArgs, SetArgs,
    SimilarArgs,
};
use crate::config::Config;
use crate::duplicates::{DuplicateGroup, GroupingEngine};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::{text, write_json, JsonFile, JsonGroupsReport};
use crate::progress::Progress;
use crate::scanner::{directory_volume, ScanOutcome, ScanReport, VolumeScanner};
use crate::signal::{install_handler, ScanControl};

/// Run the CLI.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the catalog cannot be
/// opened, a scan fails, or output cannot be written.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref(), &cli.config_overrides())
        .context("Failed to load configuration")?;
    if let Commands::Scan(ScanArgs {
        min_size: Some(min),
        ..
    }) = &cli.command
    {
        config.min_sizes = uniform_min_sizes(*min);
    }

    let db_path = config.database_path()?;
    let catalog = Arc::new(
        Catalog::open(&db_path)
            .with_context(|| format!("Failed to open catalog {}", db_path.display()))?,
    );
    log::debug!("Using catalog {}", db_path.display());

    let app = App {
        catalog,
        config,
        quiet: cli.quiet,
        accessible: cli.accessible,
    };
    let mut stdout = io::stdout().lock();
    match &cli.command {
        Commands::Scan(args) => app.scan(args, &mut stdout),
        Commands::Resume(args) => app.resume(args, &mut stdout),
        Commands::Sessions(args) => app.sessions(args, &mut stdout),
        Commands::Volumes(args) => app.volumes(args, &mut stdout),
        Commands::Duplicates(args) => app.duplicates(args, &mut stdout),
        Commands::Similar(args) => app.similar(args, &mut stdout),
        Commands::Diff(args) => app.diff(args, &mut stdout),
        Commands::Intersect(args) => app.intersect(args, &mut stdout),
    }
}

fn uniform_min_sizes(min: u64) -> MinSizes {
    MinSizes {
        image: min,
        video: min,
        audio: min,
        document: min,
        other: min,
    }
}

fn volume_filter(volumes: &[VolumeId]) -> Option<&[VolumeId]> {
    (!volumes.is_empty()).then_some(volumes)
}

struct App {
    catalog: Arc<Catalog>,
    config: Config,
    quiet: bool,
    accessible: bool,
}

impl App {
    fn scanner(&self, control: ScanControl) -> Result<VolumeScanner> {
        let overrides = self
            .catalog
            .custom_extension_overrides()?
            .with_include(&self.config.include_extensions)
            .with_exclude(&self.config.exclude_extensions);
        let classifier = Arc::new(Classifier::with_overrides(overrides));
        Ok(
            VolumeScanner::new(Arc::clone(&self.catalog), self.config.scanner_config()?, control)
                .with_classifier(classifier),
        )
    }

    fn run_scan<W: Write>(
        &self,
        volume: &VolumeInfo,
        root: Option<&Path>,
        resume: Option<SessionId>,
        output: OutputFormat,
        out: &mut W,
    ) -> Result<ExitCode> {
        let control = install_handler()?;
        let scanner = self.scanner(control)?;
        let progress = Progress::with_accessible(
            self.quiet || output == OutputFormat::Json,
            self.accessible,
        );
        let result = scanner.scan(volume, root, resume, Some(&progress));
        progress.finish();
        let report = result.with_context(|| format!("Scan of {} failed", volume.name))?;
        write_scan_report(out, &report, output)?;

        Ok(match report.outcome {
            ScanOutcome::Paused | ScanOutcome::Cancelled => ExitCode::Interrupted,
            ScanOutcome::Completed if report.stats.files_failed > 0 => ExitCode::PartialSuccess,
            ScanOutcome::Completed => ExitCode::Success,
        })
    }

    fn scan<W: Write>(&self, args: &ScanArgs, out: &mut W) -> Result<ExitCode> {
        let path = args
            .path
            .canonicalize()
            .with_context(|| format!("Cannot access {}", args.path.display()))?;

        let mut volume = match &args.uuid {
            Some(uuid) => {
                let mount = match &args.mount_point {
                    Some(mount) => mount
                        .canonicalize()
                        .with_context(|| format!("Cannot access {}", mount.display()))?,
                    None => path.clone(),
                };
                let name = mount
                    .file_name()
                    .map_or_else(|| uuid.clone(), |n| n.to_string_lossy().into_owned());
                VolumeInfo::new(uuid.clone(), name, mount)
            }
            None => directory_volume(&path),
        };
        if let Some(name) = &args.name {
            volume.name = name.clone();
        }

        self.run_scan(&volume, Some(&path), None, args.output, out)
    }

    fn resume<W: Write>(&self, args: &ResumeArgs, out: &mut W) -> Result<ExitCode> {
        let session = self
            .catalog
            .session(args.session_id)?
            .with_context(|| format!("Session {} not found", args.session_id))?;
        let Some(volume_id) = session.volume_id else {
            bail!("Session {} has no volume", session.id);
        };
        let volume = self
            .catalog
            .volume(volume_id)?
            .with_context(|| format!("Volume {volume_id} of session {} not found", session.id))?;
        let Some(mount) = volume.mount_point.clone() else {
            bail!("Volume {} is not mounted", volume.name);
        };

        let mut info = VolumeInfo::new(volume.uuid, volume.name, mount).with_internal(volume.is_internal);
        info.total_size_bytes = volume.total_size_bytes;
        info.filesystem = volume.filesystem;

        self.run_scan(&info, None, Some(session.id), args.output, out)
    }

    fn sessions<W: Write>(&self, args: &ListArgs, out: &mut W) -> Result<ExitCode> {
        let mut sessions: BTreeMap<SessionId, ScanSession> = BTreeMap::new();
        for session in self
            .catalog
            .paused_sessions(None)?
            .into_iter()
            .chain(self.catalog.interrupted_sessions(&[])?)
        {
            sessions.insert(session.id, session);
        }
        let sessions: Vec<ScanSession> = sessions.into_values().rev().collect();
        match args.output {
            OutputFormat::Json => write_json(&sessions, out)?,
            OutputFormat::Text => text::write_sessions(out, &sessions)?,
        }
        Ok(ExitCode::Success)
    }

    fn volumes<W: Write>(&self, args: &ListArgs, out: &mut W) -> Result<ExitCode> {
        let volumes = self.catalog.volumes()?;
        match args.output {
            OutputFormat::Json => write_json(&volumes, out)?,
            OutputFormat::Text => text::write_volumes(out, &volumes)?,
        }
        Ok(ExitCode::Success)
    }

    fn duplicates<W: Write>(&self, args: &DuplicatesArgs, out: &mut W) -> Result<ExitCode> {
        if args.hash_type.is_perceptual() {
            bail!(
                "{} is a perceptual hash; use `dedupe similar` instead",
                args.hash_type
            );
        }
        let engine = GroupingEngine::new();
        let volumes = volume_filter(&args.volumes);
        let groups = if args.cross_volume {
            engine.cross_volume_groups(&self.catalog, args.hash_type, volumes)?
        } else {
            engine.catalog_groups(&self.catalog, args.hash_type, volumes)?
        };
        write_groups(out, &groups, args.output)
    }

    fn similar<W: Write>(&self, args: &SimilarArgs, out: &mut W) -> Result<ExitCode> {
        let algorithm = self.config.algorithm()?;
        let threshold = self.config.threshold()?;
        log::info!("Grouping by {algorithm} within distance {threshold}");
        if self.catalog.hash_count(algorithm.hash_kind())? == 0 {
            log::warn!(
                "No {algorithm} fingerprints in the catalog; rescan with perceptual_algorithm = \"{}\"",
                algorithm.name()
            );
        }
        let groups = GroupingEngine::new().catalog_perceptual_groups(
            &self.catalog,
            algorithm.hash_kind(),
            threshold,
            volume_filter(&args.volumes),
        )?;
        write_groups(out, &groups, args.output)
    }

    fn mount_point(&self, volume_id: VolumeId) -> Result<Option<PathBuf>> {
        let volume = self
            .catalog
            .volume(volume_id)?
            .with_context(|| format!("Volume {volume_id} not found"))?;
        Ok(volume.mount_point)
    }

    fn diff<W: Write>(&self, args: &SetArgs, out: &mut W) -> Result<ExitCode> {
        let (b, a) = (args.first, args.second);
        let mount = self.mount_point(b)?;
        self.mount_point(a)?;
        let files: Vec<JsonFile> = self
            .catalog
            .set_difference(b, a, args.hash_type)?
            .iter()
            .map(|f| JsonFile::from_record(f, mount.as_deref()))
            .collect();
        match args.output {
            OutputFormat::Json => write_json(&files, out)?,
            OutputFormat::Text => {
                text::write_files(out, &format!("Only on volume {b} (not on {a})"), &files)?;
            }
        }
        Ok(if files.is_empty() {
            ExitCode::NoDuplicates
        } else {
            ExitCode::Success
        })
    }

    fn intersect<W: Write>(&self, args: &SetArgs, out: &mut W) -> Result<ExitCode> {
        let (a, b) = (args.first, args.second);
        let mount_a = self.mount_point(a)?;
        let mount_b = self.mount_point(b)?;
        let pairs: Vec<(JsonFile, JsonFile)> = self
            .catalog
            .set_intersection(a, b, args.hash_type)?
            .iter()
            .map(|(fa, fb)| {
                (
                    JsonFile::from_record(fa, mount_a.as_deref()),
                    JsonFile::from_record(fb, mount_b.as_deref()),
                )
            })
            .collect();
        match args.output {
            OutputFormat::Json => write_json(&pairs, out)?,
            OutputFormat::Text => text::write_pairs(out, &pairs)?,
        }
        Ok(if pairs.is_empty() {
            ExitCode::NoDuplicates
        } else {
            ExitCode::Success
        })
    }
}

fn write_groups<W: Write>(
    out: &mut W,
    groups: &[DuplicateGroup],
    format: OutputFormat,
) -> Result<ExitCode> {
    match format {
        OutputFormat::Json => write_json(&JsonGroupsReport::new(groups), out)?,
        OutputFormat::Text => text::write_groups(out, groups)?,
    }
    Ok(if groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    })
}

#[derive(serde::Serialize)]
struct JsonScanReport<'a> {
    session_id: SessionId,
    outcome: &'static str,
    stats: &'a ScanStats,
}

fn write_scan_report<W: Write>(out: &mut W, report: &ScanReport, format: OutputFormat) -> Result<()> {
    let outcome = match report.outcome {
        ScanOutcome::Completed => "completed",
        ScanOutcome::Paused => "paused",
        ScanOutcome::Cancelled => "cancelled",
    };
    match format {
        OutputFormat::Json => write_json(
            &JsonScanReport {
                session_id: report.session_id,
                outcome,
                stats: &report.stats,
            },
            out,
        )?,
        OutputFormat::Text => {
            writeln!(out, "Session {} {outcome}: {}", report.session_id, report.stats)?;
            if report.outcome == ScanOutcome::Paused {
                writeln!(out, "Resume with: dedupe resume {}", report.session_id)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::HashKind;
    use std::fs;
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> App {
        let mut config = Config::default();
        config.min_sizes = MinSizes::none();
        App {
            catalog: Arc::new(Catalog::open(dir.path().join("catalog.db")).unwrap()),
            config,
            quiet: true,
            accessible: false,
        }
    }

    #[test]
    fn test_uniform_min_sizes() {
        let sizes = uniform_min_sizes(7);
        assert_eq!(sizes.image, 7);
        assert_eq!(sizes.other, 7);
    }

    #[test]
    fn test_scan_then_duplicates_json() {
        let dir = TempDir::new().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("a.txt"), b"same content").unwrap();
        fs::write(photos.join("b.txt"), b"same content").unwrap();
        let app = app(&dir);

        let volume = directory_volume(&photos.canonicalize().unwrap());
        let mut out = Vec::new();
        let code = app
            .run_scan(&volume, None, None, OutputFormat::Json, &mut out)
            .unwrap();
        assert_eq!(code, ExitCode::Success);
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["stats"]["files_added"], 2);

        let args = DuplicatesArgs {
            hash_type: HashKind::ExactMd5,
            volumes: Vec::new(),
            cross_volume: false,
            output: OutputFormat::Json,
        };
        let mut out = Vec::new();
        assert_eq!(app.duplicates(&args, &mut out).unwrap(), ExitCode::Success);
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["summary"]["total_groups"], 1);
    }

    #[test]
    fn test_similar_uses_configured_algorithm() {
        let dir = TempDir::new().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir(&photos).unwrap();
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 3) as u8])
        });
        img.save(photos.join("a.jpg")).unwrap();
        fs::copy(photos.join("a.jpg"), photos.join("b.jpg")).unwrap();

        let mut app = app(&dir);
        app.config.perceptual_algorithm = "dhash".to_string();
        let volume = directory_volume(&photos.canonicalize().unwrap());
        app.run_scan(&volume, None, None, OutputFormat::Json, &mut Vec::new())
            .unwrap();

        let args = SimilarArgs {
            volumes: Vec::new(),
            algorithm: None,
            threshold: None,
            output: OutputFormat::Json,
        };
        let mut out = Vec::new();
        assert_eq!(app.similar(&args, &mut out).unwrap(), ExitCode::Success);
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["summary"]["total_groups"], 1);
    }

    #[test]
    fn test_duplicates_rejects_perceptual_kind() {
        let dir = TempDir::new().unwrap();
        let args = DuplicatesArgs {
            hash_type: HashKind::PerceptualPhash,
            volumes: Vec::new(),
            cross_volume: false,
            output: OutputFormat::Text,
        };
        assert!(app(&dir).duplicates(&args, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_empty_catalog_reports_no_duplicates() {
        let dir = TempDir::new().unwrap();
        let args = DuplicatesArgs {
            hash_type: HashKind::ExactMd5,
            volumes: Vec::new(),
            cross_volume: true,
            output: OutputFormat::Text,
        };
        assert_eq!(
            app(&dir).duplicates(&args, &mut Vec::new()).unwrap(),
            ExitCode::NoDuplicates
        );
    }
}
