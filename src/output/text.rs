//! Plain-text rendering of query results for terminals.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::catalog::{ScanSession, Volume};
use crate::duplicates::{DuplicateGroup, GroupSummary};

use super::json::JsonFile;

/// Write duplicate groups, keeper first, followed by the summary.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_groups<W: Write>(writer: &mut W, groups: &[DuplicateGroup]) -> io::Result<()> {
    for group in groups {
        let kind = group.hash_kind().map_or_else(String::new, |k| format!(" [{k}]"));
        writeln!(
            writer,
            "Group {}{kind}: {} files, {} reclaimable, {:.0}% similar",
            group.group_id() + 1,
            group.len(),
            ByteSize(group.potential_savings()),
            group.average_similarity() * 100.0
        )?;
        let keep = group.suggested_keep_index();
        for (i, member) in group.members().iter().enumerate() {
            let marker = if i == keep { "keep" } else { "    " };
            writeln!(
                writer,
                "  {marker} {} ({})",
                member.path.display(),
                ByteSize(member.size)
            )?;
        }
    }
    writeln!(writer, "{}", GroupSummary::from_groups(groups))
}

/// Write the volume table.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_volumes<W: Write>(writer: &mut W, volumes: &[Volume]) -> io::Result<()> {
    if volumes.is_empty() {
        return writeln!(writer, "No volumes catalogued");
    }
    writeln!(
        writer,
        "{:>4}  {:<20} {:<10} {:>9}  {:<20} MOUNT",
        "ID", "NAME", "STATUS", "FILES", "LAST SCAN"
    )?;
    for volume in volumes {
        let last_scan = volume
            .last_scan_at
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let mount = volume
            .mount_point
            .as_ref()
            .map_or_else(|| "(not mounted)".to_string(), |p| p.display().to_string());
        writeln!(
            writer,
            "{:>4}  {:<20} {:<10} {:>9}  {:<20} {mount}",
            volume.id,
            volume.name,
            volume.scan_status.as_str(),
            volume.file_count,
            last_scan
        )?;
    }
    Ok(())
}

/// Write the resumable-session table.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_sessions<W: Write>(writer: &mut W, sessions: &[ScanSession]) -> io::Result<()> {
    if sessions.is_empty() {
        return writeln!(writer, "No resumable sessions");
    }
    for session in sessions {
        let root = session
            .scan_path
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string());
        writeln!(
            writer,
            "Session {} [{}] volume {} started {}: {}",
            session.id,
            session.status,
            session
                .volume_id
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
            session.started_at.format("%Y-%m-%d %H:%M"),
            root
        )?;
        writeln!(writer, "  {}", session.stats)?;
    }
    Ok(())
}

/// Write a list of files with a heading.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_files<W: Write>(writer: &mut W, heading: &str, files: &[JsonFile]) -> io::Result<()> {
    writeln!(writer, "{heading}: {} files", files.len())?;
    for file in files {
        writeln!(writer, "  {} ({})", file.path.display(), ByteSize(file.size))?;
    }
    Ok(())
}

/// Write pairs of matching files.
///
/// # Errors
///
/// Returns any error from the writer.
pub fn write_pairs<W: Write>(writer: &mut W, pairs: &[(JsonFile, JsonFile)]) -> io::Result<()> {
    writeln!(writer, "{} matching pairs", pairs.len())?;
    for (a, b) in pairs {
        writeln!(writer, "  {} == {}", a.path.display(), b.path.display())?;
    }
    Ok(())
}
