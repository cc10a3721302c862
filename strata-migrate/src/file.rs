//! Migration files: the on-disk, reviewable artifact for one plan.

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::diff::MigrationChange;
use crate::error::{MigrateResult, MigrationError};
use crate::sqlgen::MigrationScript;

/// Section marker opening the forward script.
pub const UP_MARKER: &str = "-- +migrate Up";
/// Section marker opening the inverse script.
pub const DOWN_MARKER: &str = "-- +migrate Down";

/// Policy gate evaluated when a migration is created and applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Unattended: refuses destructive and review-required changes.
    Automatic,
    /// A human is confirming out of band; everything is allowed.
    Interactive,
    /// Render files only; nothing executes.
    GenerateOnly,
    /// Apply everything, destructive or not.
    ForceDestructive,
}

impl MigrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationMode::Automatic => "Automatic",
            MigrationMode::Interactive => "Interactive",
            MigrationMode::GenerateOnly => "GenerateOnly",
            MigrationMode::ForceDestructive => "ForceDestructive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Automatic" => Some(MigrationMode::Automatic),
            "Interactive" => Some(MigrationMode::Interactive),
            "GenerateOnly" => Some(MigrationMode::GenerateOnly),
            "ForceDestructive" => Some(MigrationMode::ForceDestructive),
            _ => None,
        }
    }
}

impl std::fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, timestamped, checksummed migration artifact.
///
/// The header flags are the canonical source of destructiveness once a
/// file is on disk; the `changes` list is only populated on freshly
/// generated files.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    /// Human-given name.
    pub name: String,
    /// Creation timestamp; with the name it uniquely identifies the file.
    pub timestamp: DateTime<Utc>,
    /// Checksum of the plan this file was generated from.
    pub checksum: String,
    /// Mode the file was created under.
    pub mode: MigrationMode,
    /// Whether the file contains destructive statements.
    pub has_destructive: bool,
    /// Whether review is required before applying.
    pub requires_review: bool,
    /// Forward statements (section comments included).
    pub up: Vec<String>,
    /// Inverse statements.
    pub down: Vec<String>,
    /// Originating changes; empty when loaded from disk.
    pub changes: Vec<MigrationChange>,
    /// Warnings carried from plan validation.
    pub warnings: Vec<String>,
    /// On-disk location, when persisted.
    pub path: PathBuf,
}

impl MigrationFile {
    /// Build a file from a freshly generated script.
    pub fn from_script(
        name: impl Into<String>,
        mode: MigrationMode,
        script: MigrationScript,
        changes: Vec<MigrationChange>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            checksum: script.checksum,
            mode,
            has_destructive: script.has_destructive,
            requires_review: script.requires_review,
            up: script.up,
            down: script.down,
            changes,
            warnings,
            path: PathBuf::new(),
        }
    }

    /// Sortable identifier: `<YYYYMMDDHHMMSS>_<slug>`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.timestamp.format("%Y%m%d%H%M%S"), slugify(&self.name))
    }

    /// File name on disk.
    pub fn file_name(&self) -> String {
        format!("{}.sql", self.id())
    }

    /// Statements safe to hand to the executor (comment lines stripped).
    pub fn executable_up(&self) -> Vec<String> {
        executable(&self.up)
    }

    /// Inverse statements safe to hand to the executor.
    pub fn executable_down(&self) -> Vec<String> {
        executable(&self.down)
    }

    /// Render the full file content.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- Migration: {}\n", self.name));
        out.push_str(&format!(
            "-- Created: {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        out.push_str(&format!("-- Checksum: {}\n", self.checksum));
        out.push_str(&format!("-- Mode: {}\n", self.mode));
        out.push_str(&format!("-- Has Destructive: {}\n", self.has_destructive));
        out.push_str(&format!("-- Requires Review: {}\n", self.requires_review));
        for warning in &self.warnings {
            out.push_str(&format!("-- WARNING: {}\n", warning));
        }
        out.push('\n');
        out.push_str(UP_MARKER);
        out.push('\n');
        for statement in &self.up {
            out.push_str(statement);
            out.push_str("\n\n");
        }
        out.push_str(DOWN_MARKER);
        out.push('\n');
        for statement in &self.down {
            out.push_str(statement);
            out.push_str("\n\n");
        }
        out
    }

    /// Parse a file previously produced by [`MigrationFile::render`].
    ///
    /// Recovers name, timestamp, checksum, mode and both flags from the
    /// header alone; the structured change list is not reconstructable.
    pub fn parse(content: &str, path: impl Into<PathBuf>) -> MigrateResult<Self> {
        let mut name = None;
        let mut timestamp = None;
        let mut checksum = None;
        let mut mode = None;
        let mut has_destructive = false;
        let mut requires_review = false;
        let mut warnings = Vec::new();

        let mut up_body = String::new();
        let mut down_body = String::new();
        let mut section = Section::Header;

        for line in content.lines() {
            let trimmed = line.trim_end();
            if trimmed == UP_MARKER {
                section = Section::Up;
                continue;
            }
            if trimmed == DOWN_MARKER {
                section = Section::Down;
                continue;
            }
            match section {
                Section::Header => {
                    if let Some(value) = trimmed.strip_prefix("-- Migration:") {
                        name = Some(value.trim().to_string());
                    } else if let Some(value) = trimmed.strip_prefix("-- Created:") {
                        let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|e| {
                            MigrationError::invalid_migration(format!(
                                "bad Created timestamp: {}",
                                e
                            ))
                        })?;
                        timestamp = Some(parsed.with_timezone(&Utc));
                    } else if let Some(value) = trimmed.strip_prefix("-- Checksum:") {
                        checksum = Some(value.trim().to_string());
                    } else if let Some(value) = trimmed.strip_prefix("-- Mode:") {
                        mode = Some(MigrationMode::parse(value).ok_or_else(|| {
                            MigrationError::invalid_migration(format!(
                                "unknown migration mode '{}'",
                                value.trim()
                            ))
                        })?);
                    } else if let Some(value) = trimmed.strip_prefix("-- Has Destructive:") {
                        has_destructive = value.trim() == "true";
                    } else if let Some(value) = trimmed.strip_prefix("-- Requires Review:") {
                        requires_review = value.trim() == "true";
                    } else if let Some(value) = trimmed.strip_prefix("-- WARNING:") {
                        warnings.push(value.trim().to_string());
                    }
                }
                Section::Up => {
                    up_body.push_str(line);
                    up_body.push('\n');
                }
                Section::Down => {
                    down_body.push_str(line);
                    down_body.push('\n');
                }
            }
        }

        let name =
            name.ok_or_else(|| MigrationError::invalid_migration("missing Migration header"))?;
        let timestamp =
            timestamp.ok_or_else(|| MigrationError::invalid_migration("missing Created header"))?;
        let checksum =
            checksum.ok_or_else(|| MigrationError::invalid_migration("missing Checksum header"))?;
        let mode = mode.ok_or_else(|| MigrationError::invalid_migration("missing Mode header"))?;

        Ok(Self {
            name,
            timestamp,
            checksum,
            mode,
            has_destructive,
            requires_review,
            up: split_statements(&up_body),
            down: split_statements(&down_body),
            changes: Vec::new(),
            warnings,
            path: path.into(),
        })
    }
}

enum Section {
    Header,
    Up,
    Down,
}

/// Turn a human-given name into a file-name slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Split a script body into statements on line-terminating semicolons,
/// dropping comment-only lines.
pub fn split_statements(body: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        if trimmed.ends_with(';') {
            statements.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

fn executable(statements: &[String]) -> Vec<String> {
    statements
        .iter()
        .filter(|s| s.lines().any(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with("--")
        }))
        .cloned()
        .collect()
}

/// Reads and writes migration files under one directory.
pub struct MigrationFileStore {
    dir: PathBuf,
}

impl MigrationFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the migrations directory if needed.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(MigrationError::Io)?;
        Ok(())
    }

    /// All migration files, sorted by ascending timestamp.
    pub async fn list(&self) -> MigrateResult<Vec<MigrationFile>> {
        let mut files = Vec::new();
        if !self.dir.exists() {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(MigrationError::Io)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(MigrationError::Io)?;
            match MigrationFile::parse(&content, &path) {
                Ok(file) => files.push(file),
                Err(e) => {
                    return Err(MigrationError::invalid_migration(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        files.sort_by_key(|f| f.timestamp);
        debug!(count = files.len(), dir = %self.dir.display(), "loaded migration files");
        Ok(files)
    }

    /// Persist a migration file; returns its path.
    pub async fn write(&self, file: &MigrationFile) -> MigrateResult<PathBuf> {
        self.ensure_dir().await?;
        let path = self.dir.join(file.file_name());
        tokio::fs::write(&path, file.render())
            .await
            .map_err(MigrationError::Io)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlgen::MigrationScript;
    use pretty_assertions::assert_eq;

    fn sample_file() -> MigrationFile {
        let script = MigrationScript {
            up: vec![
                "-- Create tables".to_string(),
                "CREATE TABLE \"users\" (\n    \"id\" BIGSERIAL,\n    PRIMARY KEY (\"id\")\n);"
                    .to_string(),
            ],
            down: vec!["DROP TABLE IF EXISTS \"users\" CASCADE;".to_string()],
            checksum: "abc123".to_string(),
            has_destructive: true,
            requires_review: true,
            change_count: 1,
        };
        MigrationFile::from_script(
            "create users",
            MigrationMode::Interactive,
            script,
            Vec::new(),
            vec!["potential data loss: something".to_string()],
        )
    }

    #[test]
    fn test_round_trip_preserves_header() {
        let original = sample_file();
        let rendered = original.render();
        let parsed = MigrationFile::parse(&rendered, "x.sql").unwrap();

        assert_eq!(parsed.name, original.name);
        assert_eq!(
            parsed.timestamp.timestamp(),
            original.timestamp.timestamp()
        );
        assert_eq!(parsed.checksum, original.checksum);
        assert_eq!(parsed.mode, original.mode);
        assert_eq!(parsed.has_destructive, original.has_destructive);
        assert_eq!(parsed.requires_review, original.requires_review);
        assert_eq!(parsed.warnings.len(), 1);
        // The structured change list is not recoverable from disk.
        assert!(parsed.changes.is_empty());
    }

    #[test]
    fn test_parsed_statements_are_executable() {
        let rendered = sample_file().render();
        let parsed = MigrationFile::parse(&rendered, "x.sql").unwrap();

        assert_eq!(parsed.up.len(), 1);
        assert!(parsed.up[0].starts_with("CREATE TABLE"));
        assert_eq!(parsed.down.len(), 1);
        assert!(parsed.down[0].starts_with("DROP TABLE"));
    }

    #[test]
    fn test_format_markers() {
        let rendered = sample_file().render();
        assert!(rendered.contains("-- Migration: create users"));
        assert!(rendered.contains("-- Mode: Interactive"));
        assert!(rendered.contains("-- Has Destructive: true"));
        assert!(rendered.contains("-- Requires Review: true"));
        assert!(rendered.contains("-- WARNING: potential data loss"));
        let up_at = rendered.find(UP_MARKER).unwrap();
        let down_at = rendered.find(DOWN_MARKER).unwrap();
        assert!(up_at < down_at);
    }

    #[test]
    fn test_parse_rejects_missing_headers() {
        let err = MigrationFile::parse("-- +migrate Up\nSELECT 1;\n", "x.sql").unwrap_err();
        assert!(matches!(err, MigrationError::InvalidMigration(_)));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("create users"), "create_users");
        assert_eq!(slugify("Add e-mail index!"), "add_e_mail_index");
        assert_eq!(slugify("  spaced  "), "spaced");
    }

    #[test]
    fn test_split_statements() {
        let body = "-- comment\nCREATE TABLE a (\n    id INTEGER\n);\n\nDROP TABLE b;\n";
        let statements = split_statements(body);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert_eq!(statements[1], "DROP TABLE b;");
    }

    #[test]
    fn test_executable_filters_comment_entries() {
        let file = sample_file();
        let executable = file.executable_up();
        assert_eq!(executable.len(), 1);
        assert!(executable[0].starts_with("CREATE TABLE"));
    }

    #[tokio::test]
    async fn test_store_round_trip_and_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let store = MigrationFileStore::new(dir.path());

        let mut first = sample_file();
        first.name = "first".to_string();
        first.timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        let mut second = sample_file();
        second.name = "second".to_string();
        second.timestamp = "2024-02-01T00:00:00Z".parse().unwrap();

        // Write out of order; listing sorts by timestamp.
        store.write(&second).await.unwrap();
        store.write(&first).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "first");
        assert_eq!(listed[1].name, "second");
        assert_eq!(listed[0].id(), "20240101000000_first");
    }

    #[tokio::test]
    async fn test_store_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = MigrationFileStore::new(dir.path().join("missing"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
