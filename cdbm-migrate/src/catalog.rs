//! Version catalog: merges SQL file pairs and custom migrations into one
//! ordered version sequence.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{MAX_REPORTED_GAPS, MigrateResult, MigrationError};
use crate::migration::{CustomMigrations, MigrationDirection, MigrationUnit};

/// Parsed `<version>_<description>.<up|down>.sql` file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFileName {
    /// Version number.
    pub version: i64,
    /// Description part.
    pub description: String,
    /// `Up` or `Down`.
    pub direction: MigrationDirection,
}

impl MigrationFileName {
    /// Render the file name back.
    pub fn file_name(&self) -> String {
        let dir = match self.direction {
            MigrationDirection::Down => "down",
            _ => "up",
        };
        format!("{:06}_{}.{}.sql", self.version, self.description, dir)
    }
}

/// Parse a migration file name.
pub fn parse_file_name(name: &str) -> MigrateResult<MigrationFileName> {
    let invalid = |reason: &str| MigrationError::InvalidFileName {
        file: name.to_string(),
        reason: reason.to_string(),
    };

    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() != 3 {
        return Err(invalid(
            "expected exactly three dot-separated parts: <version>_<description>.<up|down>.sql",
        ));
    }

    let (stem, direction, extension) = (segments[0], segments[1], segments[2]);

    if extension != "sql" {
        return Err(invalid("extension must be 'sql'"));
    }

    let direction = match direction {
        "up" => MigrationDirection::Up,
        "down" => MigrationDirection::Down,
        _ => return Err(invalid("direction must be 'up' or 'down'")),
    };

    let (version, description) = stem
        .split_once('_')
        .ok_or_else(|| invalid("missing '_' between version and description"))?;

    if description.is_empty() {
        return Err(invalid("description is empty"));
    }

    let digits = version.strip_prefix('-').unwrap_or(version);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("version must be an integer"));
    }

    let version: i64 = version
        .parse()
        .map_err(|_| invalid("version is out of range"))?;

    if version < 1 {
        return Err(MigrationError::VersionBelowMinimum {
            source_name: name.to_string(),
            version,
        });
    }

    Ok(MigrationFileName {
        version,
        description: description.to_string(),
        direction,
    })
}

/// Walk ascending versions and report the holes between neighbours.
///
/// Only the first [`MAX_REPORTED_GAPS`] absent versions are collected, so a
/// timestamp-style version costs no more than a small one.
fn check_contiguous(versions: impl IntoIterator<Item = i64>) -> MigrateResult<()> {
    let mut missing = Vec::new();
    let mut total: u64 = 0;
    let mut previous = 0;

    for version in versions {
        if version > previous + 1 {
            total += (version - previous - 1) as u64;
            let mut absent = previous + 1;
            while absent < version && missing.len() < MAX_REPORTED_GAPS {
                missing.push(absent);
                absent += 1;
            }
        }
        previous = version;
    }

    if total > 0 {
        return Err(MigrationError::VersionGap { missing, total });
    }
    Ok(())
}

#[derive(Debug)]
struct FilePair {
    description: String,
    up: bool,
    down: bool,
}

/// Ordered, validated set of migration units.
#[derive(Debug, Clone)]
pub struct Catalog {
    units: Vec<MigrationUnit>,
}

impl Catalog {
    /// Scan `dir` and merge its files with `customs`.
    ///
    /// Sub-directories are ignored; every other entry, dot-files included,
    /// must be a valid migration file name.
    pub async fn load(dir: &Path, customs: &CustomMigrations) -> MigrateResult<Self> {
        let is_dir = tokio::fs::metadata(dir)
            .await
            .is_ok_and(|meta| meta.is_dir());
        if !is_dir {
            return Err(MigrationError::MissingMigrationsDir(dir.to_path_buf()));
        }

        let mut entries = tokio::fs::read_dir(dir).await.map_err(MigrationError::Io)?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
            if entry.file_type().await.map_err(MigrationError::Io)?.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_str().ok_or_else(|| MigrationError::InvalidFileName {
                file: name.to_string_lossy().into_owned(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;

            names.push(name.to_string());
        }

        names.sort();
        debug!(dir = %dir.display(), files = names.len(), "Scanned migrations directory");

        Self::from_file_names(&names, customs)
    }

    /// Build a catalog from file names and custom migrations.
    ///
    /// Custom migrations may not share a version with a file pair, and the
    /// merged versions must run contiguously from 1.
    pub fn from_file_names<S: AsRef<str>>(
        names: &[S],
        customs: &CustomMigrations,
    ) -> MigrateResult<Self> {
        let mut pairs: BTreeMap<i64, FilePair> = BTreeMap::new();

        for name in names {
            let parsed = parse_file_name(name.as_ref())?;
            let pair = pairs.entry(parsed.version).or_insert_with(|| FilePair {
                description: parsed.description.clone(),
                up: false,
                down: false,
            });

            if pair.description != parsed.description {
                return Err(MigrationError::VersionCollision {
                    version: parsed.version,
                    detail: format!(
                        "files '{}' and '{}' share the version",
                        pair.description, parsed.description
                    ),
                });
            }

            match parsed.direction {
                MigrationDirection::Down => pair.down = true,
                _ => pair.up = true,
            }
        }

        for (version, pair) in &pairs {
            if !pair.up {
                return Err(MigrationError::IncompleteFilePair {
                    version: *version,
                    missing: "up",
                });
            }
            if !pair.down {
                return Err(MigrationError::IncompleteFilePair {
                    version: *version,
                    missing: "down",
                });
            }
        }

        let mut units: BTreeMap<i64, MigrationUnit> = pairs
            .into_iter()
            .map(|(version, pair)| {
                (
                    version,
                    MigrationUnit::File {
                        version,
                        description: pair.description,
                    },
                )
            })
            .collect();

        for (version, migration) in customs.iter() {
            if version < 1 {
                return Err(MigrationError::VersionBelowMinimum {
                    source_name: "custom migration".to_string(),
                    version,
                });
            }
            if let Some(existing) = units.get(&version) {
                return Err(MigrationError::VersionCollision {
                    version,
                    detail: format!(
                        "custom migration collides with file migration '{}'",
                        existing.label()
                    ),
                });
            }
            units.insert(
                version,
                MigrationUnit::Custom {
                    version,
                    migration: migration.clone(),
                },
            );
        }

        let Some(latest) = units.keys().next_back().copied() else {
            return Err(MigrationError::EmptyCatalog);
        };

        check_contiguous(units.keys().copied())?;

        debug!(
            units = units.len(),
            custom = customs.len(),
            latest,
            "Built migration catalog"
        );

        Ok(Self {
            units: units.into_values().collect(),
        })
    }

    /// Units in ascending version order.
    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    /// Get the unit at `version`.
    pub fn get(&self, version: i64) -> Option<&MigrationUnit> {
        self.units
            .binary_search_by_key(&version, MigrationUnit::version)
            .ok()
            .map(|idx| &self.units[idx])
    }

    /// Highest version in the catalog.
    pub fn latest(&self) -> i64 {
        self.units.last().map_or(0, MigrationUnit::version)
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Whether the unit at `version` is a custom migration.
    pub fn is_custom(&self, version: i64) -> bool {
        self.get(version).is_some_and(MigrationUnit::is_custom)
    }

    /// Resolve the requested target version. `None` means the latest
    /// version; 0 means everything rolled back.
    pub fn resolve_target(&self, requested: Option<i64>) -> MigrateResult<i64> {
        let latest = self.latest();
        match requested {
            None => Ok(latest),
            Some(target) if (0..=latest).contains(&target) => Ok(target),
            Some(target) => Err(MigrationError::TargetNotFound { target, latest }),
        }
    }
}
