//! Planner inputs: directory/symlink rules, emulator mapping and platform
//! mapping, plus the provider traits that supply them.
//!
//! Notes:
//! - Inputs are validated once at the boundary (`validate()`); the planner
//!   never probes for optional keys.
//! - Rule paths are relative to the migration base path and may not escape it.
//! - Symlink rules follow step naming: `source_pattern` is what the link points
//!   at, `target_pattern` is where the link is created.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::errors::MigrateError;

/// Placeholders understood in symlink patterns.
pub const PLACEHOLDER_SHORT_NAME: &str = "{short_name}";
pub const PLACEHOLDER_FULL_NAME: &str = "{full_name}";
pub const PLACEHOLDER_EMULATOR: &str = "{emulator}";

const KNOWN_PLACEHOLDERS: [&str; 3] = [PLACEHOLDER_SHORT_NAME, PLACEHOLDER_FULL_NAME, PLACEHOLDER_EMULATOR];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRule {
    pub path: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkRule {
    pub source_pattern: String,
    pub target_pattern: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub relative: bool,
    #[serde(default = "default_true")]
    pub required: bool,
}

impl SymlinkRule {
    fn mentions(&self, placeholder: &str) -> bool {
        self.source_pattern.contains(placeholder) || self.target_pattern.contains(placeholder)
    }

    pub fn uses_platform(&self) -> bool {
        self.mentions(PLACEHOLDER_SHORT_NAME) || self.mentions(PLACEHOLDER_FULL_NAME)
    }

    pub fn uses_emulator(&self) -> bool {
        self.mentions(PLACEHOLDER_EMULATOR)
    }
}

/// Where the planner puts ROM folders, short-name links and emulator installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutNames {
    pub roms: String,
    pub rom_links: String,
    pub emulators: String,
}

impl Default for LayoutNames {
    fn default() -> Self {
        Self {
            roms: "Roms".into(),
            rom_links: "Emulation/roms".into(),
            emulators: "Emulators".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub required_directories: Vec<DirectoryRule>,
    #[serde(default)]
    pub required_symlinks: Vec<SymlinkRule>,
    #[serde(default)]
    pub layout: LayoutNames,
}

impl RuleSet {
    /// Canonical SD layout used when no rules file is supplied.
    pub fn default_layout() -> Self {
        let dirs = [
            ("Emulation", "Resources shared by all emulators and frontends"),
            ("Emulation/bios", "Firmware and BIOS per emulator"),
            ("Emulation/saves", "Saves and states per console"),
            ("Emulation/shaders", "Shared shader assets"),
            ("Emulation/configs", "Configuration overrides per emulator"),
            ("Emulation/roms", "Short-name links for frontend compatibility"),
            ("Emulators", "Emulator installations"),
            ("Roms", "ROM storage by full platform name"),
            ("Frontends", "Frontend configurations"),
            ("Tools/scripts", "Maintenance scripts"),
        ];
        let links = [
            ("Emulation/shaders", "Emulators/{emulator}/shaders", "Shared shader resources"),
            ("Emulation/bios", "Emulators/{emulator}/bios", "Shared BIOS resources"),
            ("Emulation/saves", "Emulators/{emulator}/saves", "Shared save files"),
        ];
        RuleSet {
            required_directories: dirs
                .iter()
                .map(|(path, purpose)| DirectoryRule {
                    path: (*path).to_string(),
                    purpose: (*purpose).to_string(),
                    required: true,
                })
                .collect(),
            required_symlinks: links
                .iter()
                .map(|(source, target, description)| SymlinkRule {
                    source_pattern: (*source).to_string(),
                    target_pattern: (*target).to_string(),
                    description: (*description).to_string(),
                    relative: true,
                    required: true,
                })
                .collect(),
            layout: LayoutNames::default(),
        }
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        check_rule_path(&self.layout.roms, "layout roms")?;
        check_rule_path(&self.layout.rom_links, "layout rom_links")?;
        check_rule_path(&self.layout.emulators, "layout emulators")?;
        for rule in &self.required_directories {
            check_rule_path(&rule.path, "directory rule path")?;
        }
        for rule in &self.required_symlinks {
            check_rule_path(&rule.source_pattern, "symlink source_pattern")?;
            check_rule_path(&rule.target_pattern, "symlink target_pattern")?;
            check_placeholders(&rule.source_pattern)?;
            check_placeholders(&rule.target_pattern)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorEntry {
    #[serde(default, alias = "systems")]
    pub platforms: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorMapping {
    #[serde(default)]
    pub emulators: BTreeMap<String, EmulatorEntry>,
}

impl EmulatorMapping {
    pub fn is_empty(&self) -> bool {
        self.emulators.is_empty()
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        for (name, entry) in &self.emulators {
            check_name(name, "emulator name")?;
            if entry.platforms.is_empty() {
                return Err(MigrateError::Planning(format!("emulator '{name}' lists no platforms")));
            }
            for platform in &entry.platforms {
                check_name(platform, "emulator platform")?;
            }
        }
        Ok(())
    }
}

/// Short platform name (e.g. `nds`) to full folder name (e.g. `Nintendo DS`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PlatformMappingRepr")]
pub struct PlatformMapping {
    pub mappings: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlatformMappingRepr {
    Wrapped { mappings: BTreeMap<String, String> },
    Flat(BTreeMap<String, String>),
}

impl From<PlatformMappingRepr> for PlatformMapping {
    fn from(repr: PlatformMappingRepr) -> Self {
        match repr {
            PlatformMappingRepr::Wrapped { mappings } | PlatformMappingRepr::Flat(mappings) => {
                PlatformMapping { mappings }
            }
        }
    }
}

impl PlatformMapping {
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn full_name(&self, short: &str) -> Option<&str> {
        self.mappings.get(short).map(String::as_str)
    }

    pub fn short_name(&self, full: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|(_, f)| f.as_str() == full)
            .map(|(s, _)| s.as_str())
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        for (short, full) in &self.mappings {
            check_name(short, "platform short name")?;
            check_name(full, "platform full name")?;
        }
        Ok(())
    }
}

/// Supplies the rule set the planner lays out.
pub trait RuleProvider {
    fn rules(&self) -> Result<RuleSet, MigrateError>;
}

/// Supplies emulator and platform mappings.
pub trait MappingProvider {
    fn emulator_mapping(&self) -> Result<EmulatorMapping, MigrateError>;
    fn platform_mapping(&self) -> Result<PlatformMapping, MigrateError>;
}

impl RuleProvider for RuleSet {
    fn rules(&self) -> Result<RuleSet, MigrateError> {
        Ok(self.clone())
    }
}

/// In-memory mappings, for callers that already hold resolved data.
#[derive(Debug, Clone, Default)]
pub struct StaticMappings {
    pub emulators: EmulatorMapping,
    pub platforms: PlatformMapping,
}

impl MappingProvider for StaticMappings {
    fn emulator_mapping(&self) -> Result<EmulatorMapping, MigrateError> {
        Ok(self.emulators.clone())
    }

    fn platform_mapping(&self) -> Result<PlatformMapping, MigrateError> {
        Ok(self.platforms.clone())
    }
}

pub const RULES_FILE: &str = "rules.json";
pub const EMULATOR_MAPPING_FILE: &str = "emulator_mapping.json";
pub const PLATFORM_MAPPING_FILE: &str = "platform_mapping.json";

/// Reads rules and mappings from JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonConfigDir {
    dir: PathBuf,
}

impl JsonConfigDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, MigrateError> {
        let path = self.dir.join(name);
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MigrateError::Planning(format!("cannot read '{}': {e}", path.display())));
            }
        };
        debug!(path = %path.display(), "Loaded mapping input");
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| MigrateError::Planning(format!("malformed '{}': {e}", path.display())))
    }

    fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, MigrateError> {
        self.read(name)?.ok_or_else(|| {
            MigrateError::Planning(format!("missing mapping file '{}'", self.dir.join(name).display()))
        })
    }
}

impl RuleProvider for JsonConfigDir {
    fn rules(&self) -> Result<RuleSet, MigrateError> {
        let rules = self.read::<RuleSet>(RULES_FILE)?.unwrap_or_else(RuleSet::default_layout);
        rules.validate()?;
        Ok(rules)
    }
}

impl MappingProvider for JsonConfigDir {
    fn emulator_mapping(&self) -> Result<EmulatorMapping, MigrateError> {
        let mapping: EmulatorMapping = self.require(EMULATOR_MAPPING_FILE)?;
        mapping.validate()?;
        Ok(mapping)
    }

    fn platform_mapping(&self) -> Result<PlatformMapping, MigrateError> {
        let mapping: PlatformMapping = self.require(PLATFORM_MAPPING_FILE)?;
        mapping.validate()?;
        Ok(mapping)
    }
}

fn check_name(name: &str, what: &str) -> Result<(), MigrateError> {
    if name.trim().is_empty() {
        return Err(MigrateError::Planning(format!("{what} is empty")));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(MigrateError::Planning(format!("{what} '{name}' is not a single path component")));
    }
    Ok(())
}

fn check_rule_path(raw: &str, what: &str) -> Result<(), MigrateError> {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    if trimmed.trim().is_empty() {
        return Err(MigrateError::Planning(format!("{what} is empty")));
    }
    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.starts_with(['/', '\\']) {
        return Err(MigrateError::Planning(format!("{what} '{raw}' must be relative to the base path")));
    }
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(MigrateError::Planning(format!("{what} '{raw}' may not contain '..'")));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(MigrateError::Planning(format!("{what} '{raw}' must be relative to the base path")));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_placeholders(pattern: &str) -> Result<(), MigrateError> {
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            return Err(MigrateError::Planning(format!("unterminated placeholder in '{pattern}'")));
        };
        let token = &rest[open..open + close + 1];
        if !KNOWN_PLACEHOLDERS.contains(&token) {
            return Err(MigrateError::Planning(format!("unknown placeholder {token} in '{pattern}'")));
        }
        rest = &rest[open + close + 1..];
    }
    Ok(())
}
