//! Turns rules and mappings into an ordered `MigrationPlan`.
//!
//! Phases run in a fixed order and each appends deterministic steps:
//! 1. directory structure (`mkdir_NNN`)
//! 2. ROM organization (`rom_dir_NNN`, `rom_link_NNN`)
//! 3. emulator paths (`emu_dir_NNN`)
//! 4. compatibility symlinks (`symlink_NNN`)
//!
//! Planning performs no mutation. Existing targets still get a step, whose
//! description says it will be skipped, so previews show the full picture.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::MigrateError;
use crate::fs_ops::relative_path;
use crate::mapping::{
    EmulatorMapping, PLACEHOLDER_EMULATOR, PLACEHOLDER_FULL_NAME, PLACEHOLDER_SHORT_NAME, PlatformMapping, RuleSet,
    SymlinkRule,
};
use crate::model::{MigrationPlan, MigrationStep};
use crate::progress::{NullProgress, ProgressSink, emit};

/// Fresh, empty plan with a `plan_<8 hex>` id.
pub fn new_plan(description: impl Into<String>) -> MigrationPlan {
    let id = Uuid::new_v4().simple().to_string();
    MigrationPlan::new(format!("plan_{}", &id[..8]), description)
}

fn step_id(prefix: &str, seq: usize) -> String {
    format!("{prefix}_{seq:03}")
}

/// `rel` under `base`, ignoring trailing separators from rule files.
fn under(base: &Path, rel: &str) -> PathBuf {
    base.join(rel.trim_end_matches(['/', '\\']))
}

fn skip_note(path: &Path) -> &'static str {
    if path.is_dir() { " (already exists; will be skipped)" } else { "" }
}

#[derive(Default)]
struct Bindings<'a> {
    short_name: Option<&'a str>,
    full_name: Option<&'a str>,
    emulator: Option<&'a str>,
}

impl Bindings<'_> {
    fn expand(&self, pattern: &str) -> String {
        let mut out = pattern.to_string();
        if let Some(v) = self.short_name {
            out = out.replace(PLACEHOLDER_SHORT_NAME, v);
        }
        if let Some(v) = self.full_name {
            out = out.replace(PLACEHOLDER_FULL_NAME, v);
        }
        if let Some(v) = self.emulator {
            out = out.replace(PLACEHOLDER_EMULATOR, v);
        }
        out
    }
}

pub struct PlanBuilder {
    base_path: PathBuf,
    progress: Arc<dyn ProgressSink>,
}

impl PlanBuilder {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            progress: Arc::new(NullProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Validate inputs, then run all four phases in order.
    pub fn build(
        &self,
        emulators: &EmulatorMapping,
        platforms: &PlatformMapping,
        rules: &RuleSet,
    ) -> Result<MigrationPlan, MigrateError> {
        rules.validate()?;
        emulators.validate()?;
        platforms.validate()?;

        let mut plan = new_plan(format!("Restructure {}", self.base_path.display()));
        plan.extend_steps(self.plan_directory_structure(rules));
        plan.extend_steps(self.plan_rom_organization(platforms, rules));
        plan.extend_steps(self.plan_emulator_paths(emulators, rules));
        plan.extend_steps(self.plan_symlink_creation(emulators, platforms, rules));
        info!(plan_id = %plan.plan_id, steps = plan.total_steps(), "Migration plan built");
        Ok(plan)
    }

    pub fn plan_directory_structure(&self, rules: &RuleSet) -> Vec<MigrationStep> {
        emit(self.progress.as_ref(), "Planning directory structure...");
        rules
            .required_directories
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let target = under(&self.base_path, &rule.path);
                let mut description = format!("Create directory {}", rule.path.trim_end_matches(['/', '\\']));
                if !rule.purpose.is_empty() {
                    description.push_str(&format!(": {}", rule.purpose));
                }
                description.push_str(skip_note(&target));
                MigrationStep::create_directory(step_id("mkdir", i + 1), target, description)
            })
            .collect()
    }

    /// Per platform: `Roms/<full>` plus a short-name link to it.
    pub fn plan_rom_organization(&self, platforms: &PlatformMapping, rules: &RuleSet) -> Vec<MigrationStep> {
        emit(self.progress.as_ref(), "Planning ROM organization...");
        let links_dir = under(&self.base_path, &rules.layout.rom_links);
        let mut steps = Vec::with_capacity(platforms.mappings.len() * 2);
        for (i, (short, full)) in platforms.mappings.iter().enumerate() {
            let rom_dir = under(&self.base_path, &rules.layout.roms).join(full);
            let description = format!("Create ROM directory for {full}{}", skip_note(&rom_dir));
            steps.push(MigrationStep::create_directory(step_id("rom_dir", i + 1), &rom_dir, description));

            let source = relative_path(&links_dir, &rom_dir);
            steps.push(MigrationStep::create_symlink(
                step_id("rom_link", i + 1),
                source,
                links_dir.join(short),
                format!("Create symlink: {short} -> {full}"),
            ));
        }
        steps
    }

    pub fn plan_emulator_paths(&self, emulators: &EmulatorMapping, rules: &RuleSet) -> Vec<MigrationStep> {
        emit(self.progress.as_ref(), "Planning emulator paths...");
        let root = under(&self.base_path, &rules.layout.emulators);
        emulators
            .emulators
            .keys()
            .enumerate()
            .map(|(i, name)| {
                let dir = root.join(name);
                let description = format!("Create emulator directory for {name}{}", skip_note(&dir));
                MigrationStep::create_directory(step_id("emu_dir", i + 1), dir, description)
            })
            .collect()
    }

    pub fn plan_symlink_creation(
        &self,
        emulators: &EmulatorMapping,
        platforms: &PlatformMapping,
        rules: &RuleSet,
    ) -> Vec<MigrationStep> {
        emit(self.progress.as_ref(), "Planning compatibility symlinks...");
        let mut steps = Vec::new();
        for rule in &rules.required_symlinks {
            for bindings in expansions(rule, emulators, platforms) {
                let seq = steps.len() + 1;
                steps.push(self.link_step(rule, &bindings, seq));
            }
        }
        steps
    }

    fn link_step(&self, rule: &SymlinkRule, bindings: &Bindings<'_>, seq: usize) -> MigrationStep {
        let target_rel = bindings.expand(&rule.target_pattern);
        let source_rel = bindings.expand(&rule.source_pattern);
        let target = under(&self.base_path, &target_rel);
        let source_abs = under(&self.base_path, &source_rel);
        let source = match (rule.relative, target.parent()) {
            (true, Some(parent)) => relative_path(parent, &source_abs),
            _ => source_abs,
        };
        let description = if rule.description.is_empty() {
            format!("Link {target_rel} -> {source_rel}")
        } else {
            format!("{}: {target_rel} -> {source_rel}", rule.description)
        };
        debug!(target = %target.display(), source = %source.display(), "Planned link");
        MigrationStep::create_symlink(step_id("symlink", seq), source, target, description)
    }
}

/// Placeholder bindings for one rule, in deterministic order.
fn expansions<'a>(
    rule: &SymlinkRule,
    emulators: &'a EmulatorMapping,
    platforms: &'a PlatformMapping,
) -> Vec<Bindings<'a>> {
    match (rule.uses_emulator(), rule.uses_platform()) {
        (true, true) => emulators
            .emulators
            .iter()
            .flat_map(|(name, entry)| {
                entry.platforms.iter().filter_map(move |short| {
                    platforms.mappings.get_key_value(short.as_str()).map(|(s, full)| Bindings {
                        short_name: Some(s.as_str()),
                        full_name: Some(full.as_str()),
                        emulator: Some(name.as_str()),
                    })
                })
            })
            .collect(),
        (true, false) => emulators
            .emulators
            .keys()
            .map(|name| Bindings {
                emulator: Some(name.as_str()),
                ..Bindings::default()
            })
            .collect(),
        (false, true) => platforms
            .mappings
            .iter()
            .map(|(short, full)| Bindings {
                short_name: Some(short.as_str()),
                full_name: Some(full.as_str()),
                emulator: None,
            })
            .collect(),
        (false, false) => vec![Bindings::default()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{DirectoryRule, EmulatorEntry};
    use crate::model::StepAction;

    fn platforms() -> PlatformMapping {
        serde_json::from_str(r#"{"nds": "Nintendo DS", "gba": "Game Boy Advance"}"#).unwrap()
    }

    fn emulators() -> EmulatorMapping {
        let mut m = EmulatorMapping::default();
        m.emulators.insert(
            "melonDS".into(),
            EmulatorEntry {
                platforms: ["nds".to_string()].into(),
                executable: None,
            },
        );
        m
    }

    #[test]
    fn plan_ids_have_prefix_and_eight_hex_chars() {
        let plan = new_plan("x");
        let hex = plan.plan_id.strip_prefix("plan_").unwrap();
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rom_phase_links_short_name_to_full_name_dir() {
        let steps = PlanBuilder::new("/sd").plan_rom_organization(&platforms(), &RuleSet::default());
        let ids: Vec<_> = steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(ids, ["rom_dir_001", "rom_link_001", "rom_dir_002", "rom_link_002"]);
        match &steps[3].action {
            StepAction::CreateSymlink {
                source_path,
                target_path,
            } => {
                assert_eq!(source_path, Path::new("../../Roms/Nintendo DS"));
                assert_eq!(target_path, Path::new("/sd/Emulation/roms/nds"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn empty_mappings_give_empty_phases() {
        let b = PlanBuilder::new("/sd");
        let rules = RuleSet::default_layout();
        assert!(b.plan_rom_organization(&PlatformMapping::default(), &rules).is_empty());
        assert!(b.plan_emulator_paths(&EmulatorMapping::default(), &rules).is_empty());
        assert!(b
            .plan_symlink_creation(&EmulatorMapping::default(), &PlatformMapping::default(), &rules)
            .is_empty());
    }

    #[test]
    fn emulator_rules_expand_per_emulator_with_relative_sources() {
        let steps = PlanBuilder::new("/sd").plan_symlink_creation(&emulators(), &platforms(), &RuleSet::default_layout());
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].step_id, "symlink_001");
        assert_eq!(steps[0].action.target_path(), Path::new("/sd/Emulators/melonDS/shaders"));
        assert_eq!(steps[0].action.source_path(), Some(Path::new("../../Emulation/shaders")));
    }

    #[test]
    fn combined_placeholders_follow_emulator_platforms() {
        let rules = RuleSet {
            required_symlinks: vec![SymlinkRule {
                source_pattern: "Roms/{full_name}".into(),
                target_pattern: "Emulators/{emulator}/roms/{short_name}".into(),
                description: String::new(),
                relative: false,
                required: true,
            }],
            ..RuleSet::default()
        };
        let steps = PlanBuilder::new("/sd").plan_symlink_creation(&emulators(), &platforms(), &rules);
        assert_eq!(steps.len(), 1, "only nds belongs to melonDS");
        assert_eq!(steps[0].action.source_path(), Some(Path::new("/sd/Roms/Nintendo DS")));
    }

    #[test]
    fn existing_directories_are_planned_with_skip_note() {
        let td = tempfile::tempdir().unwrap();
        std::fs::create_dir(td.path().join("Emulation")).unwrap();
        let rules = RuleSet {
            required_directories: vec![DirectoryRule {
                path: "Emulation/".into(),
                purpose: String::new(),
                required: true,
            }],
            ..RuleSet::default()
        };
        let steps = PlanBuilder::new(td.path()).plan_directory_structure(&rules);
        assert_eq!(steps.len(), 1);
        assert!(steps[0].description.contains("will be skipped"));
        assert_eq!(steps[0].action.target_path(), td.path().join("Emulation"));
    }

    #[test]
    fn build_rejects_invalid_input_without_side_effects() {
        let mut bad = emulators();
        bad.emulators.get_mut("melonDS").unwrap().platforms.clear();
        let err = PlanBuilder::new("/sd")
            .build(&bad, &platforms(), &RuleSet::default_layout())
            .unwrap_err();
        assert!(matches!(err, MigrateError::Planning(_)));
    }
}
