//! Skills — SKILL.md instruction documents that teach the assistant.
//!
//! A skill is a markdown file whose first block is YAML frontmatter
//! (`name`, `description`, optional `priority` and `metadata`) followed
//! by the instruction body. Skills load from a precedence-ordered list
//! of directories; later directories override earlier ones by name, and
//! within a directory a higher `priority` wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// YAML frontmatter of a SKILL.md file.
#[derive(Debug, Clone, Deserialize)]
struct SkillFrontmatter {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

/// A loaded skill definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    /// Unique identifier.
    pub name: String,
    /// Short description for token-efficient listings.
    pub description: String,
    /// Full prompt text (the markdown body).
    pub instructions: String,
    /// Load priority — higher wins within a directory.
    pub priority: i32,
    /// Extra frontmatter fields.
    pub metadata: Option<serde_json::Value>,
    /// Where the skill was loaded from.
    pub source_path: String,
}

/// Parse a SKILL.md document: frontmatter between `---` delimiters,
/// then the instruction body. Returns `None` when the frontmatter is
/// missing or invalid.
pub fn parse_skill_file(path: &Path, raw: &str) -> Option<Skill> {
    let rest = raw.strip_prefix("---")?;
    let (frontmatter, body) = match rest.split_once("\n---") {
        Some((fm, body)) => (fm, body),
        None => {
            warn!(path = %path.display(), "skill file has no closing frontmatter delimiter");
            return None;
        }
    };

    let fm: SkillFrontmatter = match serde_yaml::from_str(frontmatter) {
        Ok(fm) => fm,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid YAML frontmatter in skill file");
            return None;
        }
    };
    if fm.name.trim().is_empty() {
        warn!(path = %path.display(), "skill has an empty name");
        return None;
    }

    // The body starts right after the closing delimiter line.
    let body = body.trim_start_matches(|c| c == '-').trim().to_owned();

    Some(Skill {
        name: fm.name,
        description: fm.description,
        instructions: body,
        priority: fm.priority,
        metadata: fm.metadata,
        source_path: path.display().to_string(),
    })
}

/// Registry of loaded skills, initialised once at startup.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Skill>,
}

impl SkillRegistry {
    /// Load skills from the precedence-ordered directory list.
    ///
    /// Directories, lowest precedence first:
    /// 1. built-in `skills/` shipped next to the binary,
    /// 2. `skills/` in the working directory,
    /// 3. the configured custom directory.
    pub fn load(custom_dir: Option<&str>) -> Self {
        let mut dirs: Vec<PathBuf> = Vec::new();

        if let Ok(exe) = std::env::current_exe() {
            if let Some(parent) = exe.parent() {
                dirs.push(parent.join("skills"));
            }
        }
        dirs.push(PathBuf::from("skills"));
        if let Some(custom) = custom_dir {
            dirs.push(PathBuf::from(custom));
        }
        dirs.dedup();

        Self::load_from_dirs(&dirs)
    }

    /// Load from an explicit directory list (lowest precedence first).
    pub fn load_from_dirs(dirs: &[PathBuf]) -> Self {
        // Skill name → (directory index it came from, skill).
        let mut skills: HashMap<String, (usize, Skill)> = HashMap::new();

        for (dir_idx, dir) in dirs.iter().enumerate() {
            for path in discover_skill_files(dir) {
                let raw = match std::fs::read_to_string(&path) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot read skill file");
                        continue;
                    }
                };
                let Some(skill) = parse_skill_file(&path, &raw) else {
                    continue;
                };

                // Later directories override earlier ones; within one
                // directory the higher priority wins.
                if let Some((existing_dir, existing)) = skills.get(&skill.name) {
                    if *existing_dir == dir_idx && existing.priority > skill.priority {
                        debug!(
                            name = %skill.name,
                            "skipping skill with lower priority than already loaded"
                        );
                        continue;
                    }
                }

                debug!(name = %skill.name, path = %path.display(), "skill loaded");
                skills.insert(skill.name.clone(), (dir_idx, skill));
            }
        }

        info!(count = skills.len(), dirs = dirs.len(), "skills loaded");
        Self {
            skills: skills
                .into_iter()
                .map(|(name, (_, skill))| (name, skill))
                .collect(),
        }
    }

    /// Get a skill by name.
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// Get just the instruction text of a skill.
    pub fn get_prompt(&self, name: &str) -> Option<&str> {
        self.skills.get(name).map(|s| s.instructions.as_str())
    }

    /// Number of loaded skills.
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Combine several skill prompts into one system prompt with
    /// section separators. Missing skills are skipped.
    pub fn combined_prompt(&self, names: &[&str]) -> String {
        let mut parts = Vec::new();
        for name in names {
            match self.get(name) {
                Some(skill) => {
                    let header = if skill.description.is_empty() {
                        &skill.name
                    } else {
                        &skill.description
                    };
                    parts.push(format!("=== {header} ===\n{}", skill.instructions));
                }
                None => warn!(name, "skill not found for combined prompt"),
            }
        }
        parts.join("\n\n")
    }

    /// Token-efficient XML enumeration of all skills for inclusion in a
    /// system prompt. Empty string when no skills are loaded.
    pub fn format_for_prompt(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }

        let mut entries: Vec<&Skill> = self.skills.values().collect();
        entries.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));

        let mut parts = vec!["<available_skills>".to_owned()];
        for skill in entries {
            parts.push(format!(
                "  <skill><name>{}</name><description>{}</description></skill>",
                escape_xml(&skill.name),
                escape_xml(&skill.description),
            ));
        }
        parts.push("</available_skills>".to_owned());
        parts.join("\n")
    }
}

/// Find all `SKILL.md` files under a directory (one level of skill
/// subdirectories, plus loose files), sorted for determinism.
fn discover_skill_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let candidate = path.join("SKILL.md");
            if candidate.is_file() {
                found.push(candidate);
            }
        } else if path.file_name().is_some_and(|n| n == "SKILL.md") {
            found.push(path);
        }
    }

    found.sort();
    found
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;")
}
