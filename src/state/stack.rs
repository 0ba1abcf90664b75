use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// Language and framework of the target repository, cached per issue once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechStack {
    pub lang: String,
    pub framework: String,
}

/// Marker file → stack, checked in order.
const MARKERS: [(&str, &str, &str); 7] = [
    ("manage.py", "python", "django"),
    ("pyproject.toml", "python", "pytest"),
    ("requirements.txt", "python", "pytest"),
    ("setup.py", "python", "pytest"),
    ("Cargo.toml", "rust", "cargo"),
    ("package.json", "javascript", "node"),
    ("go.mod", "go", "go-test"),
];

impl TechStack {
    fn new(lang: &str, framework: &str) -> Self {
        Self {
            lang: lang.to_string(),
            framework: framework.to_string(),
        }
    }

    pub fn detect(repo_root: &Path) -> Self {
        MARKERS
            .iter()
            .find(|(marker, _, _)| repo_root.join(marker).exists())
            .map(|(_, lang, framework)| Self::new(lang, framework))
            .unwrap_or_else(|| Self::new("python", "pytest"))
    }

    fn is_valid(&self) -> bool {
        !self.lang.trim().is_empty() && !self.framework.trim().is_empty()
    }

    /// Guidance paragraph for the code-generation prompt.
    pub fn tech_context(&self) -> String {
        match (self.lang.as_str(), self.framework.as_str()) {
            ("python", "django") => "Project uses **Python 3.x** and **Django 5.x**.\n\
                 Follow Django best practices:\n\
                 - Organize code into apps (`views.py`, `urls.py`, `templates/`).\n\
                 - Use Django templating for HTML.\n\
                 - Keep code production-ready and PEP8-compliant."
                .to_string(),
            ("python", _) => "Project uses **Python 3.x** with **pytest**.\n\
                 - Keep code production-ready and PEP8-compliant."
                .to_string(),
            (lang, framework) => format!("Project uses **{lang}** ({framework})."),
        }
    }
}

/// Read a cached stack. Missing, unreadable or incomplete records count as absent.
pub fn load(path: &Path) -> Option<TechStack> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<TechStack>(&content) {
        Ok(stack) if stack.is_valid() => Some(stack),
        Ok(_) => {
            debug!("incomplete stack cache {}", path.display());
            None
        }
        Err(e) => {
            debug!("unreadable stack cache {}: {e}", path.display());
            None
        }
    }
}

pub fn save(path: &Path, stack: &TechStack) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(stack)?)?;
    Ok(())
}

/// Cached stack when present, otherwise detect it and write it once.
pub fn resolve(cache_path: &Path, repo_root: &Path) -> Result<TechStack> {
    if let Some(stack) = load(cache_path) {
        debug!("using cached stack {}/{}", stack.lang, stack.framework);
        return Ok(stack);
    }

    let stack = TechStack::detect(repo_root);
    info!("detected stack {}/{}", stack.lang, stack.framework);
    save(cache_path, &stack)?;
    Ok(stack)
}
