use std::fs;
use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use crate::error::PmError;
use crate::template::{PromptTemplate, names};

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (names::PITCH_TASK, include_str!("../templates/pitch/task.j2")),
    (names::RATING_TASK, include_str!("../templates/rating/task.j2")),
    (names::CHAT_SYSTEM, include_str!("../templates/chat/system.j2")),
    (
        names::CHAT_TRANSCRIPT,
        include_str!("../templates/chat/transcript.j2"),
    ),
    (
        names::STRUCTURED_JSON,
        include_str!("../templates/structured/json.j2"),
    ),
];

const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Manages prompt templates and renders them with context variables.
///
/// A new manager is pre-loaded with the built-in templates. Templates added
/// later under the same name replace the earlier ones, which is how override
/// directories work.
///
/// Rendering is strict: referencing a variable missing from the context is a
/// [`PmError::RenderError`] rather than an empty string.
#[derive(Debug)]
pub struct PromptManager {
    env: Environment<'static>,
}

impl PromptManager {
    /// Create a manager holding the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let mut pm = Self { env };
        for (name, source) in BUILTIN_TEMPLATES {
            pm.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(pm)
    }

    /// Load all `.j2` / `.jinja` templates below a directory.
    ///
    /// The template name is the path relative to `dir` without its extension,
    /// so `dir/pitch/task.j2` overrides the built-in `pitch/task`. Returns the
    /// number of templates loaded.
    ///
    /// # Errors
    ///
    /// Returns `PmError::Io` if the directory cannot be read and
    /// `PmError::InvalidTemplate` if a template fails to parse.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, PmError> {
        let mut loaded = 0;
        self.load_dir_recursive(dir, dir, &mut loaded)?;
        debug!(dir = %dir.display(), loaded, "loaded prompt templates");
        Ok(loaded)
    }

    /// Register a single template, replacing any template with the same name.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if the source fails to parse.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate(format!("{name}: {e}")))
    }

    /// Render a template by name with the given context.
    ///
    /// # Errors
    ///
    /// Returns `PmError::TemplateNotFound` for unknown names and
    /// `PmError::RenderError` if rendering fails.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| PmError::TemplateNotFound(name.to_owned()))?;
        template
            .render(ctx)
            .map_err(|e| PmError::RenderError(format!("{name}: {e}")))
    }

    /// Whether a template with this name is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Names of all registered templates, sorted.
    pub fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .env
            .templates()
            .map(|(name, _)| name.to_owned())
            .collect();
        names.sort();
        names
    }

    fn load_dir_recursive(
        &mut self,
        root: &Path,
        dir: &Path,
        loaded: &mut usize,
    ) -> Result<(), PmError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();

            if path.is_dir() {
                self.load_dir_recursive(root, &path, loaded)?;
                continue;
            }

            let is_template = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext));
            if !is_template {
                continue;
            }

            let Some(name) = template_name(root, &path) else {
                continue;
            };
            let source = fs::read_to_string(&path)?;
            self.add_template(PromptTemplate::new(name, source))?;
            *loaded += 1;
        }
        Ok(())
    }
}

/// Derive `pitch/task` from `<root>/pitch/task.j2`.
fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}
