use handlebars::{Handlebars, HelperDef, no_escape};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Failure to load or render templates.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The views directory could not be walked.
    #[error("failed to scan templates: {0}")]
    Scan(#[from] walkdir::Error),

    /// A template file could not be read.
    #[error("failed to read template '{}': {source}", path.display())]
    Read {
        /// The template file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A glob pattern could not be compiled.
    #[error("invalid template pattern '{pattern}': {source}")]
    Pattern {
        /// The offending glob.
        pattern: String,
        /// Underlying error.
        #[source]
        source: regex::Error,
    },

    /// A template failed to parse.
    #[error(transparent)]
    Template(#[from] handlebars::TemplateError),

    /// No template is registered under the requested name.
    #[error("no template named '{0}'")]
    NoTemplate(String),

    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] handlebars::RenderError),
}

/// Where [`Renderer`] finds its templates. Globs are relative to `views_dir`
/// and support `*`, `?` and `**/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererOptions {
    /// Root of all templates.
    pub views_dir: PathBuf,
    /// Layouts: partials only.
    pub layouts: String,
    /// Components: partials, and templates of their own.
    pub components: String,
    /// Pages: templates.
    pub pages: String,
}

/// HTML renderer over handlebars templates.
///
/// Templates and partials are named by their path relative to the views
/// directory, without extension: `pages/home.hbs` is `pages/home`.
#[derive(Debug, Clone)]
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    /// Loads every template matched by `options`.
    pub fn new(options: &RendererOptions) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        let root = options.views_dir.as_path();

        for (name, content) in load_templates(root, &options.layouts)? {
            registry.register_partial(&name, content)?;
        }

        for (name, content) in load_templates(root, &options.components)? {
            registry.register_partial(&name, &content)?;
            registry.register_template_string(&name, content)?;
        }

        for (name, content) in load_templates(root, &options.pages)? {
            registry.register_template_string(&name, content)?;
        }

        Ok(Self { registry })
    }

    /// Registers a custom helper.
    pub fn register_helper(&mut self, name: &str, helper: impl HelperDef + Send + Sync + 'static) {
        self.registry.register_helper(name, Box::new(helper));
    }

    /// Renders the component or page at `path`.
    pub fn render_html<T: Serialize>(&self, path: &str, data: &T) -> Result<String, RenderError> {
        if !self.registry.has_template(path) {
            return Err(RenderError::NoTemplate(path.to_string()));
        }

        Ok(self.registry.render(path, data)?)
    }
}

/// Plain-text renderer: no HTML escaping and no partials.
#[derive(Debug, Clone)]
pub struct FileRenderer {
    registry: Handlebars<'static>,
}

impl FileRenderer {
    /// Loads every template under `views_dir` matching `pattern`.
    pub fn new(views_dir: impl AsRef<Path>, pattern: &str) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);

        for (name, content) in load_templates(views_dir.as_ref(), pattern)? {
            registry.register_template_string(&name, content)?;
        }

        Ok(Self { registry })
    }

    /// Registers a custom helper.
    pub fn register_helper(&mut self, name: &str, helper: impl HelperDef + Send + Sync + 'static) {
        self.registry.register_helper(name, Box::new(helper));
    }

    /// Renders the template at `path`.
    pub fn render<T: Serialize>(&self, path: &str, data: &T) -> Result<String, RenderError> {
        if !self.registry.has_template(path) {
            return Err(RenderError::NoTemplate(path.to_string()));
        }

        Ok(self.registry.render(path, data)?)
    }
}

fn load_templates(root: &Path, pattern: &str) -> Result<Vec<(String, String)>, RenderError> {
    let matcher = glob_regex(pattern)?;
    let mut templates = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !matcher.is_match(&relative) {
            continue;
        }

        let content = std::fs::read_to_string(entry.path()).map_err(|source| RenderError::Read {
            path: entry.path().to_path_buf(),
            source,
        })?;
        let name = template_name(&relative);

        debug!(name = name.as_str(), pattern = pattern, "Loading template");
        templates.push((name, content));
    }

    Ok(templates)
}

fn template_name(relative: &str) -> String {
    let (dir, file) = match relative.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, relative),
    };

    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };

    match dir {
        Some(dir) => format!("{dir}/{stem}"),
        None => stem.to_string(),
    }
}

fn glob_regex(pattern: &str) -> Result<Regex, RenderError> {
    let mut expression = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    expression.push_str("(?:.*/)?");
                } else {
                    expression.push_str(".*");
                }
            }
            '*' => expression.push_str("[^/]*"),
            '?' => expression.push_str("[^/]"),
            c => expression.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|source| RenderError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}
