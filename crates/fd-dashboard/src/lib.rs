#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fd_layout::Layout;
use fd_types::ErrorKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_RENDERER_SRC: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid artifact name {name:?}: expected [A-Za-z0-9_.-]+")]
    InvalidArtifactName { name: String },
    #[error("shell section {id:?} appears more than once")]
    DuplicateSection { id: String },
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

impl DashboardError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WriteFailure { .. } => ErrorKind::Io,
            Self::InvalidArtifactName { .. } | Self::DuplicateSection { .. } => {
                ErrorKind::Parameter
            }
            Self::Encode(_) => ErrorKind::Shape,
        }
    }
}

/// How the shell embeds its sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedMode {
    /// `<iframe src="{name}.html">` next to the shell on disk.
    #[default]
    Reference,
    /// The page document is inlined through `srcdoc`.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Script URL loaded by each page before the figure is drawn. It must
    /// provide the plotly.js global `Plotly.newPlot`; without it the page
    /// marks `#figure` with `data-pending` and draws nothing.
    pub renderer_src: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            renderer_src: DEFAULT_RENDERER_SRC.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub name: String,
    pub title: String,
    pub html: String,
}

impl RenderedPage {
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.html", self.name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShellSection<'a> {
    pub id: &'a str,
    pub label: &'a str,
    pub page: &'a RenderedPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTile {
    pub label: String,
    pub value: String,
}

impl SummaryTile {
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

#[must_use]
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// JSON that is safe inside a `<script>` element.
fn script_json(value: &impl Serialize) -> Result<String, DashboardError> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

pub fn validate_artifact_name(name: &str) -> Result<(), DashboardError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(DashboardError::InvalidArtifactName {
            name: name.to_owned(),
        })
    }
}

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;margin:0;padding:16px;background:#fff;color:#222}\
h1{font-size:20px;margin:0 0 12px}\
#figure{width:100%}\
.cells{list-style:none;padding:0;color:#666;font-size:13px}";

/// Defines `window.fdRender(id, figure)`, which maps each panel body onto
/// plotly.js traces, then draws the embedded figure into `#figure`.
const PAGE_BOOT: &str = include_str!("figure.js");

/// Render one layout into a self-contained document.
pub fn render_page(
    name: &str,
    layout: &Layout,
    options: &RenderOptions,
) -> Result<RenderedPage, DashboardError> {
    validate_artifact_name(name)?;
    let figure = script_json(layout)?;
    let title = escape_html(&layout.title);

    let mut html = String::with_capacity(figure.len() + 2048);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n"));
    html.push_str(&format!("<style>{PAGE_STYLE}</style>\n"));
    html.push_str(&format!(
        "<script src=\"{}\"></script>\n",
        escape_html(&options.renderer_src)
    ));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{title}</h1>\n"));
    html.push_str(&format!(
        "<div id=\"figure\" style=\"height:{}px\"></div>\n",
        layout.height_px
    ));
    html.push_str("<ul class=\"cells\">\n");
    for cell in &layout.cells {
        let label = cell
            .title
            .as_deref()
            .or_else(|| cell.panels.first().and_then(|p| p.title.as_deref()))
            .unwrap_or("");
        html.push_str(&format!(
            "<li data-row=\"{}\" data-col=\"{}\">{}</li>\n",
            cell.row,
            cell.col,
            escape_html(label)
        ));
    }
    html.push_str("</ul>\n");
    html.push_str(&format!(
        "<script type=\"application/json\" id=\"figure-data\">{figure}</script>\n"
    ));
    html.push_str(&format!("<script>{PAGE_BOOT}</script>\n"));
    html.push_str("</body>\n</html>\n");

    tracing::debug!(name, cells = layout.cells.len(), bytes = html.len(), "page rendered");

    Ok(RenderedPage {
        name: name.to_owned(),
        title: layout.title.clone(),
        html,
    })
}

const SHELL_STYLE: &str = "body{font-family:system-ui,sans-serif;margin:0;background:#f5f6f8;color:#222}\
header{background:#1f2937;color:#fff;padding:20px 24px}\
header h1{margin:0;font-size:24px}\
header p{margin:4px 0 0;opacity:.8}\
.tiles{display:flex;flex-wrap:wrap;gap:12px;padding:16px 24px}\
.tile{background:#fff;border-radius:6px;padding:12px 16px;min-width:140px;box-shadow:0 1px 2px rgba(0,0,0,.1)}\
.tile .value{font-size:22px;font-weight:600}\
.tile .label{font-size:12px;color:#666}\
nav{display:flex;gap:8px;padding:0 24px}\
nav button{border:0;background:#e5e7eb;padding:8px 14px;border-radius:4px;cursor:pointer}\
nav button.active{background:#2563eb;color:#fff}\
section{display:none;padding:16px 24px}\
section.active{display:block}\
iframe{width:100%;height:1300px;border:0;background:#fff}";

const SHELL_BOOT: &str = "function showSection(id){\
document.querySelectorAll('section').forEach(function(s){s.classList.toggle('active',s.id===id);});\
document.querySelectorAll('nav button').forEach(function(b){b.classList.toggle('active',b.dataset.target===id);});\
}";

/// Render the navigable shell over already rendered pages.
pub fn render_shell(
    name: &str,
    title: &str,
    subtitle: &str,
    sections: &[ShellSection<'_>],
    tiles: &[SummaryTile],
    embed: EmbedMode,
) -> Result<RenderedPage, DashboardError> {
    validate_artifact_name(name)?;
    let mut seen = BTreeSet::new();
    for section in sections {
        validate_artifact_name(section.id)?;
        if !seen.insert(section.id) {
            return Err(DashboardError::DuplicateSection {
                id: section.id.to_owned(),
            });
        }
    }

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    html.push_str(&format!("<style>{SHELL_STYLE}</style>\n"));
    html.push_str("</head>\n<body>\n<header>\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(title)));
    if !subtitle.is_empty() {
        html.push_str(&format!("<p>{}</p>\n", escape_html(subtitle)));
    }
    html.push_str("</header>\n<div class=\"tiles\">\n");
    for tile in tiles {
        html.push_str(&format!(
            "<div class=\"tile\"><div class=\"value\">{}</div><div class=\"label\">{}</div></div>\n",
            escape_html(&tile.value),
            escape_html(&tile.label)
        ));
    }
    html.push_str("</div>\n<nav>\n");
    for (i, section) in sections.iter().enumerate() {
        let active = if i == 0 { " class=\"active\"" } else { "" };
        html.push_str(&format!(
            "<button{active} data-target=\"{id}\" onclick=\"showSection('{id}')\">{label}</button>\n",
            id = section.id,
            label = escape_html(section.label)
        ));
    }
    html.push_str("</nav>\n");
    for (i, section) in sections.iter().enumerate() {
        let active = if i == 0 { " class=\"active\"" } else { "" };
        let frame = match embed {
            EmbedMode::Reference => format!(
                "<iframe title=\"{}\" src=\"{}\"></iframe>",
                escape_html(section.label),
                escape_html(&section.page.file_name())
            ),
            EmbedMode::Inline => format!(
                "<iframe title=\"{}\" srcdoc=\"{}\"></iframe>",
                escape_html(section.label),
                escape_html(&section.page.html)
            ),
        };
        html.push_str(&format!(
            "<section id=\"{}\"{active}>\n{frame}\n</section>\n",
            section.id
        ));
    }
    html.push_str(&format!("<script>{SHELL_BOOT}</script>\n"));
    html.push_str("</body>\n</html>\n");

    tracing::debug!(name, sections = sections.len(), tiles = tiles.len(), "shell rendered");

    Ok(RenderedPage {
        name: name.to_owned(),
        title: title.to_owned(),
        html,
    })
}

// ── Artifact output ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenArtifact {
    pub name: String,
    pub file: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub artifacts: Vec<WrittenArtifact>,
}

impl Manifest {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&WrittenArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes artifacts under one root with temp-file-then-rename so a reader
/// never observes a partially written file.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn temp_path(&self, file: &str) -> PathBuf {
        self.root.join(format!(".{file}.tmp"))
    }

    pub fn write_page(&self, page: &RenderedPage) -> Result<WrittenArtifact, DashboardError> {
        validate_artifact_name(&page.name)?;
        self.write_file(&page.name, &page.file_name(), page.html.as_bytes())
    }

    /// Atomically write `bytes` to `root/file`.
    pub fn write_file(
        &self,
        name: &str,
        file: &str,
        bytes: &[u8],
    ) -> Result<WrittenArtifact, DashboardError> {
        let path = self.root.join(file);
        let failure = |source: std::io::Error| DashboardError::WriteFailure {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(failure)?;
        let tmp_path = self.temp_path(file);
        let written = (|| -> std::io::Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(bytes)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(failure(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(failure(err));
        }

        let artifact = WrittenArtifact {
            name: name.to_owned(),
            file: file.to_owned(),
            path,
            bytes: bytes.len() as u64,
            sha256: sha256_hex(bytes),
        };
        tracing::info!(
            name,
            path = %artifact.path.display(),
            bytes = artifact.bytes,
            "artifact written"
        );
        Ok(artifact)
    }
}

/// Write every page, then the shell, then `manifest.json`.
///
/// Stops at the first failure; artifacts written before it stay on disk and
/// no manifest is produced.
pub fn publish(
    writer: &ArtifactWriter,
    pages: &[RenderedPage],
    shell: Option<&RenderedPage>,
) -> Result<Manifest, DashboardError> {
    let mut names = BTreeSet::new();
    for page in pages.iter().chain(shell) {
        validate_artifact_name(&page.name)?;
        if !names.insert(page.name.as_str()) {
            return Err(DashboardError::DuplicateSection {
                id: page.name.clone(),
            });
        }
    }

    let mut manifest = Manifest::default();
    for page in pages.iter().chain(shell) {
        match writer.write_page(page) {
            Ok(artifact) => manifest.artifacts.push(artifact),
            Err(err) => {
                tracing::warn!(
                    page = %page.name,
                    completed = manifest.artifacts.len(),
                    error = %err,
                    "publish stopped"
                );
                return Err(err);
            }
        }
    }

    let encoded = serde_json::to_vec_pretty(&manifest)?;
    writer.write_file("manifest", MANIFEST_FILE, &encoded)?;
    Ok(manifest)
}
