//! Digest assembly.
//!
//! Renders the run's processed episodes into a plain HTML document and
//! writes it to the preview path. Templating engines are out of scope; the
//! digest is the handoff artifact for the (external) delivery mechanism.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::ProcessedEpisode;

/// Render the digest HTML. Returns `None` when there is nothing to digest;
/// a run with zero processed episodes withholds the artifact entirely.
pub fn render(episodes: &[ProcessedEpisode]) -> Option<String> {
    if episodes.is_empty() {
        return None;
    }

    let mut html = String::from(
        "<html><body>\n<h1>Daily Podcast Digest</h1>\n",
    );

    for episode in episodes {
        let title = episode.record.title.as_deref().unwrap_or(&episode.guid);
        let summary = episode.record.display_summary().unwrap_or("");

        html.push_str("<h2>");
        html.push_str(&escape(title));
        html.push_str("</h2>\n");

        if let Some(link) = &episode.record.link {
            html.push_str(&format!("<p><a href=\"{}\">Listen</a></p>\n", escape(link)));
        }

        html.push_str("<p>");
        html.push_str(&escape(summary));
        html.push_str("</p>\n");
    }

    html.push_str("</body></html>\n");
    Some(html)
}

/// Write the rendered digest to the preview file.
pub async fn write_preview(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create preview directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, html)
        .await
        .with_context(|| format!("Failed to write preview: {}", path.display()))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
