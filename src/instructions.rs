use askama::Template;
use tracing::debug;

use crate::error::Result;

/// The `index.html` page served at the repository root.
#[derive(Template)]
#[template(path = "index.html")]
pub struct InstructionsTemplate<'a> {
    pub title: &'a str,
    pub product: &'a str,
    pub package_name: &'a str,
    pub repo_package: &'a str,
    pub repo_url: &'a str,
    pub source_line: &'a str,
}

/// Render the installation page for the repository at `repo_url`.
///
/// `source_line` is the `deb ...` line users add by hand.
pub fn render_index_html(repo_url: &str, source_line: &str) -> Result<String> {
    let repo_url = repo_url.trim_end_matches('/');
    let html = InstructionsTemplate {
        title: "Kiro IDE Debian Repository",
        product: "Kiro IDE",
        package_name: "kiro",
        repo_package: "kiro-repo",
        repo_url,
        source_line,
    }
    .render()?;
    debug!(repo_url, length = html.len(), "Rendered installation instructions");
    Ok(html)
}
