//! The offline build step: reconcile the static-file adapter pair, splice
//! the serialized collection into the listing page, and regenerate one
//! detail page per proposal.
//!
//! Every step is best-effort. A failed write is recorded and later steps
//! keep going with the in-memory array; the CLI turns any recorded failure
//! into a non-zero exit.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::models::proposal::{slugify, Proposal};
use crate::store::adapter::CollectionAdapter;
use crate::store::static_files::{merge_collections, StaticFileAdapter};

/// Markers delimiting the injection region in the listing page.
pub const DATA_START: &str = "<!-- PROPOSALS_DATA_START -->";
pub const DATA_END: &str = "<!-- PROPOSALS_DATA_END -->";

/// The one slug that keeps its pre-rename URL alive. Old links point at
/// `proposal/new-delhi/` (singular), so the build mirrors that page.
pub const LEGACY_SLUG: &str = "new-delhi";

pub const LISTING_FILE: &str = "proposals.html";

pub struct SiteBuild {
    pub data_dir: PathBuf,
    pub site_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub records: usize,
    pub pages_written: usize,
    pub failures: Vec<String>,
}

impl BuildSummary {
    fn fail(&mut self, step: &str, err: impl std::fmt::Display) {
        warn!("{step}: {err}");
        self.failures.push(format!("{step}: {err}"));
    }
}

/// Runs the whole build. Never returns an error; failures are collected in
/// the summary so the caller decides the exit code.
pub async fn run(build: &SiteBuild) -> BuildSummary {
    let mut summary = BuildSummary::default();
    let adapter = StaticFileAdapter::new(&build.data_dir);

    let js = match adapter.load_js().await {
        Ok(records) => records,
        Err(e) => {
            summary.fail("read proposals.js", e);
            Vec::new()
        }
    };
    let json = match adapter.load_json().await {
        Ok(records) => records,
        Err(e) => {
            summary.fail("read proposals.json", e);
            Vec::new()
        }
    };

    let mut merged = merge_collections(js, json);
    if merged.is_empty() {
        // Downstream generation never runs on an empty set.
        merged.push(placeholder_proposal());
        info!("No proposals found in either file; synthesized placeholder");
    }
    summary.records = merged.len();

    if let Err(e) = adapter.save(&merged).await {
        // Keep going with the in-memory array; pages can still be built.
        summary.fail("write data files", e);
    }

    let listing_path = build.site_dir.join(LISTING_FILE);
    if let Err(e) = splice_listing(&listing_path, &merged).await {
        summary.fail("splice listing page", e);
    }

    for proposal in &merged {
        let page_dir = build.site_dir.join("proposals").join(&proposal.slug);
        match write_page(&page_dir, proposal).await {
            Ok(()) => summary.pages_written += 1,
            Err(e) => summary.fail(&format!("write page for '{}'", proposal.slug), e),
        }
    }

    // Pre-rename URL compatibility for the one legacy slug.
    if let Some(proposal) = merged.iter().find(|p| p.slug == LEGACY_SLUG) {
        let legacy_dir = build.site_dir.join("proposal").join(LEGACY_SLUG);
        if let Err(e) = write_page(&legacy_dir, proposal).await {
            summary.fail("write legacy page", e);
        }
    }

    info!(
        "Site build finished: {} records, {} pages, {} failures",
        summary.records,
        summary.pages_written,
        summary.failures.len()
    );
    summary
}

/// The record synthesized when both data files are empty or unreadable.
pub fn placeholder_proposal() -> Proposal {
    Proposal {
        id: "1".to_string(),
        city: "New Delhi".to_string(),
        state: "Delhi".to_string(),
        country: "India".to_string(),
        slug: slugify("New Delhi"),
        title: "Community Health Worker Expansion".to_string(),
        description: "Expand the community health worker network to cover \
                      underserved wards."
            .to_string(),
        background: String::new(),
        policy: String::new(),
        stakeholders: String::new(),
        costs: String::new(),
        metrics: String::new(),
        timeline: String::new(),
        full_text: String::new(),
        tags: vec!["primary-care".to_string()],
        lat: Some(28.6139),
        lng: Some(77.2090),
        created_at: None,
        submitter_name: String::new(),
        email: String::new(),
        institution: String::new(),
    }
}

async fn splice_listing(path: &Path, proposals: &[Proposal]) -> Result<(), anyhow::Error> {
    let html = tokio::fs::read_to_string(path).await?;
    let payload = format!(
        "<script>\nconst PROPOSALS = {};\n</script>",
        serde_json::to_string(proposals)?
    );
    let spliced = splice_between(&html, &payload)
        .ok_or_else(|| anyhow::anyhow!("listing page has no injection markers"))?;
    tokio::fs::write(path, spliced).await?;
    Ok(())
}

/// Replaces whatever sits between the data markers, keeping the markers.
pub fn splice_between(html: &str, payload: &str) -> Option<String> {
    let start = html.find(DATA_START)? + DATA_START.len();
    let end = html[start..].find(DATA_END)? + start;
    Some(format!(
        "{}\n{}\n{}",
        &html[..start],
        payload,
        &html[end..]
    ))
}

async fn write_page(dir: &Path, proposal: &Proposal) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join("index.html"), render_detail_page(proposal)).await
}

/// Renders one proposal detail page. Empty narrative fields render nothing
/// rather than empty sections.
pub fn render_detail_page(p: &Proposal) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>{} — {}</title>\n",
        escape_html(&p.title),
        escape_html(&p.city)
    ));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n", escape_html(&p.title)));

    let location = [p.city.as_str(), p.state.as_str(), p.country.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    html.push_str(&format!(
        "<p class=\"location\">{}</p>\n",
        escape_html(&location)
    ));

    let sections = [
        ("Description", &p.description),
        ("Background", &p.background),
        ("Policy", &p.policy),
        ("Stakeholders", &p.stakeholders),
        ("Costs", &p.costs),
        ("Metrics", &p.metrics),
        ("Timeline", &p.timeline),
        ("Full Proposal", &p.full_text),
    ];
    for (heading, body) in sections {
        if body.is_empty() {
            continue;
        }
        html.push_str(&format!(
            "<section>\n<h2>{heading}</h2>\n<p>{}</p>\n</section>\n",
            escape_html(body)
        ));
    }

    if !p.tags.is_empty() {
        html.push_str("<ul class=\"tags\">\n");
        for tag in &p.tags {
            html.push_str(&format!("<li>{}</li>\n", escape_html(tag)));
        }
        html.push_str("</ul>\n");
    }

    if !p.submitter_name.is_empty() || !p.institution.is_empty() {
        html.push_str(&format!(
            "<footer>Submitted by {}{}</footer>\n",
            escape_html(&p.submitter_name),
            if p.institution.is_empty() {
                String::new()
            } else {
                format!(", {}", escape_html(&p.institution))
            }
        ));
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
