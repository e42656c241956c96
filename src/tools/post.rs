//! Blog-post tools: README fetch, analysis, outline, draft and polish.

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::json_extract::json_blocks_or_raw;
use crate::llm::Capability;
use crate::model::RepositoryRecord;

use super::truncate_chars;

const README_CANDIDATES: [&str; 3] = ["README.md", "README.rst", "README"];
const MIN_README_CHARS: usize = 20;

fn re_horizontal_rule() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?m)^---\s*$").expect("rule regex"))
}

/// Raw README urls tried in order.
pub fn readme_candidates(raw_base: &str, owner_repo: &str) -> Vec<String> {
    let base = raw_base.trim_end_matches('/');
    README_CANDIDATES
        .iter()
        .map(|file| format!("{base}/{owner_repo}/HEAD/{file}"))
        .collect()
}

/// First candidate answering 200 with more than a trivial body; empty when none does.
pub async fn fetch_readme(ctx: &Context, repo: &RepositoryRecord) -> Result<String> {
    let Some(owner_repo) = repo.owner_repo() else {
        warn!(target: "tools::post", url = %repo.url, "repository url has no owner/repo");
        return Ok(String::new());
    };

    for url in readme_candidates(&ctx.pipeline().readme_raw_base, &owner_repo) {
        match ctx.http.get(&url).await {
            Ok(resp) if resp.is_ok() && resp.body.trim().chars().count() > MIN_README_CHARS => {
                info!(target: "tools::post", %url, "README found");
                return Ok(resp.body);
            }
            Ok(resp) => debug!(target: "tools::post", %url, status = resp.status, "README candidate rejected"),
            Err(e) => debug!(target: "tools::post", %url, error = %e, "README candidate unreachable"),
        }
    }
    warn!(target: "tools::post", repo = %owner_repo, "no usable README");
    Ok(String::new())
}

fn metadata_json(repo: &RepositoryRecord) -> Result<String> {
    serde_json::to_string_pretty(repo).map_err(|e| PipelineError::InvalidPayload(e.to_string()))
}

/// First-person bullet summary of the repository.
pub async fn analyze_repo(ctx: &Context, repo: &RepositoryRecord, readme: &str) -> Result<String> {
    let cfg = ctx.pipeline();
    let system = format!(
        "You are a developer reviewing your own repository to prepare a blog post. \
         Always speak in the first person singular. Write in {}.",
        cfg.locale
    );
    let user = format!(
        "These are the METADATA of my repository and its raw README.\n\n\
         ======== METADATA ========\n{}\n\n\
         ======== README ========\n{}\n\n\
         ----\n\n\
         1. Summarize in bullet points (max 10) what the project does.\n\
         2. Highlight the problem it solves and who benefits from it.",
        metadata_json(repo)?,
        truncate_chars(readme, cfg.analyze_readme_chars)
    );
    ctx.chat(&system, &user).await
}

/// Outline as JSON text (`{title, sections[]}`), or the raw answer when unfenced.
pub async fn generate_outline(ctx: &Context, key_points: &str) -> Result<String> {
    let system = "You are a technical copywriter who structures articles in Markdown.";
    let user = format!(
        "Based on the following key points, design a Markdown structure:\n{key_points}\n\n\
         Return JSON with:\n\
         - title: string (max 80 chars, first person)\n\
         - sections: array[str] (H2 subtitles in logical order, 3-6 items)\n"
    );
    let answer = ctx.chat(system, &user).await?;
    Ok(json_blocks_or_raw(&answer))
}

/// Full markdown draft through the reasoning model.
pub async fn write_post(
    ctx: &Context,
    outline: &str,
    repo: &RepositoryRecord,
    readme: &str,
) -> Result<String> {
    let cfg = ctx.pipeline();
    let system = format!(
        "You are the author of the repository, writing a professional post in the first person. \
         Direct, friendly style, with usage examples where relevant. Write in {}.",
        cfg.locale
    );
    let user = format!(
        "=== OUTLINE (JSON) ===\n{outline}\n\n\
         === METADATA ===\n{}\n\n\
         === README (truncated) ===\n{}\n\n\
         - Write the complete article in Markdown.\n\
         - Every subtitle of the outline must be an H2 heading.\n\
         - Include relevant code snippets when they add value.\n\
         - Keep it between 400 and 800 words.\n\
         - End with a horizontal rule `---` and a call to action inviting readers to visit the repo and send feedback.\n",
        metadata_json(repo)?,
        truncate_chars(readme, cfg.write_readme_chars)
    );
    ctx.respond_text(Capability::Reasoner, &system, &user).await
}

/// Append the call to action unless a horizontal rule line already exists.
pub fn ensure_cta(markdown: &str, cta: &str) -> String {
    if re_horizontal_rule().is_match(markdown) {
        return markdown.to_string();
    }
    format!("{markdown}\n\n---\n{cta}")
}

/// Format-only cleanup pass followed by the CTA guarantee.
pub async fn polish_markdown(ctx: &Context, draft: &str) -> Result<String> {
    let system = "You are a Markdown copy editor. Fix formatting (headings, lists, code blocks) \
                  without changing the content.";
    let cleaned = ctx.chat(system, draft).await?;
    Ok(ensure_cta(&cleaned, &ctx.pipeline().cta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_in_order() {
        let c = readme_candidates("https://raw.githubusercontent.com/", "acme/widget");
        assert_eq!(
            c,
            vec![
                "https://raw.githubusercontent.com/acme/widget/HEAD/README.md",
                "https://raw.githubusercontent.com/acme/widget/HEAD/README.rst",
                "https://raw.githubusercontent.com/acme/widget/HEAD/README",
            ]
        );
    }

    #[test]
    fn rule_with_trailing_spaces_counts() {
        let md = "# T\n\nbody\n\n---   \nThanks";
        assert_eq!(ensure_cta(md, "CTA"), md);
    }

    #[test]
    fn inline_dashes_do_not_count() {
        let out = ensure_cta("a --- b", "CTA");
        assert_eq!(out, "a --- b\n\n---\nCTA");
    }
}
