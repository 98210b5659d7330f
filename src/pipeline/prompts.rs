//! Prompt builders and parsing of model replies.

use serde::Deserialize;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fenced block pattern")
});

/// A chapter start proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChapterCandidate {
    /// Chapter title as printed.
    pub title: String,
    /// First page of the chapter.
    pub start_page: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CandidateReply {
    Wrapped { chapters: Vec<ChapterCandidate> },
    Bare(Vec<ChapterCandidate>),
}

const CANDIDATE_SCHEMA: &str = r#"Reply with JSON only, shaped as {"chapters": [{"title": "...", "start_page": 1}]}."#;

pub(crate) fn page_extraction(doc_name: &str, page: u32) -> String {
    format!(
        "You are transcribing page {page} of the document \"{doc_name}\".\n\
         Return the full text of the page in reading order as plain markdown. \
         Describe figures and tables in place. Do not add commentary."
    )
}

pub(crate) fn toc_mining(pages: &[(u32, &str)]) -> String {
    format!(
        "The following are the first pages of a document. If they contain a table of contents, \
         list every top-level chapter with the page it starts on. If there is no table of \
         contents, return an empty list.\n{CANDIDATE_SCHEMA}\n\n{}",
        render_pages(pages)
    )
}

pub(crate) fn chapter_detection(pages: &[(u32, &str)]) -> String {
    format!(
        "Identify chapter headings that begin on the following pages. Only report headings that \
         start a new top-level section. Return an empty list when none start here.\n\
         {CANDIDATE_SCHEMA}\n\n{}",
        render_pages(pages)
    )
}

pub(crate) fn chapter_summary(title: &str, text: &str) -> String {
    format!(
        "Summarize the chapter \"{title}\" in one or two paragraphs. Keep names, figures, and \
         defined terms exact.\n\n{text}"
    )
}

pub(crate) fn chapter_refactor(title: &str, text: &str) -> String {
    format!(
        "Rewrite the chapter \"{title}\" as clean, well structured markdown. Fix transcription \
         artifacts and broken line wraps. Keep all content.\n\n{text}"
    )
}

pub(crate) fn document_abstract(doc_name: &str, summaries: &[(&str, &str)]) -> String {
    let body = summaries
        .iter()
        .map(|(title, summary)| format!("## {title}\n{summary}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Write a brief abstract of the document \"{doc_name}\" from its chapter summaries, \
         in the order given. Cover its purpose and main points in a few paragraphs.\n\n{body}"
    )
}

fn render_pages(pages: &[(u32, &str)]) -> String {
    pages
        .iter()
        .map(|(page, text)| format!("--- page {page} ---\n{text}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Locate the JSON payload in a model reply.
///
/// Prefers a fenced block; otherwise takes the span from the first opening bracket to the
/// last matching closing bracket.
pub(crate) fn extract_json(reply: &str) -> Option<&str> {
    let body = FENCED_BLOCK
        .captures(reply)
        .and_then(|captures| captures.get(1))
        .map_or(reply, |m| m.as_str())
        .trim();

    let start = body.find(['{', '['])?;
    let close = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(close)?;
    (end > start).then(|| &body[start..=end])
}

/// Parse chapter candidates from a model reply; unparseable replies yield none.
pub(crate) fn parse_candidates(reply: &str) -> Vec<ChapterCandidate> {
    let Some(json) = extract_json(reply) else {
        tracing::debug!("Model reply contained no JSON payload");
        return Vec::new();
    };
    match serde_json::from_str::<CandidateReply>(json) {
        Ok(CandidateReply::Wrapped { chapters }) | Ok(CandidateReply::Bare(chapters)) => chapters,
        Err(error) => {
            tracing::warn!(error = %error, "Discarding unparseable chapter candidates");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_and_chatty_replies() {
        let fenced = "Here you go:\n```json\n{\"chapters\": []}\n```\nThanks";
        assert_eq!(extract_json(fenced), Some("{\"chapters\": []}"));

        let chatty = "Sure! {\"chapters\": [{\"title\": \"A\", \"start_page\": 1}]} Hope it helps.";
        assert_eq!(
            extract_json(chatty),
            Some("{\"chapters\": [{\"title\": \"A\", \"start_page\": 1}]}")
        );
        assert_eq!(extract_json("no structure here"), None);
    }

    #[test]
    fn parses_wrapped_and_bare_candidate_lists() {
        let wrapped = parse_candidates(r#"{"chapters": [{"title": "Intro", "start_page": 1}]}"#);
        assert_eq!(
            wrapped,
            vec![ChapterCandidate {
                title: "Intro".into(),
                start_page: 1
            }]
        );

        let bare = parse_candidates(r#"[{"title": "Body", "start_page": 4}]"#);
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].start_page, 4);
    }

    #[test]
    fn malformed_replies_yield_no_candidates() {
        assert!(parse_candidates("{\"chapters\": [{\"title\": 3}]}").is_empty());
        assert!(parse_candidates("I could not find a table of contents.").is_empty());
    }
}
