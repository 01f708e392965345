//! Citations and their validation against prompt context

use crate::retrieval::{ChunkMetadata, RankedResult};
use crate::text::label_id;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A source reference attached to an answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<String>,
    /// Reference text as written by the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Citation {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Default::default()
        }
    }

    /// Citation pointing at a chunk's own location
    pub fn from_metadata(metadata: &ChunkMetadata) -> Self {
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        Self {
            page: Some(metadata.page),
            chapter: non_empty(&metadata.chapter),
            paragraph: non_empty(&metadata.paragraph),
            reference: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.page.is_none()
            && self.chapter.as_deref().map_or(true, |c| label_id(c).is_empty())
            && self.paragraph.as_deref().map_or(true, |p| label_id(p).is_empty())
    }

    /// True when every field this citation specifies agrees with `metadata`
    pub fn resolves_to(&self, metadata: &ChunkMetadata) -> bool {
        if self.is_empty() {
            return false;
        }

        let page_ok = self.page.map_or(true, |p| p == metadata.page);
        let chapter_ok = label_matches(self.chapter.as_deref(), &metadata.chapter);
        let paragraph_ok = label_matches(self.paragraph.as_deref(), &metadata.paragraph);

        page_ok && chapter_ok && paragraph_ok
    }

    fn same_location(&self, other: &Citation) -> bool {
        self.page == other.page
            && self.chapter == other.chapter
            && self.paragraph == other.paragraph
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(page) = self.page {
            parts.push(format!("page {}", page));
        }
        if let Some(chapter) = &self.chapter {
            parts.push(chapter.clone());
        }
        if let Some(paragraph) = &self.paragraph {
            parts.push(paragraph.clone());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// An unspecified label always agrees; a specified one must name the same identifier
fn label_matches(claimed: Option<&str>, actual: &str) -> bool {
    match claimed.map(label_id) {
        None => true,
        Some(id) if id.is_empty() => true,
        Some(id) => id == label_id(actual),
    }
}

/// Keep only citations that resolve to one of `results`
///
/// Each surviving citation is rewritten to the full location of the result
/// it resolved to, keeping the model's reference text. Duplicates collapse.
pub fn validate_citations(citations: &[Citation], results: &[RankedResult]) -> Vec<Citation> {
    let mut valid: Vec<Citation> = Vec::new();

    for citation in citations {
        let Some(result) = results.iter().find(|r| citation.resolves_to(&r.metadata)) else {
            tracing::debug!("Dropping citation {} not present in context", citation);
            continue;
        };

        let mut resolved = Citation::from_metadata(&result.metadata);
        resolved.reference = citation.reference.clone();
        if !valid.iter().any(|c| c.same_location(&resolved)) {
            valid.push(resolved);
        }
    }

    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Provenance;

    fn result(page: u32, chapter: &str, paragraph: &str) -> RankedResult {
        RankedResult {
            content: "text".to_string(),
            metadata: ChunkMetadata {
                chunk_id: page as i64,
                document_id: 1,
                page,
                chapter: chapter.to_string(),
                paragraph: paragraph.to_string(),
                section_title: String::new(),
                position: page,
            },
            score: 1.0,
            provenance: Provenance::Hybrid,
            distance: Some(0.1),
        }
    }

    #[test]
    fn test_page_citation_validates() {
        let results = vec![result(112, "Глава 5", "§ 2")];
        let valid = validate_citations(&[Citation::page(112), Citation::page(7)], &results);

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].page, Some(112));
        assert_eq!(valid[0].chapter.as_deref(), Some("Глава 5"));
    }

    #[test]
    fn test_chapter_and_paragraph_compared_by_identifier() {
        let results = vec![result(112, "Глава 5. Древний Рим", "§ 2")];
        let claimed = Citation {
            page: Some(112),
            chapter: Some("глава 5".to_string()),
            paragraph: Some("§2".to_string()),
            reference: Some("стр. 112, глава 5, §2".to_string()),
        };
        let wrong_paragraph = Citation {
            paragraph: Some("§ 3".to_string()),
            ..claimed.clone()
        };

        let valid = validate_citations(&[claimed, wrong_paragraph], &results);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].reference.as_deref(), Some("стр. 112, глава 5, §2"));
    }

    #[test]
    fn test_fields_must_agree_on_one_result() {
        // page from one result, paragraph from another
        let results = vec![result(10, "", "§ 1"), result(20, "", "§ 2")];
        let mixed = Citation {
            page: Some(10),
            paragraph: Some("§ 2".to_string()),
            ..Default::default()
        };
        assert!(validate_citations(&[mixed], &results).is_empty());
    }

    #[test]
    fn test_empty_citation_is_invalid() {
        let results = vec![result(10, "", "")];
        let empty = Citation {
            chapter: Some("Chapter".to_string()),
            ..Default::default()
        };
        assert!(validate_citations(&[empty, Citation::default()], &results).is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        let results = vec![result(112, "", "")];
        let valid = validate_citations(&[Citation::page(112), Citation::page(112)], &results);
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn test_display() {
        let citation = Citation::from_metadata(&result(112, "Chapter 9", "§ 4").metadata);
        assert_eq!(citation.to_string(), "[page 112, Chapter 9, § 4]");
    }
}
