use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::Result;
use crate::ports::extractor::Extraction;
use crate::ports::{Capabilities, Extractor};
use crate::schema::Relation;

fn capitalized_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Za-z0-9_]{2,}\b").expect("static regex is valid"))
}

/// Naive entity/relation extractor: capitalized tokens become entities,
/// and a handful of copular/verb patterns ("X uses Y", "X is Y") become
/// relations. Adequate for exercising the graph leg of a dual write without
/// an external NLP dependency.
pub struct NaiveExtractor;

#[async_trait]
impl Extractor for NaiveExtractor {
    async fn extract(&self, text: &str) -> Result<Extraction> {
        let entities: Vec<String> = capitalized_word_re()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut relations = Vec::new();
        for pattern in ["uses", "is", "depends on", "replaces", "requires"] {
            let needle = format!(" {pattern} ");
            if let Some(pos) = text.find(&needle) {
                let before = text[..pos].split_whitespace().last();
                let after = text[pos + needle.len()..].split_whitespace().next();
                if let (Some(src), Some(dst)) = (before, after) {
                    relations.push(Relation {
                        src_entity: src.trim_matches(|c: char| !c.is_alphanumeric()).to_string(),
                        relation_type: pattern.replace(' ', "_"),
                        dst_entity: dst.trim_matches(|c: char| !c.is_alphanumeric()).to_string(),
                    });
                }
            }
        }

        Ok(Extraction {
            entities,
            relations,
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_capitalized_entities() {
        let extractor = NaiveExtractor;
        let result = extractor.extract("The Service uses PostgreSQL").await.unwrap();
        assert!(result.entities.contains(&"Service".to_string()));
        assert!(result.entities.contains(&"PostgreSQL".to_string()));
    }

    #[tokio::test]
    async fn extracts_uses_relation() {
        let extractor = NaiveExtractor;
        let result = extractor.extract("Service uses PostgreSQL").await.unwrap();
        assert!(result
            .relations
            .iter()
            .any(|r| r.relation_type == "uses" && r.src_entity == "Service" && r.dst_entity == "PostgreSQL"));
    }
}
