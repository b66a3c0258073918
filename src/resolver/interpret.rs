//! Alternate interpretations of link text
//!
//! Documentation prose writes "the Widgets" or "Parser's state" when it
//! means `Widget` and `Parser`. Each link therefore has the text as written
//! plus a few deterministic alternates formed by undoing plural and
//! possessive endings on the last symbol component. The alternates' ending
//! symbols become the link's alternate ending symbol rows.

use crate::schema::LinkType;
use crate::symbols::{join, last_component, normalize_symbol, SEPARATOR};

/// One way to read a link's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub text: String,
    /// True for the text as written, false for plural/possessive variants.
    pub exact: bool,
}

/// The text as written, followed by its alternates.
///
/// Class-parent links name a class exactly and get no alternates. Image,
/// URL and email links are not symbols and get no interpretations at all.
pub fn interpretations(text: &str, link_type: LinkType) -> Vec<Interpretation> {
    if !link_type.resolves_to_topics() {
        return Vec::new();
    }

    let normalized = normalize_symbol(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut out = vec![Interpretation {
        text: normalized.clone(),
        exact: true,
    }];

    if link_type == LinkType::ClassParent {
        return out;
    }

    let (prefix, last) = match normalized.rfind(SEPARATOR) {
        Some(pos) => (&normalized[..pos], last_component(&normalized)),
        None => ("", normalized.as_str()),
    };

    for variant in ending_variants(last) {
        let candidate = join(prefix, &variant);
        if !out.iter().any(|i| i.text == candidate) {
            out.push(Interpretation {
                text: candidate,
                exact: false,
            });
        }
    }

    out
}

/// Singular and non-possessive forms of one symbol component.
fn ending_variants(word: &str) -> Vec<String> {
    let mut bases = vec![word.to_string()];
    if let Some(stem) = word.strip_suffix("'s") {
        bases.push(stem.to_string());
    } else if let Some(stem) = word.strip_suffix("s'") {
        bases.push(format!("{}s", stem));
    }

    let mut variants = Vec::new();
    for (i, base) in bases.iter().enumerate() {
        if i > 0 {
            variants.push(base.clone());
        }
        variants.extend(singular_forms(base));
    }
    variants.retain(|v| !v.is_empty() && v != word);
    variants.dedup();
    variants
}

fn singular_forms(word: &str) -> Vec<String> {
    let lower = word.to_ascii_lowercase();
    if word.contains('\'') || word.chars().count() < 3 || !lower.ends_with('s') || lower.ends_with("ss") {
        return Vec::new();
    }

    if lower.ends_with("ies") && word.len() > 3 {
        let stem = &word[..word.len() - 3];
        let y = if word.ends_with("IES") { "Y" } else { "y" };
        return vec![format!("{}{}", stem, y)];
    }

    if lower.ends_with("es") {
        let stem = &word[..word.len() - 2];
        let stem_lower = stem.to_ascii_lowercase();
        if ["s", "x", "z", "ch", "sh"].iter().any(|end| stem_lower.ends_with(end)) {
            return vec![stem.to_string()];
        }
    }

    vec![word[..word.len() - 1].to_string()]
}
