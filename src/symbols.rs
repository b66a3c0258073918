//! Symbol strings and scope contexts
//!
//! A symbol is a fully-qualified name whose components are joined with
//! `.`. Parsers may hand over `::` or `->` separated names; they are
//! normalized on the way in so every stored symbol uses one separator.
//!
//! A [`Context`] captures what is needed to interpret a symbol written
//! relative to some scope: the enclosing scope and the active using/import
//! statements. Contexts are interned by their canonical string form,
//! produced by [`Context::to_context_string`].

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const SEPARATOR: char = '.';

/// Normalize separators and whitespace in a symbol.
///
/// `Foo::Bar`, `Foo->Bar` and ` Foo . Bar ` all become `Foo.Bar`. Empty
/// components are dropped.
pub fn normalize_symbol(symbol: &str) -> String {
    let unified = symbol.replace("::", ".").replace("->", ".");
    unified
        .split(SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Last component of a normalized symbol.
pub fn last_component(symbol: &str) -> &str {
    symbol.rsplit(SEPARATOR).next().unwrap_or(symbol)
}

/// Ending symbol used as the join key between topics and links.
pub fn ending_symbol(symbol: &str, case_sensitive: bool) -> String {
    let last = last_component(symbol);
    if case_sensitive {
        last.to_string()
    } else {
        last.to_lowercase()
    }
}

/// Case-folded form used as the key of ending-symbol indexes.
///
/// Buckets may hold symbols of both case-sensitive and case-insensitive
/// languages; exact comparison happens after lookup.
pub fn fold_ending(ending: &str) -> String {
    ending.to_lowercase()
}

pub fn symbols_equal(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

/// Join two symbol fragments, tolerating an empty prefix.
pub fn join(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        prefix.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, rest)
    }
}

/// Strip `prefix.` from the front of `symbol`, component-wise.
fn strip_symbol_prefix<'a>(symbol: &'a str, prefix: &str, case_sensitive: bool) -> Option<&'a str> {
    if symbol.len() <= prefix.len() || !symbol.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = symbol.split_at(prefix.len());
    if !symbols_equal(head, prefix, case_sensitive) {
        return None;
    }
    tail.strip_prefix(SEPARATOR)
}

/// A using/import statement active in a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsingStatement {
    /// `using Foo.Bar`: symbols under `Foo.Bar` may be written without it.
    AddPrefix { prefix: String },
    /// Alias: a leading `from` written in text stands for `to`.
    ReplacePrefix { from: String, to: String },
}

/// Lexical scope needed to interpret a relative symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub using: Vec<UsingStatement>,
}

impl Context {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn scoped(scope: &str) -> Self {
        let scope = normalize_symbol(scope);
        Self {
            scope: if scope.is_empty() { None } else { Some(scope) },
            using: Vec::new(),
        }
    }

    pub fn with_using(mut self, statement: UsingStatement) -> Self {
        self.using.push(statement);
        self
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_none() && self.using.is_empty()
    }

    /// Scope with separators normalized, or "" for the global scope.
    pub fn scope_symbol(&self) -> &str {
        self.scope.as_deref().unwrap_or("")
    }

    /// Copy with every symbol normalized and empty scopes dropped.
    pub fn canonicalized(&self) -> Self {
        let scope = self
            .scope
            .as_deref()
            .map(normalize_symbol)
            .filter(|s| !s.is_empty());
        let using = self
            .using
            .iter()
            .map(|u| match u {
                UsingStatement::AddPrefix { prefix } => UsingStatement::AddPrefix {
                    prefix: normalize_symbol(prefix),
                },
                UsingStatement::ReplacePrefix { from, to } => UsingStatement::ReplacePrefix {
                    from: normalize_symbol(from),
                    to: normalize_symbol(to),
                },
            })
            .collect();
        Self { scope, using }
    }

    /// Canonical string form; the global context is the empty string.
    pub fn to_context_string(&self) -> StoreResult<String> {
        let canonical = self.canonicalized();
        if canonical.is_global() {
            return Ok(String::new());
        }
        Ok(serde_json::to_string(&canonical)?)
    }

    /// Parse a context string produced by [`Context::to_context_string`].
    ///
    /// # Errors
    /// `Format` if the string is neither empty nor a valid context.
    pub fn parse(context_string: &str) -> StoreResult<Self> {
        if context_string.trim().is_empty() {
            return Ok(Self::global());
        }
        let context: Context = serde_json::from_str(context_string)
            .map_err(|e| StoreError::format("context string", e.to_string()))?;
        Ok(context.canonicalized())
    }

    /// Every fully-qualified symbol `text` may stand for in this context.
    ///
    /// Order: the text as written, then each enclosing scope from the
    /// innermost outward, then each using statement in declaration order.
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn qualified_candidates(&self, text: &str, case_sensitive: bool) -> Vec<String> {
        let text = normalize_symbol(text);
        let mut out: Vec<String> = Vec::new();
        let mut push = |candidate: String| {
            if !candidate.is_empty() && !out.iter().any(|c| symbols_equal(c, &candidate, case_sensitive)) {
                out.push(candidate);
            }
        };

        push(text.clone());

        if let Some(scope) = self.scope.as_deref() {
            let mut prefix = scope;
            loop {
                push(join(prefix, &text));
                match prefix.rfind(SEPARATOR) {
                    Some(pos) => prefix = &prefix[..pos],
                    None => break,
                }
            }
        }

        for statement in &self.using {
            match statement {
                UsingStatement::AddPrefix { prefix } => push(join(prefix, &text)),
                UsingStatement::ReplacePrefix { from, to } => {
                    if symbols_equal(&text, from, case_sensitive) {
                        push(to.clone());
                    } else if let Some(rest) = strip_symbol_prefix(&text, from, case_sensitive) {
                        push(join(to, rest));
                    }
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("Foo::Bar"), "Foo.Bar");
        assert_eq!(normalize_symbol("a->b . c"), "a.b.c");
        assert_eq!(normalize_symbol(".Foo..Bar."), "Foo.Bar");
        assert_eq!(normalize_symbol(""), "");
    }

    #[test]
    fn test_ending_symbol_case_rules() {
        assert_eq!(ending_symbol("Foo.Bar", true), "Bar");
        assert_eq!(ending_symbol("Foo.Bar", false), "bar");
        assert_eq!(ending_symbol("Bar", true), "Bar");
    }

    #[test]
    fn test_global_context_string_is_empty() {
        assert_eq!(Context::global().to_context_string().unwrap(), "");
        assert_eq!(Context::scoped("  ").to_context_string().unwrap(), "");
        assert!(Context::parse("").unwrap().is_global());
    }

    #[test]
    fn test_context_string_round_trip() {
        let context = Context::scoped("Foo::Bar").with_using(UsingStatement::AddPrefix {
            prefix: "System.IO".to_string(),
        });
        let text = context.to_context_string().unwrap();
        let parsed = Context::parse(&text).unwrap();
        assert_eq!(parsed.scope_symbol(), "Foo.Bar");
        assert_eq!(parsed.to_context_string().unwrap(), text);
    }

    #[test]
    fn test_malformed_context_string() {
        assert!(matches!(
            Context::parse("{not json"),
            Err(StoreError::Format { .. })
        ));
    }

    #[test]
    fn test_qualified_candidates_order() {
        let context = Context::scoped("A.B").with_using(UsingStatement::AddPrefix {
            prefix: "Lib".to_string(),
        });
        assert_eq!(
            context.qualified_candidates("Bar", true),
            vec!["Bar", "A.B.Bar", "A.Bar", "Lib.Bar"]
        );
    }

    #[test]
    fn test_replace_prefix_candidates() {
        let context = Context::global().with_using(UsingStatement::ReplacePrefix {
            from: "io".to_string(),
            to: "System.IO".to_string(),
        });
        assert_eq!(
            context.qualified_candidates("io.File", true),
            vec!["io.File", "System.IO.File"]
        );
        assert_eq!(
            context.qualified_candidates("IO.File", false),
            vec!["IO.File", "System.IO.File"]
        );
        assert_eq!(context.qualified_candidates("iostream", true), vec!["iostream"]);
    }
}
