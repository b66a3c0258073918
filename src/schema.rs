//! Row and input types for the symbol database
//!
//! Parsers describe what they found with [`TopicInput`] and [`LinkInput`];
//! classes and contexts travel by value and are interned by the store.
//! The store hands back [`Topic`] and [`Link`] rows carrying the IDs it
//! assigned.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::ids::{ClassId, ContextId, FileId, LanguageId, LinkId, TopicId};
use crate::symbols::{normalize_symbol, Context};

/// Score stored on links that have no target.
pub const UNRESOLVED_SCORE: i64 = 0;

/// What a link points at and how it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkType {
    /// Symbol reference written in documentation text or a prototype
    Reference,
    /// Parent named in a class declaration
    ClassParent,
    Image,
    Url,
    Email,
}

impl LinkType {
    /// Only symbol links are matched against topics.
    pub fn resolves_to_topics(&self) -> bool {
        matches!(self, LinkType::Reference | LinkType::ClassParent)
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            LinkType::Reference => 0,
            LinkType::ClassParent => 1,
            LinkType::Image => 2,
            LinkType::Url => 3,
            LinkType::Email => 4,
        }
    }

    pub fn from_i64(value: i64) -> StoreResult<Self> {
        match value {
            0 => Ok(LinkType::Reference),
            1 => Ok(LinkType::ClassParent),
            2 => Ok(LinkType::Image),
            3 => Ok(LinkType::Url),
            4 => Ok(LinkType::Email),
            other => Err(StoreError::format("link type", format!("unknown value {}", other))),
        }
    }
}

/// Which class hierarchy a class belongs to. Hierarchies never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hierarchy {
    Class,
    Database,
}

impl Hierarchy {
    pub fn as_i64(&self) -> i64 {
        match self {
            Hierarchy::Class => 0,
            Hierarchy::Database => 1,
        }
    }

    pub fn from_i64(value: i64) -> StoreResult<Self> {
        match value {
            0 => Ok(Hierarchy::Class),
            1 => Ok(Hierarchy::Database),
            other => Err(StoreError::format("hierarchy", format!("unknown value {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    Unknown,
    Public,
    Protected,
    Internal,
    ProtectedInternal,
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentType {
    Function,
    Variable,
    Class,
    Section,
    Group,
    Enum,
    Constant,
    Property,
    Type,
    File,
    #[default]
    Generic,
    Other(String),
}

/// Uniqueness key of a class: the language is payload, not identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassKey {
    pub hierarchy: Hierarchy,
    pub symbol: String,
}

/// A class as a parser names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassInput {
    pub hierarchy: Hierarchy,
    pub language_id: LanguageId,
    pub symbol: String,
}

impl ClassInput {
    pub fn new(hierarchy: Hierarchy, language_id: LanguageId, symbol: &str) -> Self {
        Self {
            hierarchy,
            language_id,
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn key(&self) -> ClassKey {
        ClassKey {
            hierarchy: self.hierarchy,
            symbol: normalize_symbol(&self.symbol),
        }
    }
}

/// A documented symbol as a parser emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInput {
    pub title: String,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub prototype: Option<String>,
    pub symbol: String,
    pub symbol_definition_number: u32,
    pub class: Option<ClassInput>,
    pub is_embedded: bool,
    pub comment_type: CommentType,
    pub access_level: AccessLevel,
    pub tags: Vec<String>,
    pub comment_line_number: u32,
    pub code_line_number: u32,
    pub language_id: LanguageId,
    pub prototype_context: Context,
    pub body_context: Context,
}

impl TopicInput {
    pub fn new(title: &str, symbol: &str, language_id: LanguageId) -> Self {
        Self {
            title: title.to_string(),
            body: None,
            summary: None,
            prototype: None,
            symbol: symbol.to_string(),
            symbol_definition_number: 1,
            class: None,
            is_embedded: false,
            comment_type: CommentType::default(),
            access_level: AccessLevel::default(),
            tags: Vec::new(),
            comment_line_number: 0,
            code_line_number: 0,
            language_id,
            prototype_context: Context::global(),
            body_context: Context::global(),
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn with_prototype(mut self, prototype: &str) -> Self {
        self.prototype = Some(prototype.to_string());
        self
    }

    pub fn with_class(mut self, class: ClassInput) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_definition_number(mut self, number: u32) -> Self {
        self.symbol_definition_number = number;
        self
    }

    pub fn with_comment_type(mut self, comment_type: CommentType) -> Self {
        self.comment_type = comment_type;
        self
    }

    pub fn with_lines(mut self, comment_line: u32, code_line: u32) -> Self {
        self.comment_line_number = comment_line;
        self.code_line_number = code_line;
        self
    }

    pub fn with_contexts(mut self, prototype: Context, body: Context) -> Self {
        self.prototype_context = prototype;
        self.body_context = body;
        self
    }

    pub fn embedded(mut self) -> Self {
        self.is_embedded = true;
        self
    }
}

/// A stored topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub prototype: Option<String>,
    pub symbol: String,
    pub symbol_definition_number: u32,
    pub class_id: Option<ClassId>,
    pub is_embedded: bool,
    pub ending_symbol: String,
    pub comment_type: CommentType,
    pub access_level: AccessLevel,
    pub tags: Vec<String>,
    pub file_id: FileId,
    pub comment_line_number: u32,
    pub code_line_number: u32,
    pub language_id: LanguageId,
    pub prototype_context_id: ContextId,
    pub body_context_id: ContextId,
}

/// A reference as a parser emits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInput {
    pub link_type: LinkType,
    pub text_or_symbol: String,
    pub context: Context,
    pub language_id: LanguageId,
}

impl LinkInput {
    pub fn new(link_type: LinkType, text: &str, context: Context, language_id: LanguageId) -> Self {
        Self {
            link_type,
            text_or_symbol: text.to_string(),
            context,
            language_id,
        }
    }

    pub fn reference(text: &str, context: Context, language_id: LanguageId) -> Self {
        Self::new(LinkType::Reference, text, context, language_id)
    }
}

/// A stored link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub link_type: LinkType,
    pub text_or_symbol: String,
    pub context_id: ContextId,
    pub file_id: FileId,
    pub language_id: LanguageId,
    pub ending_symbol: String,
    /// Extra ending symbols the link can be reached by, sorted.
    pub alternate_ending_symbols: Vec<String>,
    pub target_topic_id: Option<TopicId>,
    pub target_score: i64,
}

impl Link {
    pub fn is_resolved(&self) -> bool {
        self.target_topic_id.is_some()
    }

    /// Primary ending symbol followed by the alternates.
    pub fn all_ending_symbols(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.ending_symbol.as_str())
            .chain(self.alternate_ending_symbols.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
    }
}

/// Read-only view of an interned class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: ClassId,
    pub hierarchy: Hierarchy,
    pub language_id: LanguageId,
    pub symbol: String,
    pub reference_count: u32,
}

/// Read-only view of an interned context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub id: ContextId,
    pub context_string: String,
    pub reference_count: u32,
}
