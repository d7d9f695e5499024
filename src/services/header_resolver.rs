//! Header resolver
//!
//! Maps spreadsheet headers to canonical field names. Two strategies:
//!
//! - **Exact**: case-insensitive match against a list of known spellings
//!   (client base).
//! - **Keyword**: a header matches a field when it contains one of the field's
//!   keywords (invoices). Whole-token matches are tried before plain substring
//!   containment, and a column claimed by one field is not offered to the next.
//!
//! The resolver only ever *proposes* a mapping. Importers take a
//! [`ConfirmedMapping`], which exists only after [`ProposedMapping::confirm`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::services::text::{contains_token_run, fold, tokens};

/// Canonical field and the header names or keywords that identify it
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub candidates: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    Exact,
    Keyword,
}

/// Canonical field → column index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping(BTreeMap<String, usize>);

impl ColumnMapping {
    pub fn get(&self, field: &str) -> Option<usize> {
        self.0.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn set(&mut self, field: &str, column: usize) {
        self.0.insert(field.to_string(), column);
    }

    fn remove(&mut self, field: &str) {
        self.0.remove(field);
    }

    fn is_claimed(&self, column: usize) -> bool {
        self.0.values().any(|c| *c == column)
    }
}

/// Required field without a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingWarning {
    pub field: String,
    pub message: String,
}

/// Operator's choice for one field: a column index or a header name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Header(String),
}

impl ColumnRef {
    /// "3" → index 3, anything else → header name.
    pub fn parse(s: &str) -> Self {
        match s.trim().parse::<usize>() {
            Ok(i) => ColumnRef::Index(i),
            Err(_) => ColumnRef::Header(s.trim().to_string()),
        }
    }
}

/// `None` clears the field.
pub type MappingOverrides = BTreeMap<String, Option<ColumnRef>>;

/// Heuristic mapping awaiting operator review
#[derive(Debug, Clone)]
pub struct ProposedMapping {
    pub headers: Vec<String>,
    pub strategy: MatchStrategy,
    pub mapping: ColumnMapping,
    pub warnings: Vec<MappingWarning>,
    fields: &'static [FieldSpec],
}

/// Mapping the operator has accepted; the only kind importers take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMapping {
    mapping: ColumnMapping,
}

impl ConfirmedMapping {
    pub fn get(&self, field: &str) -> Option<usize> {
        self.mapping.get(field)
    }
}

/// Serializable view of a proposal for the operator's review screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingReview {
    pub strategy: MatchStrategy,
    pub headers: Vec<String>,
    pub fields: Vec<FieldReview>,
    pub warnings: Vec<MappingWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReview {
    pub key: String,
    pub label: String,
    pub required: bool,
    pub column: Option<usize>,
    pub header: Option<String>,
}

// =============================================================================
// RESOLVERS
// =============================================================================

/// Exact, case-insensitive header lookup; leftmost header wins.
pub fn resolve_exact(headers: &[String], fields: &'static [FieldSpec]) -> ProposedMapping {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut mapping = ColumnMapping::default();

    for field in fields {
        let found = lowered
            .iter()
            .position(|h| field.candidates.iter().any(|c| c.to_lowercase() == *h));
        if let Some(col) = found {
            mapping.set(field.key, col);
        }
    }

    ProposedMapping::new(headers, MatchStrategy::Exact, mapping, fields)
}

/// Keyword lookup; whole-token matches first, then substring, leftmost wins.
pub fn resolve_keywords(headers: &[String], fields: &'static [FieldSpec]) -> ProposedMapping {
    let folded: Vec<String> = headers.iter().map(|h| fold(h)).collect();
    let header_tokens: Vec<Vec<String>> = headers.iter().map(|h| tokens(h)).collect();
    let mut mapping = ColumnMapping::default();

    for field in fields {
        let keyword_tokens: Vec<Vec<String>> = field.candidates.iter().map(|k| tokens(k)).collect();
        let keyword_folded: Vec<String> = field.candidates.iter().map(|k| fold(k)).collect();

        let by_token = (0..headers.len()).find(|&col| {
            !mapping.is_claimed(col)
                && keyword_tokens
                    .iter()
                    .any(|k| contains_token_run(&header_tokens[col], k))
        });
        let found = by_token.or_else(|| {
            (0..headers.len()).find(|&col| {
                !mapping.is_claimed(col)
                    && !folded[col].is_empty()
                    && keyword_folded.iter().any(|k| folded[col].contains(k.as_str()))
            })
        });

        if let Some(col) = found {
            mapping.set(field.key, col);
        }
    }

    ProposedMapping::new(headers, MatchStrategy::Keyword, mapping, fields)
}

/// Does this cell look like the header of a required field? Used to score
/// candidate header rows. Short keywords ("uc") only count as whole tokens.
pub fn is_keyword_header(cell: &str, fields: &[FieldSpec]) -> bool {
    let folded = fold(cell);
    if folded.is_empty() {
        return false;
    }
    let cell_tokens = tokens(cell);

    fields
        .iter()
        .filter(|f| f.required)
        .flat_map(|f| f.candidates.iter())
        .any(|k| {
            let keyword = fold(k);
            contains_token_run(&cell_tokens, &tokens(k))
                || (keyword.chars().count() >= 4 && folded.contains(keyword.as_str()))
        })
}

// =============================================================================
// PROPOSAL → CONFIRMATION
// =============================================================================

impl ProposedMapping {
    fn new(
        headers: &[String],
        strategy: MatchStrategy,
        mapping: ColumnMapping,
        fields: &'static [FieldSpec],
    ) -> Self {
        let mut proposal = Self {
            headers: headers.to_vec(),
            strategy,
            mapping,
            warnings: Vec::new(),
            fields,
        };
        proposal.warnings = proposal.missing_required_warnings();
        proposal
    }

    pub fn column_of(&self, field: &str) -> Option<usize> {
        self.mapping.get(field)
    }

    fn missing_required_warnings(&self) -> Vec<MappingWarning> {
        self.fields
            .iter()
            .filter(|f| f.required && self.mapping.get(f.key).is_none())
            .map(|f| MappingWarning {
                field: f.key.to_string(),
                message: format!("Nenhuma coluna encontrada para '{}'", f.label),
            })
            .collect()
    }

    /// Apply operator overrides and commit. Fails while a required field has no
    /// column.
    pub fn confirm(mut self, overrides: &MappingOverrides) -> Result<ConfirmedMapping, MappingError> {
        for (field, choice) in overrides {
            let spec = self
                .fields
                .iter()
                .find(|f| f.key == field)
                .ok_or_else(|| MappingError::UnknownField(field.clone()))?;

            match choice {
                None => self.mapping.remove(spec.key),
                Some(ColumnRef::Index(index)) => {
                    if *index >= self.headers.len() {
                        return Err(MappingError::ColumnOutOfRange {
                            field: field.clone(),
                            index: *index,
                            width: self.headers.len(),
                        });
                    }
                    self.mapping.set(spec.key, *index);
                }
                Some(ColumnRef::Header(name)) => {
                    let wanted = name.trim().to_lowercase();
                    let index = self
                        .headers
                        .iter()
                        .position(|h| h.trim().to_lowercase() == wanted)
                        .ok_or_else(|| MappingError::UnknownColumn {
                            field: field.clone(),
                            column: name.clone(),
                        })?;
                    self.mapping.set(spec.key, index);
                }
            }
        }

        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.required && self.mapping.get(f.key).is_none())
            .map(|f| f.key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MappingError::MissingRequired(missing));
        }

        Ok(ConfirmedMapping {
            mapping: self.mapping,
        })
    }

    pub fn review(&self) -> MappingReview {
        MappingReview {
            strategy: self.strategy,
            headers: self.headers.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| {
                    let column = self.mapping.get(f.key);
                    FieldReview {
                        key: f.key.to_string(),
                        label: f.label.to_string(),
                        required: f.required,
                        column,
                        header: column.and_then(|c| self.headers.get(c).cloned()),
                    }
                })
                .collect(),
            warnings: self.warnings.clone(),
        }
    }
}
