//! Declarative TRE schemas: a tagged-variant AST loaded from a JSON
//! document and shared immutably for the process lifetime.
//!
//! The document is walked generically (any shape error becomes
//! [`NitfError::Schema`]) rather than deserialized into rigid structs, so
//! unknown attributes in a site-provided document are ignored instead of
//! rejected. Loop count formulas are a closed catalog: the five algebraic
//! forms real TRE definitions use, and nothing else.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::{NitfError, Result};
use crate::metadata::MetadataMap;

/// Built-in schema document compiled into the library.
const BUILTIN_SPEC: &str = include_str!("tre_spec.json");

/// Environment variable naming an override schema document.
pub const TRE_SPEC_ENV: &str = "NITF_TRE_SPEC";

/// Field length: a literal width or a reference to a previously decoded
/// field holding the width.
#[derive(Debug, Clone, PartialEq)]
pub enum LengthSpec {
    Fixed(usize),
    Var(String),
}

/// The closed catalog of loop-count formulas.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopFormula {
    /// `(VAR+1)*(VAR)/2`
    Triangular(String),
    /// `A*B`
    Product(String, String),
    /// `VAR-1`
    MinusOne(String),
}

impl LoopFormula {
    /// Parse one of the known formula spellings. New formulas are not
    /// accepted; an unknown spelling is a schema error.
    pub fn parse(s: &str) -> Option<LoopFormula> {
        match s {
            "(NPART+1)*(NPART)/2" => Some(LoopFormula::Triangular("NPART".into())),
            "(NUMOPG+1)*(NUMOPG)/2" => Some(LoopFormula::Triangular("NUMOPG".into())),
            "NPAR*NPARO" => Some(LoopFormula::Product("NPAR".into(), "NPARO".into())),
            "NPLN-1" => Some(LoopFormula::MinusOne("NPLN".into())),
            "NXPTS*NYPTS" => Some(LoopFormula::Product("NXPTS".into(), "NYPTS".into())),
            _ => None,
        }
    }

    /// Evaluate against already-decoded metadata.
    pub fn eval(&self, md: &MetadataMap) -> Option<u64> {
        let lookup = |name: &str| md.most_recent_uint(name);
        match self {
            LoopFormula::Triangular(v) => {
                let n = lookup(v)?;
                Some(n * (n + 1) / 2)
            }
            LoopFormula::Product(a, b) => Some(lookup(a)?.checked_mul(lookup(b)?)?),
            LoopFormula::MinusOne(v) => Some(lookup(v)?.saturating_sub(1)),
        }
    }
}

/// How a loop determines its iteration count.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopCount {
    /// A previously decoded field holds the count.
    Counter(String),
    /// Literal count.
    Iterations(u64),
    /// One of the closed formula catalog.
    Formula(LoopFormula),
}

/// Conditional test against previously decoded fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String, String),
    NotEquals(String, String),
    /// Compound of two tests, both of which must hold.
    And(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Parse `VAR=value`, `VAR!=value`, or `<test> AND <test>`.
    pub fn parse(s: &str) -> Option<Condition> {
        if let Some((left, right)) = s.split_once(" AND ") {
            return Some(Condition::And(
                Box::new(Condition::parse(left)?),
                Box::new(Condition::parse(right)?),
            ));
        }
        if let Some((var, value)) = s.split_once("!=") {
            return Some(Condition::NotEquals(var.trim().into(), value.trim().into()));
        }
        if let Some((var, value)) = s.split_once('=') {
            return Some(Condition::Equals(var.trim().into(), value.trim().into()));
        }
        None
    }

    pub fn eval(&self, md: &MetadataMap) -> bool {
        match self {
            Condition::Equals(var, value) => {
                md.most_recent(var).map(str::trim) == Some(value.as_str())
            }
            Condition::NotEquals(var, value) => {
                md.most_recent(var).map(str::trim) != Some(value.as_str())
            }
            Condition::And(a, b) => a.eval(md) && b.eval(md),
        }
    }
}

/// One node of a TRE schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Field {
        name: String,
        length: LengthSpec,
    },
    Loop {
        count: LoopCount,
        /// Iteration prefix pattern with a `%d`-style placeholder; `None`
        /// uses the default `NNNN_` prefix.
        prefix: Option<String>,
        children: Vec<SchemaNode>,
    },
    If {
        cond: Condition,
        children: Vec<SchemaNode>,
    },
    /// Decode children only while the cursor has not reached the TRE's
    /// declared extent.
    IfRemainingBytes {
        children: Vec<SchemaNode>,
    },
}

/// Root of one TRE's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TreSchema {
    pub tag: String,
    /// Exact total length when the definition declares one; a consumed
    /// byte count differing from it is a non-fatal diagnostic.
    pub total_length: Option<usize>,
    pub children: Vec<SchemaNode>,
}

/// All known TRE schemas, loaded once and shared immutably.
#[derive(Debug, Default)]
pub struct TreSchemaRegistry {
    tres: HashMap<String, TreSchema>,
}

impl TreSchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a schema document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| NitfError::Schema(format!("schema document is not valid JSON: {e}")))?;
        Self::from_value(&doc)
    }

    /// Build from an already-parsed document.
    pub fn from_value(doc: &Value) -> Result<Self> {
        let list = doc
            .get("tres")
            .and_then(Value::as_array)
            .ok_or_else(|| NitfError::Schema("document has no \"tres\" array".into()))?;
        let mut tres = HashMap::new();
        for entry in list {
            let schema = parse_tre(entry)?;
            tres.insert(schema.tag.clone(), schema);
        }
        Ok(Self { tres })
    }

    /// Schema for a 6-char tag (trailing spaces ignored).
    pub fn schema_for(&self, tag: &str) -> Option<&TreSchema> {
        self.tres.get(tag.trim_end())
    }

    pub fn len(&self) -> usize {
        self.tres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tres.is_empty()
    }
}

/// Process-wide shared registry, loaded lazily exactly once.
///
/// Resolution order: the document named by `NITF_TRE_SPEC`, then the
/// built-in document. A broken override falls back to the built-in; a
/// broken built-in (which would be a packaging defect) yields an empty
/// registry, in which case every TRE is still available as a raw span.
pub fn shared_registry() -> &'static Arc<TreSchemaRegistry> {
    static REGISTRY: OnceLock<Arc<TreSchemaRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        if let Ok(path) = std::env::var(TRE_SPEC_ENV) {
            if let Ok(text) = std::fs::read_to_string(&path) {
                if let Ok(reg) = TreSchemaRegistry::from_json_str(&text) {
                    return Arc::new(reg);
                }
            }
        }
        Arc::new(
            TreSchemaRegistry::from_json_str(BUILTIN_SPEC)
                .unwrap_or_else(|_| TreSchemaRegistry::empty()),
        )
    })
}

fn schema_err(tag: &str, msg: impl std::fmt::Display) -> NitfError {
    NitfError::Schema(format!("TRE {tag}: {msg}"))
}

fn parse_tre(entry: &Value) -> Result<TreSchema> {
    let tag = entry
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| NitfError::Schema("TRE entry without a \"tag\"".into()))?;
    if tag.len() > crate::tre::record::TRE_TAG_LEN {
        return Err(schema_err(tag, "tag longer than 6 characters"));
    }
    let total_length = entry
        .get("length")
        .and_then(Value::as_u64)
        .map(|l| l as usize);
    let children = parse_children(tag, entry)?;
    Ok(TreSchema {
        tag: tag.to_string(),
        total_length,
        children,
    })
}

fn parse_children(tag: &str, node: &Value) -> Result<Vec<SchemaNode>> {
    let Some(fields) = node.get("fields") else {
        return Ok(Vec::new());
    };
    let fields = fields
        .as_array()
        .ok_or_else(|| schema_err(tag, "\"fields\" is not an array"))?;
    fields.iter().map(|f| parse_node(tag, f)).collect()
}

fn parse_node(tag: &str, node: &Value) -> Result<SchemaNode> {
    if let Some(spec) = node.get("loop") {
        let count = parse_loop_count(tag, spec)?;
        let prefix = spec
            .get("md_prefix")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(SchemaNode::Loop {
            count,
            prefix,
            children: parse_children(tag, node)?,
        });
    }
    if let Some(cond) = node.get("if") {
        let cond = cond
            .as_str()
            .and_then(Condition::parse)
            .ok_or_else(|| schema_err(tag, "unparseable \"if\" condition"))?;
        return Ok(SchemaNode::If {
            cond,
            children: parse_children(tag, node)?,
        });
    }
    if node.get("if_remaining_bytes").is_some() {
        return Ok(SchemaNode::IfRemainingBytes {
            children: parse_children(tag, node)?,
        });
    }
    let name = node
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| schema_err(tag, "field without a \"name\""))?;
    let length = if let Some(var) = node.get("length_var").and_then(Value::as_str) {
        LengthSpec::Var(var.to_string())
    } else {
        let len = node
            .get("length")
            .and_then(Value::as_u64)
            .ok_or_else(|| schema_err(tag, format!("field {name} without a length")))?;
        LengthSpec::Fixed(len as usize)
    };
    Ok(SchemaNode::Field {
        name: name.to_string(),
        length,
    })
}

fn parse_loop_count(tag: &str, spec: &Value) -> Result<LoopCount> {
    if let Some(counter) = spec.get("counter").and_then(Value::as_str) {
        return Ok(LoopCount::Counter(counter.to_string()));
    }
    if let Some(n) = spec.get("iterations").and_then(Value::as_u64) {
        return Ok(LoopCount::Iterations(n));
    }
    if let Some(formula) = spec.get("formula").and_then(Value::as_str) {
        return LoopFormula::parse(formula)
            .map(LoopCount::Formula)
            .ok_or_else(|| schema_err(tag, format!("unknown loop formula \"{formula}\"")));
    }
    Err(schema_err(tag, "loop without counter, iterations, or formula"))
}
