//! The TRE schema interpreter: one recursive dispatch over the schema AST
//! against a raw byte span.
//!
//! Every read is bounds-checked against the span's declared extent. A
//! violation aborts interpretation of that TRE only: the partial metadata
//! decoded so far is retained and the error flagged, and sibling TREs are
//! unaffected. The interpreter produces both the flat ordered list (which
//! feeds the backward "most recent" lookups for loop counters and variable
//! lengths) and a nested tree mirroring loop structure, in one pass.

use crate::error::{NitfError, Result};
use crate::metadata::{MetadataMap, MetadataNode};
use crate::tre::schema::{Condition, LengthSpec, LoopCount, SchemaNode, TreSchema};

/// Outcome of one TRE decode. `error` is set when interpretation aborted;
/// whatever was decoded before the abort stays in `fields` and `tree`.
#[derive(Debug)]
pub struct TreDecoded {
    pub tag: String,
    /// Flat ordered name/value list, loop entries namespaced by prefix.
    pub fields: MetadataMap,
    /// Nested form mirroring loop/group structure.
    pub tree: MetadataNode,
    /// Non-fatal diagnostics (declared/consumed length mismatch).
    pub warnings: Vec<String>,
    pub error: Option<NitfError>,
    /// Bytes consumed before finishing or aborting.
    pub consumed: usize,
}

/// Signal threaded through every recursion level: `Done` ends the current
/// record cleanly (declared extent reached inside an if-remaining-bytes
/// gate) without touching siblings of the enclosing TRE.
enum Flow {
    Continue,
    Done,
}

/// Decode one TRE byte span against its schema.
pub fn decode_tre(schema: &TreSchema, data: &[u8]) -> TreDecoded {
    let mut interp = Interp {
        data,
        fields: MetadataMap::new(),
        warnings: Vec::new(),
    };
    let mut cursor = 0usize;
    let mut tree = MetadataNode::group(schema.tag.clone());
    let error = match interp.run(&schema.children, &mut cursor, "", &mut tree.children) {
        Ok(_) => {
            if let Some(declared) = schema.total_length {
                if cursor != declared {
                    interp.warnings.push(format!(
                        "TRE {} consumed {} bytes but its schema declares {}",
                        schema.tag, cursor, declared
                    ));
                }
            }
            None
        }
        Err(e) => Some(e),
    };
    TreDecoded {
        tag: schema.tag.clone(),
        fields: interp.fields,
        tree,
        warnings: interp.warnings,
        error,
        consumed: cursor,
    }
}

struct Interp<'a> {
    data: &'a [u8],
    fields: MetadataMap,
    warnings: Vec<String>,
}

impl<'a> Interp<'a> {
    fn run(
        &mut self,
        nodes: &[SchemaNode],
        cursor: &mut usize,
        prefix: &str,
        tree: &mut Vec<MetadataNode>,
    ) -> Result<Flow> {
        for node in nodes {
            match node {
                SchemaNode::Field { name, length } => {
                    self.read_field(name, length, cursor, prefix, tree)?;
                }
                SchemaNode::Loop {
                    count,
                    prefix: pattern,
                    children,
                } => {
                    let n = self.loop_count(count)?;
                    for i in 0..n {
                        let iter_prefix = match pattern {
                            Some(p) => format!("{}{}", prefix, expand_prefix(p, i)),
                            None => format!("{}{:04}_", prefix, i),
                        };
                        let mut group =
                            MetadataNode::group(iter_prefix.trim_end_matches('_').to_string());
                        let flow = self.run(children, cursor, &iter_prefix, &mut group.children)?;
                        tree.push(group);
                        if matches!(flow, Flow::Done) {
                            return Ok(Flow::Done);
                        }
                    }
                }
                SchemaNode::If { cond, children } => {
                    if self.eval_cond(cond, prefix) {
                        if let Flow::Done = self.run(children, cursor, prefix, tree)? {
                            return Ok(Flow::Done);
                        }
                    }
                }
                SchemaNode::IfRemainingBytes { children } => {
                    for child in children {
                        if *cursor >= self.data.len() {
                            return Ok(Flow::Done);
                        }
                        if let Flow::Done =
                            self.run(std::slice::from_ref(child), cursor, prefix, tree)?
                        {
                            return Ok(Flow::Done);
                        }
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn read_field(
        &mut self,
        name: &str,
        length: &LengthSpec,
        cursor: &mut usize,
        prefix: &str,
        tree: &mut Vec<MetadataNode>,
    ) -> Result<()> {
        let len = match length {
            LengthSpec::Fixed(n) => *n,
            LengthSpec::Var(var) => {
                // Prefixed entries of the current loop iteration win over
                // entries of earlier iterations.
                let resolved = self
                    .fields
                    .get(&format!("{prefix}{var}"))
                    .and_then(|v| crate::field::parse_uint(v.as_bytes()))
                    .or_else(|| self.fields.most_recent_uint(var));
                resolved.ok_or_else(|| {
                    NitfError::TreSize(format!(
                        "field {name} takes its length from {var}, which was not decoded"
                    ))
                })? as usize
            }
        };
        let end = cursor.checked_add(len).ok_or_else(|| {
            NitfError::TreSize(format!("field {name} length overflows the cursor"))
        })?;
        if end > self.data.len() {
            return Err(NitfError::TreSize(format!(
                "field {} needs {} bytes at offset {}, TRE declares only {}",
                name,
                len,
                cursor,
                self.data.len()
            )));
        }
        let value = String::from_utf8_lossy(&self.data[*cursor..end])
            .trim_end()
            .to_string();
        self.fields.insert(format!("{prefix}{name}"), value.clone());
        tree.push(MetadataNode::leaf(name, value));
        *cursor = end;
        Ok(())
    }

    fn loop_count(&self, count: &LoopCount) -> Result<u64> {
        match count {
            LoopCount::Iterations(n) => Ok(*n),
            LoopCount::Counter(var) => self.fields.most_recent_uint(var).ok_or_else(|| {
                NitfError::TreSize(format!("loop counter {var} was not decoded before its loop"))
            }),
            LoopCount::Formula(f) => f.eval(&self.fields).ok_or_else(|| {
                NitfError::TreSize("loop formula references fields that were not decoded".into())
            }),
        }
    }

    fn eval_cond(&self, cond: &Condition, prefix: &str) -> bool {
        // Conditions inside a loop iteration see that iteration's entries
        // through the most-recent lookup; no prefix rewrite is needed.
        let _ = prefix;
        cond.eval(&self.fields)
    }
}

/// Expand a `%d` / `%0Nd` placeholder in an iteration prefix pattern.
fn expand_prefix(pattern: &str, i: u64) -> String {
    let Some(pos) = pattern.find('%') else {
        return format!("{pattern}{i}");
    };
    let rest = &pattern[pos + 1..];
    let digits_end = rest.find('d').unwrap_or(0);
    let width: usize = rest[..digits_end].trim_start_matches('0').parse().unwrap_or(
        if rest[..digits_end].is_empty() { 0 } else { 1 },
    );
    let mut out = String::with_capacity(pattern.len() + 4);
    out.push_str(&pattern[..pos]);
    out.push_str(&format!("{i:0width$}"));
    if digits_end < rest.len() {
        out.push_str(&rest[digits_end + 1..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_expansion() {
        assert_eq!(expand_prefix("ACC%d_", 3), "ACC3_");
        assert_eq!(expand_prefix("PT%02d_", 3), "PT03_");
        assert_eq!(expand_prefix("ROW_", 3), "ROW_3");
    }
}
