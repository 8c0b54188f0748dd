//! PEG grammar for the result-cell nested-array extension (spec §4.7).
//!
//! Cells that fail to parse as an array are opaque strings; callers store
//! the raw text verbatim regardless, so this module only matters for the
//! lazy downstream decode (e.g. a predicted-summary histogram over a
//! vector-valued target).

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "ingest/nested_array.pest"]
struct CellParser;

/// Parses a cell's raw text as a nested array. Returns `None` if the text
/// does not conform to the grammar, in which case callers should treat the
/// value as an opaque string.
pub fn parse_cell(raw: &str) -> Option<serde_json::Value> {
    let mut pairs = CellParser::parse(Rule::cell, raw.trim()).ok()?;
    let cell = pairs.next()?;
    let array = cell.into_inner().find(|p| p.as_rule() == Rule::array)?;
    Some(build_array(array))
}

fn build_array(pair: Pair<Rule>) -> serde_json::Value {
    let items = pair
        .into_inner()
        .map(build_item)
        .collect::<Vec<_>>();
    serde_json::Value::Array(items)
}

fn build_item(pair: Pair<Rule>) -> serde_json::Value {
    match pair.as_rule() {
        Rule::array => build_array(pair),
        Rule::dquote_string | Rule::squote_string => {
            let text = pair.as_str();
            serde_json::Value::String(text[1..text.len() - 1].to_string())
        }
        Rule::number => {
            let text = pair.as_str();
            serde_json::Number::from_str_helper(text)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(text.to_string()))
        }
        other => unreachable!("unexpected rule in array item: {other:?}"),
    }
}

/// `serde_json::Number` has no public string constructor; this mirrors how
/// `serde_json::from_str` parses a bare numeric literal.
trait NumberFromStr: Sized {
    fn from_str_helper(text: &str) -> Option<Self>;
}

impl NumberFromStr for serde_json::Number {
    fn from_str_helper(text: &str) -> Option<Self> {
        serde_json::from_str::<serde_json::Number>(text).ok()
    }
}
