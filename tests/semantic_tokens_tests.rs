//! Semantic token pipeline tests: classification output ordering, delta
//! encoding, and stability across repeated runs.

use fable::analysis::calls::extract_calls;
use fable::analysis::scanner::scan;
use fable::analysis::semantic::{classify, encode, TOKEN_TYPES};
use fable::analysis::table::build_table;
use fable::RegistrySnapshot;
use pretty_assertions::assert_eq;

fn tokens_for(text: &str) -> Vec<u32> {
    let registry = RegistrySnapshot::with_defaults();
    let doc = scan(text);
    let calls = extract_calls(&doc, &registry);
    let table = build_table(&doc, &registry, &calls, &[]);
    encode(&classify(&doc, &table, &registry))
}

/// Undo the LSP delta encoding back to absolute (line, column) pairs.
fn decode(data: &[u32]) -> Vec<(u32, u32, u32, u32, u32)> {
    let mut out = Vec::new();
    let mut line = 0u32;
    let mut col = 0u32;
    for chunk in data.chunks(5) {
        if chunk[0] > 0 {
            line += chunk[0];
            col = chunk[1];
        } else {
            col += chunk[1];
        }
        out.push((line, col, chunk[2], chunk[3], chunk[4]));
    }
    out
}

#[test]
fn decoded_positions_ascend() {
    let text = "{% set tone = \"warm\" %}\n{# greet the user #}\n{{SendMessage(message=Greet(tone=tone))}}";
    let decoded = decode(&tokens_for(text));
    assert!(!decoded.is_empty());
    for pair in decoded.windows(2) {
        let (al, ac, ..) = pair[0];
        let (bl, bc, ..) = pair[1];
        assert!((al, ac) < (bl, bc), "{:?} then {:?}", pair[0], pair[1]);
    }
}

#[test]
fn every_kind_is_a_legend_ordinal() {
    let text = "{% for a in GetActors() %}\n{{ a.name | upper }}\n{% endfor %}";
    for (.., kind, _) in decode(&tokens_for(text)) {
        assert!((kind as usize) < TOKEN_TYPES.len(), "kind {kind} out of range");
    }
}

#[test]
fn repeated_classification_is_stable() {
    let text = "{{#system}}\nYou are {{ persona }}.\n{{gen 'reply' temperature=0.7}}\n{{/system}}";
    assert_eq!(tokens_for(text), tokens_for(text));
}

#[test]
fn empty_document_has_no_tokens() {
    assert!(tokens_for("").is_empty());
    assert!(tokens_for("plain prose, no template syntax").is_empty());
}
