// src/engine/safety.rs - Static screening of user supplied regular expressions

use log::debug;
use regex_syntax::ast::{parse::Parser, Ast};

/// Maximum number of repetition operators a user regex may contain
pub const REPETITION_LIMIT: usize = 25;

/// Returns true when `pattern` is considered safe to compile.
///
/// A pattern is rejected when it cannot be parsed, when a repetition is nested
/// inside another repetition (star height above one, e.g. `(a+)+`), or when it
/// holds more than [`REPETITION_LIMIT`] repetition operators.
pub fn is_safe_pattern(pattern: &str) -> bool {
    let ast = match Parser::new().parse(pattern) {
        Ok(ast) => ast,
        Err(e) => {
            debug!("Rejecting unparsable regex '{}': {}", pattern, e);
            return false;
        }
    };

    let mut repetitions = 0;
    let safe = walk(&ast, 0, &mut repetitions);
    if !safe {
        debug!("Rejecting unsafe regex '{}' ({} repetitions seen)", pattern, repetitions);
    }
    safe
}

fn walk(ast: &Ast, star_height: usize, repetitions: &mut usize) -> bool {
    match ast {
        Ast::Repetition(rep) => {
            let star_height = star_height + 1;
            *repetitions += 1;
            if star_height > 1 || *repetitions > REPETITION_LIMIT {
                return false;
            }
            walk(&rep.ast, star_height, repetitions)
        }
        Ast::Group(group) => walk(&group.ast, star_height, repetitions),
        Ast::Alternation(alt) => alt.asts.iter().all(|branch| walk(branch, star_height, repetitions)),
        Ast::Concat(concat) => concat.asts.iter().all(|item| walk(item, star_height, repetitions)),
        _ => true,
    }
}
