#![no_main]

use libfuzzer_sys::fuzz_target;
use streamrelay::backend::ident::{quote_ident, quote_literal};

fuzz_target!(|input: &str| {
    // Литерал всегда закрыт кавычкой и не содержит одиночных `'` внутри.
    if let Ok(quoted) = quote_literal(input) {
        let body = quoted
            .strip_prefix('E')
            .unwrap_or(&quoted)
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .expect("literal must be quoted");
        assert!(!body.replace("''", "").contains('\''));
    }
    if let Ok(quoted) = quote_ident(input) {
        let body = &quoted[1..quoted.len() - 1];
        assert!(!body.replace("\"\"", "").contains('"'));
    }
});
