//! The lexer must be total: any input byte sequence produces a finite
//! token stream ending in `Eof`, without panicking.

use ember_syntax::{Lexer, TokenKind};
use proptest::prelude::*;

proptest! {
    #[test]
    fn lexer_never_panics_and_terminates(input in "\\PC{0,256}") {
        let mut lexer = Lexer::new(&input);
        let mut count = 0usize;
        loop {
            let tok = lexer.next_token();
            count += 1;
            prop_assert!(count <= input.len() + 1, "lexer failed to make progress");
            if tok.kind == TokenKind::Eof {
                break;
            }
        }
    }

    #[test]
    fn token_lines_are_monotonic(input in "[a-z0-9 \n+*()=]{0,128}") {
        let mut lexer = Lexer::new(&input);
        let mut last_line = 1usize;
        loop {
            let tok = lexer.next_token();
            prop_assert!(tok.line >= last_line);
            last_line = tok.line;
            if tok.kind == TokenKind::Eof {
                break;
            }
        }
    }
}
