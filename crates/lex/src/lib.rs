pub mod keywords;
mod lexer;
pub mod token;

pub use lexer::{tokenize, Lexer};
pub use token::{Keyword, LiteralKind, Punctuator, Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;
    use diag::Diagnostics;

    #[test]
    fn lex_decl_with_initializer() {
        let mut ds = Diagnostics::new();
        let toks = tokenize("int x = 42;", &mut ds);
        assert!(ds.is_empty());
        use TokenKind as K;
        assert!(matches!(toks[0].kind, K::Keyword(Keyword::Int)));
        assert!(matches!(toks[1].kind, K::Identifier(ref s) if s == "x"));
        assert!(matches!(toks[2].kind, K::Punct(Punctuator::Assign)));
        assert!(matches!(toks[3].kind, K::Literal(LiteralKind::Int(42))));
        assert!(matches!(toks[4].kind, K::Punct(Punctuator::Semicolon)));
        assert!(toks[5].is_eof());
    }

    #[test]
    fn unknown_byte_is_skipped_not_fatal() {
        let mut ds = Diagnostics::new();
        let toks = tokenize("int @ x;", &mut ds);
        assert_eq!(ds.len(), 1);
        // the '@' is gone but lexing continued
        assert!(matches!(toks[1].kind, TokenKind::Identifier(ref s) if s == "x"));
    }
}
