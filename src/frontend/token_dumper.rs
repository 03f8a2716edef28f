use owo_colors::{OwoColorize, Style};

use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

/// Renders lexer output for `--tokens`, one token per line.
pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints source text instead of the Debug form
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        tokens.iter().map(|s| self.render_one(s) + "\n").collect()
    }

    fn render_one(&self, s: &Spanned) -> String {
        let kind = kind(&s.token);
        let repr = if self.show_debug_repr {
            format!("{:?}", s.token)
        } else {
            s.token.to_string()
        };
        let body = format!("{:<8} {}", kind, repr);

        let body = if self.color {
            body.style(style(&s.token)).to_string()
        } else {
            body
        };

        format!("[{:02}:{:02}] {}", s.span.line, s.span.col, body)
    }
}

fn kind(t: &Token) -> &'static str {
    use Token::*;
    match t {
        Eof => "EOF",

        // literals
        Int(_) => "INT",
        Str(_) => "STRING",
        True | False => "BOOL",

        // names
        Ident(_) => "IDENT",

        // structure
        LParen | RParen => "PAREN",
        LBracket | RBracket => "BRACKET",
        LBrace | RBrace => "BRACE",
        Comma | Semicolon | Colon => "PUNCT",

        // ops / comparisons
        Assign | Plus | Minus | Asterisk | Slash | Bang => "OP",
        Eq | NotEq | Lt | Gt => "CMP",

        Let | Function | If | Else | Return => "KEYWORD",
    }
}

fn style(t: &Token) -> Style {
    use Token::*;
    match t {
        Eof => Style::new().dimmed(),
        Str(_) => Style::new().green(),
        Int(_) | True | False => Style::new().cyan(),
        Ident(_) => Style::new().yellow(),
        Assign | Plus | Minus | Asterisk | Slash | Bang => Style::new().magenta(),
        Eq | NotEq | Lt | Gt => Style::new().magenta(),
        Let | Function | If | Else | Return => Style::new().bold(),
        _ => Style::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    #[test]
    fn test_plain_render() {
        let tokens = Lexer::new("let x = 5;").tokenize().unwrap();
        let out = TokenDumper::new().no_color().pretty().render(&tokens);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "[01:01] KEYWORD  let");
        assert_eq!(lines[1], "[01:05] IDENT    x");
        assert_eq!(lines[3], "[01:09] INT      5");
        assert_eq!(lines[5], "[01:11] EOF      end of input");
    }

    #[test]
    fn test_debug_render() {
        let tokens = Lexer::new("\"hi\"").tokenize().unwrap();
        let out = TokenDumper::new().no_color().render(&tokens);
        assert!(out.starts_with("[01:01] STRING   Str(\"hi\")\n"));
    }

    #[test]
    fn test_color_adds_escapes() {
        let tokens = Lexer::new("x").tokenize().unwrap();
        let out = TokenDumper::new().render(&tokens);
        assert!(out.contains('\u{1b}'));
    }
}
