//! The lexer.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[display("kind: '{kind}', part of input: '{text}', line: {line}")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
    /// The 1-based source line the token starts on.
    pub line: u32,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("id")]
    Id,
    #[display("num")]
    Num,
    #[display("$program")]
    Program,
    #[display("$procedure")]
    Procedure,
    #[display("$int")]
    Int,
    #[display("$read")]
    Read,
    #[display("$write")]
    Write,
    #[display("$if")]
    If,
    #[display("$else")]
    Else,
    #[display("$while")]
    While,
    #[display("$repeat")]
    Repeat,
    #[display("$until")]
    Until,
    #[display("$for")]
    For,
    #[display("$from")]
    From,
    #[display("$to")]
    To,
    #[display("$downto")]
    Downto,
    #[display("$do")]
    Do,
    #[display(":=")]
    Assign,
    #[display("=")]
    Eq,
    #[display("!=")]
    Ne,
    #[display("<=")]
    Le,
    #[display(">=")]
    Ge,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display(":")]
    Colon,
    #[display(";")]
    Semi,
    #[display(",")]
    Comma,
}

pub struct LexError {
    pub line: u32,
    pub found: char,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lexer error: unexpected character {:?} at line {}",
            self.found, self.line
        )
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: u32,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        use TokenKind::*;

        // Longer operators must come before their prefixes.
        let table = [
            (r"\A[0-9]+", Num),
            (r"\A[a-zA-Z_][a-zA-Z0-9_]*", Id),
            (r"\A:=", Assign),
            (r"\A!=", Ne),
            (r"\A<=", Le),
            (r"\A>=", Ge),
            (r"\A=", Eq),
            (r"\A<", Lt),
            (r"\A>", Gt),
            (r"\A\+", Plus),
            (r"\A-", Minus),
            (r"\A\*", Star),
            (r"\A/", Slash),
            (r"\A%", Percent),
            (r"\A\(", LParen),
            (r"\A\)", RParen),
            (r"\A\[", LBracket),
            (r"\A\]", RBracket),
            (r"\A\{", LBrace),
            (r"\A\}", RBrace),
            (r"\A:", Colon),
            (r"\A;", Semi),
            (r"\A,", Comma),
        ];

        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n]|(?:#[^\n]*))*").unwrap(),
            matchers: table
                .iter()
                .map(|(re, kind)| (Regex::new(re).unwrap(), *kind))
                .collect(),
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    fn advance(&mut self, len: usize) {
        let consumed = &self.input[self.pos..self.pos + len];
        self.line += consumed.matches('\n').count() as u32;
        self.pos += len;
    }

    // Skip comments and whitespace
    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }

        let rest = &self.input[self.pos..];
        let matched = self
            .matchers
            .iter()
            .find_map(|(regex, kind)| regex.find(rest).map(|m| (m.end(), *kind)));
        match matched {
            Some((len, kind)) => {
                let text = &rest[..len];
                let kind = match kind {
                    TokenKind::Id => keyword(text),
                    other => other,
                };
                let token = Token {
                    kind,
                    text,
                    line: self.line,
                };
                self.advance(len);
                Ok(Some(token))
            }
            None => Err(LexError {
                line: self.line,
                found: rest.chars().next().unwrap(),
            }),
        }
    }

    /// Consume the whole input as a token vector.
    pub fn tokenize(mut self) -> Result<Vec<Token<'input>>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword(text: &str) -> TokenKind {
    use TokenKind::*;

    match text {
        "program" => Program,
        "procedure" => Procedure,
        "int" => Int,
        "read" => Read,
        "write" => Write,
        "if" => If,
        "else" => Else,
        "while" => While,
        "repeat" => Repeat,
        "until" => Until,
        "for" => For,
        "from" => From,
        "to" => To,
        "downto" => Downto,
        "do" => Do,
        _ => Id,
    }
}
