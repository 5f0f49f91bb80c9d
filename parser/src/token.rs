use serde::{Deserialize, Serialize};

/// Token type as assigned by the lexer; `EOF` is -1, user types start at 1.
pub type TokenType = i32;

pub const EOF: TokenType = -1;
pub const MIN_USER_TOKEN_TYPE: TokenType = 1;

pub const DEFAULT_CHANNEL: usize = 0;
pub const HIDDEN_CHANNEL: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub token_type: TokenType,
    #[serde(default)]
    pub channel: usize,
    /// Position of the token in its stream.
    pub index: usize,
}

impl Token {
    pub fn new(token_type: TokenType, channel: usize, index: usize) -> Self {
        Token {
            token_type,
            channel,
            index,
        }
    }

    pub fn eof(index: usize) -> Self {
        Token::new(EOF, DEFAULT_CHANNEL, index)
    }

    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        self.token_type == EOF
    }
}

/// An indexable sequence of already-lexed tokens.
///
/// Reading at or past the end must yield an `EOF` token.
pub trait TokenStream {
    fn get(&self, index: usize) -> Token;
}

/// Token stream backed by a vector; always terminated by `EOF`.
#[derive(Clone, Debug, Default)]
pub struct VecTokenStream {
    tokens: Vec<Token>,
}

impl VecTokenStream {
    /// Build from (type, channel) pairs; token indices are assigned
    /// sequentially and an `EOF` token is appended unless already present.
    pub fn new(types: impl IntoIterator<Item = (TokenType, usize)>) -> Self {
        let mut tokens: Vec<Token> = types
            .into_iter()
            .enumerate()
            .map(|(index, (token_type, channel))| Token::new(token_type, channel, index))
            .collect();
        if tokens.last().map_or(true, |t| !t.is_eof()) {
            tokens.push(Token::eof(tokens.len()));
        }
        VecTokenStream { tokens }
    }

    /// All tokens on the default channel.
    pub fn from_types(types: &[TokenType]) -> Self {
        Self::new(types.iter().map(|&t| (t, DEFAULT_CHANNEL)))
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStream for VecTokenStream {
    fn get(&self, index: usize) -> Token {
        match self.tokens.get(index) {
            Some(t) => *t,
            None => self.tokens[self.tokens.len() - 1],
        }
    }
}

/// Extract the tokens the walk will look at: default-channel tokens from
/// `start_index` up to and including the first one at or after the caret.
/// The window always ends either with that token or with `EOF`, so it is
/// never empty.
pub fn token_window(stream: &dyn TokenStream, start_index: usize, caret_index: usize) -> Vec<Token> {
    let mut window = vec![];
    let mut offset = start_index;
    loop {
        let token = stream.get(offset);
        offset += 1;

        // EOF closes the window even when the stream put it on another channel.
        if token.is_eof() {
            window.push(token);
            break;
        }

        if token.channel == DEFAULT_CHANNEL {
            window.push(token);
            if token.index >= caret_index {
                break;
            }
        }
    }
    window
}
