//! `.map` 文本的词法分析。
//!
//! 只区分三类记号：裸词（数字、关键字、不带引号的路径）、双引号字符串与括号。
//! 支持 `//` 行注释与 `/* */` 块注释；字符串不处理转义，也不能跨行。

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Quoted,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    fn punct(ch: char, line: usize) -> Self {
        Self {
            kind: TokenKind::Punct,
            text: ch.to_string(),
            line,
        }
    }

    #[inline]
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(ch)
    }

    #[inline]
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text == word
    }

    /// 可作为名称或值使用的记号（裸词或字符串）。
    #[inline]
    pub fn is_text(&self) -> bool {
        self.kind != TokenKind::Punct
    }

    /// 用于错误信息的原样描述。
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Quoted => format!("\"{}\"", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("第 {line} 行: {message}")]
pub struct LexError {
    pub line: usize,
    pub message: String,
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    buffer: Option<Token>,
    last_line: usize,
    previous_line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            buffer: None,
            last_line: 0,
            previous_line: 0,
        }
    }

    /// 扫描器当前所在行，用于文件提前结束时的报错。
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        let token = match self.buffer.take() {
            Some(token) => Some(token),
            None => self.scan()?,
        };
        if let Some(token) = &token {
            self.previous_line = self.last_line;
            self.last_line = token.line;
        }
        Ok(token)
    }

    /// 仅当下一个记号与上一个记号位于同一行时返回它。
    pub fn next_on_line(&mut self) -> Result<Option<Token>, LexError> {
        let anchor = self.last_line;
        match self.next_token()? {
            Some(token) if token.line == anchor => Ok(Some(token)),
            Some(token) => {
                self.put_back(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// 回退一个记号。只支持一层回退。
    pub fn put_back(&mut self, token: Token) {
        debug_assert!(self.buffer.is_none(), "内部错误：尝试多次回退记号");
        self.last_line = self.previous_line;
        self.buffer = Some(token);
    }

    fn scan(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_whitespace_and_comments()?;
        let line = self.line;
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };
        match ch {
            '{' | '}' | '(' | ')' => {
                self.bump();
                Ok(Some(Token::punct(ch, line)))
            }
            '"' => self.scan_quoted(line).map(Some),
            _ => Ok(Some(self.scan_word(line))),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_whitespace() => {
                    self.bump();
                }
                Some('/') => match self.peek_second() {
                    Some('/') => {
                        while let Some(ch) = self.peek_char() {
                            if ch == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    }
                    Some('*') => {
                        let start = self.line;
                        self.bump();
                        self.bump();
                        loop {
                            match self.peek_char() {
                                None => {
                                    return Err(LexError {
                                        line: start,
                                        message: "块注释缺少结束标记 */".to_string(),
                                    });
                                }
                                Some('*') if self.peek_second() == Some('/') => {
                                    self.bump();
                                    self.bump();
                                    break;
                                }
                                Some(_) => {
                                    self.bump();
                                }
                            }
                        }
                    }
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            }
        }
    }

    fn scan_quoted(&mut self, line: usize) -> Result<Token, LexError> {
        self.bump();
        let start = self.pos;
        loop {
            match self.peek_char() {
                Some('"') => {
                    let text = self.source[start..self.pos].to_string();
                    self.bump();
                    return Ok(Token {
                        kind: TokenKind::Quoted,
                        text,
                        line,
                    });
                }
                Some('\n') | None => {
                    return Err(LexError {
                        line,
                        message: "字符串缺少结束引号".to_string(),
                    });
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn scan_word(&mut self, line: usize) -> Token {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || matches!(ch, '{' | '}' | '(' | ')' | '"') {
                break;
            }
            if ch == '/' && matches!(self.peek_second(), Some('/') | Some('*')) {
                break;
            }
            self.bump();
        }
        Token {
            kind: TokenKind::Word,
            text: self.source[start..self.pos].to_string(),
            line,
        }
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    #[inline]
    fn peek_second(&self) -> Option<char> {
        self.source[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }
}
