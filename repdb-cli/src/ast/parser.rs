use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use repdb::types::{Command, ItemId, SiteId, TransId, Value, ITEM_COUNT, SITE_COUNT};

use crate::ast::token_kind::TokenKind;
use crate::ast::tokenizer::{tokenize_line, Token};

/// Command keywords of the input language. Matching is exact: `beginro` is
/// not a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumString, Display)]
pub enum Keyword {
    #[strum(serialize = "begin")]
    Begin,
    #[strum(serialize = "beginRO")]
    BeginRo,
    #[strum(serialize = "end")]
    End,
    #[strum(serialize = "R")]
    Read,
    #[strum(serialize = "W")]
    Write,
    #[strum(serialize = "fail")]
    Fail,
    #[strum(serialize = "recover")]
    Recover,
    #[strum(serialize = "dump")]
    Dump,
}

/// Every keyword, for the REPL completer.
pub fn all_keywords() -> Vec<String> {
    Keyword::iter().map(|keyword| keyword.to_string()).collect()
}

/// Parses one input line into commands. The line may hold several commands
/// separated by `;`, a trailing comment, or nothing at all.
pub fn parse_line(line: &str) -> Result<Vec<Command>> {
    let tokens = tokenize_line(line).map_err(|message| anyhow!(message))?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut commands = Vec::new();
    loop {
        parser.skip_separators();
        match parser.peek() {
            None => break,
            Some(token) if token.kind == TokenKind::EOI => break,
            Some(_) => {}
        }
        commands.push(parser.parse_command()?);
        parser.expect_separator()?;
    }
    Ok(commands)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'a>> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => bail!("expected {:?}, got {:?} at {:?}", kind, token.kind, token.text()),
            None => bail!("expected {:?}, got end of line", kind),
        }
    }

    fn skip_separators(&mut self) {
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::SemiColon || token.kind == TokenKind::Newline {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// After a command there must be a `;`, a newline, or the end of the line.
    fn expect_separator(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => match token.kind {
                TokenKind::SemiColon | TokenKind::Newline | TokenKind::EOI => Ok(()),
                _ => bail!("expected ';' between commands, got {:?}", token.text()),
            },
        }
    }

    fn parse_command(&mut self) -> Result<Command> {
        let token = self.expect(TokenKind::Ident)?;
        let keyword = Keyword::from_str(token.text())
            .map_err(|_| anyhow!("unknown command: {}", token.text()))?;
        self.expect(TokenKind::LParen)?;
        let command = match keyword {
            Keyword::Begin => Command::Begin { trans: self.trans_id()? },
            Keyword::BeginRo => Command::BeginRo { trans: self.trans_id()? },
            Keyword::End => Command::End { trans: self.trans_id()? },
            Keyword::Read => {
                let trans = self.trans_id()?;
                self.expect(TokenKind::Comma)?;
                let item = self.item_id()?;
                Command::Read { trans, item }
            }
            Keyword::Write => {
                let trans = self.trans_id()?;
                self.expect(TokenKind::Comma)?;
                let item = self.item_id()?;
                self.expect(TokenKind::Comma)?;
                let value = self.value()?;
                Command::Write { trans, item, value }
            }
            Keyword::Fail => Command::Fail { site: self.site_id()? },
            Keyword::Recover => Command::Recover { site: self.site_id()? },
            Keyword::Dump => match self.peek().map(|token| token.kind) {
                Some(TokenKind::RParen) => Command::DumpAll,
                Some(TokenKind::Ident) => Command::DumpItem { item: self.item_id()? },
                Some(TokenKind::LiteralInteger) => Command::DumpSite { site: self.site_id()? },
                _ => bail!("dump takes nothing, a site or an item"),
            },
        };
        self.expect(TokenKind::RParen)?;
        Ok(command)
    }

    /// A transaction reference: `T` followed by a positive integer.
    fn trans_id(&mut self) -> Result<TransId> {
        let token = self.expect(TokenKind::Ident)?;
        let id = token
            .text()
            .strip_prefix('T')
            .and_then(|digits| digits.parse::<TransId>().ok())
            .ok_or_else(|| anyhow!("expected a transaction like T1, got {}", token.text()))?;
        if id == 0 {
            bail!("transaction ids are positive, got {}", token.text());
        }
        Ok(id)
    }

    /// An item reference: `x` followed by an id in `1..=ITEM_COUNT`.
    fn item_id(&mut self) -> Result<ItemId> {
        let token = self.expect(TokenKind::Ident)?;
        let item = token
            .text()
            .strip_prefix('x')
            .and_then(|digits| digits.parse::<ItemId>().ok())
            .ok_or_else(|| anyhow!("expected an item like x3, got {}", token.text()))?;
        if item == 0 || item > ITEM_COUNT {
            bail!("items are x1..=x{}, got {}", ITEM_COUNT, token.text());
        }
        Ok(item)
    }

    /// A site id in `1..=SITE_COUNT`.
    fn site_id(&mut self) -> Result<SiteId> {
        let token = self.expect(TokenKind::LiteralInteger)?;
        let site = token
            .text()
            .parse::<SiteId>()
            .map_err(|_| anyhow!("expected a site id, got {}", token.text()))?;
        if site == 0 || site > SITE_COUNT {
            bail!("sites are 1..={}, got {}", SITE_COUNT, token.text());
        }
        Ok(site)
    }

    fn value(&mut self) -> Result<Value> {
        let token = self.expect(TokenKind::LiteralInteger)?;
        token.text().parse::<Value>().map_err(|_| anyhow!("expected a value, got {}", token.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_line() -> Result<()> {
        let commands = parse_line("begin(T1); W(T1, x2, 101); R(T1, x2); end(T1)")?;
        assert_eq!(
            commands,
            vec![
                Command::Begin { trans: 1 },
                Command::Write { trans: 1, item: 2, value: 101 },
                Command::Read { trans: 1, item: 2 },
                Command::End { trans: 1 },
            ]
        );
        Ok(())
    }

    #[test]
    fn parses_dump_forms() -> Result<()> {
        assert_eq!(parse_line("dump()")?, vec![Command::DumpAll]);
        assert_eq!(parse_line("dump(3)")?, vec![Command::DumpSite { site: 3 }]);
        assert_eq!(parse_line("dump(x12)")?, vec![Command::DumpItem { item: 12 }]);
        Ok(())
    }

    #[test]
    fn parses_tester_events_and_comments() -> Result<()> {
        let commands = parse_line("fail(2); recover(2) // site 2 bounces")?;
        assert_eq!(
            commands,
            vec![Command::Fail { site: 2 }, Command::Recover { site: 2 }]
        );
        assert_eq!(parse_line("// nothing but a comment")?, vec![]);
        assert_eq!(parse_line("   ")?, vec![]);
        Ok(())
    }

    #[test]
    fn negative_write_values_are_fine() -> Result<()> {
        assert_eq!(
            parse_line("W(T7, x8, -9)")?,
            vec![Command::Write { trans: 7, item: 8, value: -9 }]
        );
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_references() {
        assert!(parse_line("fail(11)").is_err());
        assert!(parse_line("fail(0)").is_err());
        assert!(parse_line("R(T1, x21)").is_err());
        assert!(parse_line("R(T1, x0)").is_err());
        assert!(parse_line("begin(T0)").is_err());
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_line("begin T1").is_err());
        assert!(parse_line("begin(T1").is_err());
        assert!(parse_line("frob(T1)").is_err());
        assert!(parse_line("begin(T1) begin(T2)").is_err());
        assert!(parse_line("W(T1, x2)").is_err());
        assert!(parse_line("dump(x2, 3)").is_err());
    }

    #[test]
    fn keywords_cover_the_language() {
        let keywords = all_keywords();
        for keyword in ["begin", "beginRO", "end", "R", "W", "fail", "recover", "dump"] {
            assert!(keywords.contains(&keyword.to_string()));
        }
    }
}
